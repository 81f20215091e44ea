//! Iterative-deepening alpha-beta search over any [`RulesOracle`].

use crate::{Action, HAND_KINDS, PieceKind, Position, RulesOracle, SearchBudget, SearchOracle};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

const MATE: i32 = 1_000_000;
const INFINITY: i32 = i32::MAX - 1;

/// Piece values in centipawns, board form.
fn piece_value(kind: PieceKind) -> i32 {
    match kind {
        PieceKind::Pawn => 100,
        PieceKind::Lance => 300,
        PieceKind::Knight => 350,
        PieceKind::Silver => 500,
        PieceKind::Gold => 550,
        PieceKind::Bishop => 800,
        PieceKind::Rook => 1000,
        PieceKind::King => 0,
        PieceKind::PromotedPawn => 550,
        PieceKind::PromotedLance => 550,
        PieceKind::PromotedKnight => 550,
        PieceKind::PromotedSilver => 550,
        PieceKind::Horse => 1050,
        PieceKind::Dragon => 1250,
    }
}

/// Held pieces are worth a little more than the same piece on the board.
fn hand_value(kind: PieceKind) -> i32 {
    piece_value(kind) * 11 / 10
}

/// Material balance from the side to move's point of view.
pub fn evaluate(position: &Position) -> i32 {
    let us = position.turn();
    let them = us.opponent();
    let board: i32 = position.pieces(us).map(|(_, p)| piece_value(p.kind)).sum::<i32>()
        - position.pieces(them).map(|(_, p)| piece_value(p.kind)).sum::<i32>();
    let hands: i32 = HAND_KINDS
        .iter()
        .map(|&kind| {
            (position.hand(us, kind) as i32 - position.hand(them, kind) as i32) * hand_value(kind)
        })
        .sum();
    board + hands
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Outcome {
    Complete(Option<Action>, i32),
    TimedOut,
}

/// Negamax alpha-beta with iterative deepening and a wall-clock cutoff.
///
/// The depth-1 iteration never times out, so any position with a legal
/// action yields one.
#[derive(Debug, Clone)]
pub struct AlphaBetaSearch<R> {
    rules: R,
    started: Instant,
    time_limit: Duration,
    nodes: u64,
}

impl<R: RulesOracle> AlphaBetaSearch<R> {
    /// Creates a searcher that consults `rules` for move generation.
    pub fn new(rules: R) -> Self {
        Self {
            rules,
            started: Instant::now(),
            time_limit: Duration::ZERO,
            nodes: 0,
        }
    }

    /// Nodes visited by the most recent search.
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    /// Successors ordered captures and promotions first, biggest gain first.
    fn ordered(&self, position: &Position) -> Vec<(Action, Position)> {
        let mut moves = self.rules.successors(position);
        moves.sort_by_cached_key(|(action, _)| {
            let gain = match *action {
                Action::Board { to, promote, from } => {
                    let victim = position.get(to).map(|p| piece_value(p.kind)).unwrap_or(0);
                    let promotion = match (promote, position.get(from)) {
                        (true, Some(p)) => piece_value(p.kind.promoted()) - piece_value(p.kind),
                        _ => 0,
                    };
                    victim + promotion
                }
                Action::Drop { .. } => 0,
            };
            -gain
        });
        moves
    }

    fn negamax(
        &mut self,
        position: &Position,
        depth: u8,
        root_depth: u8,
        ply: i32,
        mut alpha: i32,
        beta: i32,
    ) -> Outcome {
        if root_depth > 1 && self.started.elapsed() >= self.time_limit {
            return Outcome::TimedOut;
        }
        self.nodes += 1;

        if depth == 0 {
            return Outcome::Complete(None, evaluate(position));
        }

        let moves = self.ordered(position);
        if moves.is_empty() {
            // No legal action loses in shogi; nearer mates score higher.
            return Outcome::Complete(None, -MATE + ply);
        }

        let mut best_action = None;
        let mut best_score = -INFINITY;
        for (action, next) in moves {
            match self.negamax(&next, depth - 1, root_depth, ply + 1, -beta, -alpha) {
                Outcome::TimedOut => return Outcome::TimedOut,
                Outcome::Complete(_, score) => {
                    let score = -score;
                    if score > best_score {
                        best_score = score;
                        best_action = Some(action);
                    }
                    alpha = alpha.max(score);
                    if alpha >= beta {
                        break;
                    }
                }
            }
        }
        Outcome::Complete(best_action, best_score)
    }
}

impl<R: RulesOracle> SearchOracle for AlphaBetaSearch<R> {
    #[instrument(skip(self, position), fields(sfen = %position, depth = budget.depth))]
    fn best_action(&mut self, position: &Position, budget: SearchBudget) -> Option<Action> {
        self.started = Instant::now();
        self.time_limit = budget.time_limit;
        self.nodes = 0;

        let mut best = None;
        for depth in 1..=budget.depth.max(1) {
            match self.negamax(position, depth, depth, 0, -INFINITY, INFINITY) {
                Outcome::Complete(action, score) => {
                    debug!(depth, score, nodes = self.nodes, best = ?action.map(|a| a.to_usi()), "Iteration complete");
                    best = action;
                    if best.is_none() || score.abs() >= MATE - i32::from(depth) {
                        break;
                    }
                }
                Outcome::TimedOut => {
                    debug!(depth, elapsed_ms = self.started.elapsed().as_millis() as u64, "Search timed out");
                    break;
                }
            }
        }
        best
    }
}
