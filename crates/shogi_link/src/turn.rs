//! Local turn state machine.
//!
//! One [`TurnMachine`] holds a client's authoritative view of the game.
//! Local clicks, remote log entries and engine replies all end in
//! [`TurnMachine::commit`], so turn order, promotion and echo
//! suppression hold no matter where an action came from.

use serde::{Deserialize, Serialize};
use shogi_rules::{
    Action, GameStatus, PieceKind, Position, Rejection, RulesOracle, Side, Square,
    promotion_eligible,
};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, instrument, warn};

/// Occurrences of one position that end the game in a draw.
const REPETITION_LIMIT: u8 = 4;

/// Which sides this client plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    /// Both sides take input from this client.
    HotSeat,
    /// Only the given side takes input from this client.
    Side(Side),
}

impl Control {
    /// True when input for `side` comes from this client.
    pub fn is_local(self, side: Side) -> bool {
        match self {
            Control::HotSeat => true,
            Control::Side(local) => local == side,
        }
    }
}

/// First half of a local action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A piece on the board.
    Square(Square),
    /// A piece kind in a hand.
    Hand {
        /// Kind to drop.
        kind: PieceKind,
        /// Owner of the hand.
        side: Side,
    },
}

/// A completed board action waiting on the yes/no promotion answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPromotion {
    /// Origin square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
}

impl PendingPromotion {
    /// The action this answer completes.
    pub fn action(self, promote: bool) -> Action {
        Action::Board {
            from: self.from,
            to: self.to,
            promote,
        }
    }
}

/// Observable state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing selected.
    Idle,
    /// A selection exists and its targets are known.
    Selecting,
    /// A promotion-eligible action waits for the answer.
    AwaitingPromotionChoice,
    /// No further actions are accepted.
    GameOver(GameStatus),
}

/// Where a committed action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MoveSource {
    /// Input on this client.
    Local,
    /// The opponent, via the session log.
    Remote,
    /// The search engine.
    Engine,
}

/// Outcome of one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A piece or hand entry was selected; `targets` legal completions exist.
    Selected {
        /// Number of legal completions.
        targets: usize,
    },
    /// The selection was clicked again.
    Deselected,
    /// A non-target was clicked; the selection is gone.
    Cleared,
    /// The action waits for the promotion answer.
    AwaitingPromotion(PendingPromotion),
    /// The action was applied.
    Committed(Action),
    /// The rules refused the action; selection and pending state are gone.
    Rejected(Rejection),
    /// Input arrived when it could not apply (wrong side, game over, pending answer).
    Ignored,
}

/// A local commit waiting to be sent to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// The committed action.
    pub action: Action,
    /// Side that played it.
    pub side: Side,
    /// SFEN after the action.
    pub snapshot: String,
    /// Ply index of the action, which is also its expected log sequence.
    pub sequence: u64,
}

/// Authoritative local game state plus in-flight input.
#[derive(Debug, Clone)]
pub struct TurnMachine<R> {
    rules: R,
    control: Control,
    origin: Position,
    position: Position,
    status: GameStatus,
    selection: Option<Selection>,
    targets: Vec<Action>,
    pending: Option<PendingPromotion>,
    history: Vec<Action>,
    seen: HashMap<String, u8>,
    outbox: VecDeque<Outbound>,
}

impl<R: RulesOracle> TurnMachine<R> {
    /// Starts from the initial position.
    pub fn new(rules: R, control: Control) -> Self {
        Self::from_position(rules, Position::initial(), control)
    }

    /// Starts from an arbitrary position.
    #[instrument(skip(rules, position), fields(sfen = %position))]
    pub fn from_position(rules: R, position: Position, control: Control) -> Self {
        let status = rules.status(&position);
        let mut seen = HashMap::new();
        seen.insert(position.repetition_key(), 1);
        debug!(?control, ?status, "Turn machine ready");
        Self {
            rules,
            control,
            origin: position.clone(),
            position,
            status,
            selection: None,
            targets: Vec::new(),
            pending: None,
            history: Vec::new(),
            seen,
            outbox: VecDeque::new(),
        }
    }

    /// Discards the game and starts again from the initial position.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        info!(plies = self.history.len(), "Resetting game");
        let position = Position::initial();
        self.status = self.rules.status(&position);
        self.seen.clear();
        self.seen.insert(position.repetition_key(), 1);
        self.origin = position.clone();
        self.position = position;
        self.history.clear();
        self.outbox.clear();
        self.clear_input();
    }

    // ─────────────────────────────────────────────────────────────
    //  Accessors
    // ─────────────────────────────────────────────────────────────

    /// Current position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Game status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Which sides are local.
    pub fn control(&self) -> Control {
        self.control
    }

    /// Hands input for the given sides to this client, e.g. after the engine is lost.
    pub fn set_control(&mut self, control: Control) {
        self.control = control;
    }

    /// Current selection.
    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Legal completions of the current selection.
    pub fn targets(&self) -> &[Action] {
        &self.targets
    }

    /// Action awaiting the promotion answer.
    pub fn pending(&self) -> Option<PendingPromotion> {
        self.pending
    }

    /// Actions committed so far, in order.
    pub fn history(&self) -> &[Action] {
        &self.history
    }

    /// The rules this machine consults.
    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Observable state.
    pub fn phase(&self) -> Phase {
        if self.status.is_over() {
            Phase::GameOver(self.status)
        } else if self.pending.is_some() {
            Phase::AwaitingPromotionChoice
        } else if self.selection.is_some() {
            Phase::Selecting
        } else {
            Phase::Idle
        }
    }

    /// True when the side to move takes input from this client.
    pub fn is_local_turn(&self) -> bool {
        self.control.is_local(self.position.turn())
    }

    /// Drains local commits that still need to reach the session.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.outbox.drain(..).collect()
    }

    // ─────────────────────────────────────────────────────────────
    //  Local input
    // ─────────────────────────────────────────────────────────────

    fn accepts_input(&self) -> bool {
        !self.status.is_over() && self.pending.is_none() && self.is_local_turn()
    }

    fn clear_input(&mut self) {
        self.selection = None;
        self.targets.clear();
        self.pending = None;
    }

    fn owns(&self, square: Square) -> bool {
        self.position
            .get(square)
            .is_some_and(|piece| piece.side == self.position.turn())
    }

    fn select_square(&mut self, square: Square) -> Transition {
        self.targets = self.rules.targets_from(&self.position, square);
        self.selection = Some(Selection::Square(square));
        debug!(%square, targets = self.targets.len(), "Selected piece");
        Transition::Selected {
            targets: self.targets.len(),
        }
    }

    /// A click on a board square.
    #[instrument(skip(self), fields(square = %square))]
    pub fn click_square(&mut self, square: Square) -> Transition {
        if !self.accepts_input() {
            return Transition::Ignored;
        }

        let Some(selection) = self.selection else {
            return if self.owns(square) {
                self.select_square(square)
            } else {
                Transition::Ignored
            };
        };

        if selection == Selection::Square(square) {
            self.clear_input();
            return Transition::Deselected;
        }
        if self.owns(square) {
            return self.select_square(square);
        }

        let Some(action) = self.targets.iter().copied().find(|a| a.to() == square) else {
            debug!("Click outside targets, clearing selection");
            self.clear_input();
            return Transition::Cleared;
        };

        if let Action::Board { from, to, .. } = action {
            let side = self.position.turn();
            let eligible = self
                .position
                .get(from)
                .is_some_and(|piece| promotion_eligible(piece.kind, side, from, to));
            if eligible {
                let pending = PendingPromotion { from, to };
                self.selection = None;
                self.targets.clear();
                self.pending = Some(pending);
                debug!(%from, %to, "Awaiting promotion choice");
                return Transition::AwaitingPromotion(pending);
            }
        }
        self.commit(action, MoveSource::Local)
    }

    /// A click on a hand entry.
    #[instrument(skip(self))]
    pub fn click_hand(&mut self, kind: PieceKind, side: Side) -> Transition {
        if !self.accepts_input() || side != self.position.turn() {
            return Transition::Ignored;
        }
        let selection = Selection::Hand { kind, side };
        if self.selection == Some(selection) {
            self.clear_input();
            return Transition::Deselected;
        }
        if self.position.hand(side, kind) == 0 {
            return Transition::Ignored;
        }
        self.targets = self.rules.drops_for(&self.position, kind, side);
        self.selection = Some(selection);
        debug!(targets = self.targets.len(), "Selected hand piece");
        Transition::Selected {
            targets: self.targets.len(),
        }
    }

    /// The yes/no answer to a pending promotion.
    #[instrument(skip(self))]
    pub fn answer_promotion(&mut self, promote: bool) -> Transition {
        let Some(pending) = self.pending.take() else {
            return Transition::Ignored;
        };
        self.commit(pending.action(promote), MoveSource::Local)
    }

    /// A fully specified local action (typed notation rather than clicks).
    #[instrument(skip(self), fields(action = %action))]
    pub fn play_local(&mut self, action: Action) -> Transition {
        if !self.accepts_input() {
            return Transition::Ignored;
        }
        self.commit(action, MoveSource::Local)
    }

    // ─────────────────────────────────────────────────────────────
    //  Remote and engine actions
    // ─────────────────────────────────────────────────────────────

    /// Applies an opponent action from the session log. Never forwarded.
    pub fn apply_remote(&mut self, action: Action) -> Transition {
        self.commit(action, MoveSource::Remote)
    }

    /// Applies an engine reply. Never forwarded.
    pub fn apply_engine(&mut self, action: Action) -> Transition {
        self.commit(action, MoveSource::Engine)
    }

    /// Takes back every action after the first `plies` by replaying the rest
    /// from the starting position.
    ///
    /// Input state and queued outbound commits are dropped. Returns false,
    /// changing nothing, when the kept actions no longer replay.
    #[instrument(skip(self), fields(plies_now = self.history.len()))]
    pub fn rewind(&mut self, plies: usize) -> bool {
        if plies > self.history.len() {
            return false;
        }
        let mut position = self.origin.clone();
        let mut seen = HashMap::new();
        seen.insert(position.repetition_key(), 1u8);
        for action in &self.history[..plies] {
            position = match self.rules.apply(&position, action) {
                Ok(next) => next,
                Err(rejection) => {
                    warn!(%rejection, "Kept history no longer replays");
                    return false;
                }
            };
            *seen.entry(position.repetition_key()).or_insert(0) += 1;
        }

        let mut status = self.rules.status(&position);
        let repeated = seen
            .get(&position.repetition_key())
            .is_some_and(|count| *count >= REPETITION_LIMIT);
        if !status.is_over() && repeated {
            status = GameStatus::Draw;
        }
        info!(plies, ?status, "Rewound game");
        self.position = position;
        self.seen = seen;
        self.status = status;
        self.history.truncate(plies);
        self.outbox.clear();
        self.clear_input();
        true
    }

    /// Ends the game with `side` giving up.
    #[instrument(skip(self))]
    pub fn resign(&mut self, side: Side) {
        if self.status.is_over() {
            return;
        }
        self.status = GameStatus::Resigned {
            winner: side.opponent(),
        };
        self.clear_input();
        info!(status = ?self.status, "Side resigned");
    }

    /// Validates `action` against the current position and applies it.
    ///
    /// Selection and pending promotion are cleared whatever the outcome.
    /// Local commits are queued for [`TurnMachine::take_outbound`].
    #[instrument(skip(self), fields(action = %action, source = %source))]
    pub fn commit(&mut self, action: Action, source: MoveSource) -> Transition {
        if self.status.is_over() {
            debug!("Game over, ignoring action");
            return Transition::Ignored;
        }
        self.clear_input();

        let mover = self.position.turn();
        let sequence = self.history.len() as u64;
        let next = match self.rules.apply(&self.position, &action) {
            Ok(next) => next,
            Err(rejection) => {
                if source == MoveSource::Local {
                    debug!(%rejection, "Local action dropped");
                } else {
                    warn!(%rejection, "Non-local action rejected by rules");
                }
                return Transition::Rejected(rejection);
            }
        };

        self.position = next;
        self.history.push(action);
        let count = self.seen.entry(self.position.repetition_key()).or_insert(0);
        *count += 1;
        let repeated = *count >= REPETITION_LIMIT;

        self.status = self.rules.status(&self.position);
        if !self.status.is_over() && repeated {
            self.status = GameStatus::Draw;
        }

        if source == MoveSource::Local {
            self.outbox.push_back(Outbound {
                action,
                side: mover,
                snapshot: self.position.to_sfen(),
                sequence,
            });
        }

        info!(
            side = %mover,
            ply = self.history.len(),
            status = ?self.status,
            "Action committed"
        );
        Transition::Committed(action)
    }
}
