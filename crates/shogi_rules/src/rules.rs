//! Reference implementation of standard shogi rules.

use crate::{
    Action, GameStatus, HAND_KINDS, Piece, PieceKind, Position, Rejection, RulesOracle, Side,
    Square,
};
use tracing::{instrument, trace};

// ─────────────────────────────────────────────────────────────
//  Movement tables (Black's orientation, forward is rank - 1)
// ─────────────────────────────────────────────────────────────

const FORWARD: [(i8, i8); 1] = [(0, -1)];
const KNIGHT_STEPS: [(i8, i8); 2] = [(-1, -2), (1, -2)];
const SILVER_STEPS: [(i8, i8); 5] = [(-1, -1), (0, -1), (1, -1), (-1, 1), (1, 1)];
const GOLD_STEPS: [(i8, i8); 6] = [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (0, 1)];
const KING_STEPS: [(i8, i8); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
const DIAGONALS: [(i8, i8); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];
const ORTHOGONALS: [(i8, i8); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

struct Movement {
    steps: &'static [(i8, i8)],
    slides: &'static [(i8, i8)],
}

fn movement(kind: PieceKind) -> Movement {
    let (steps, slides): (&'static [(i8, i8)], &'static [(i8, i8)]) = match kind {
        PieceKind::Pawn => (&FORWARD, &[]),
        PieceKind::Lance => (&[], &FORWARD),
        PieceKind::Knight => (&KNIGHT_STEPS, &[]),
        PieceKind::Silver => (&SILVER_STEPS, &[]),
        PieceKind::Gold
        | PieceKind::PromotedPawn
        | PieceKind::PromotedLance
        | PieceKind::PromotedKnight
        | PieceKind::PromotedSilver => (&GOLD_STEPS, &[]),
        PieceKind::King => (&KING_STEPS, &[]),
        PieceKind::Bishop => (&[], &DIAGONALS),
        PieceKind::Rook => (&[], &ORTHOGONALS),
        PieceKind::Horse => (&ORTHOGONALS, &DIAGONALS),
        PieceKind::Dragon => (&DIAGONALS, &ORTHOGONALS),
    };
    Movement { steps, slides }
}

fn orient(side: Side, (df, dr): (i8, i8)) -> (i8, i8) {
    // Tables are written for Black; White mirrors them through the centre.
    match side {
        Side::Black => (df, dr),
        Side::White => (-df, -dr),
    }
}

/// Squares the piece on `from` attacks or may move to (own pieces excluded).
fn reachable(position: &Position, from: Square, piece: Piece) -> Vec<Square> {
    let movement = movement(piece.kind);
    let mut out = Vec::new();

    for &step in movement.steps {
        let (df, dr) = orient(piece.side, step);
        if let Some(to) = from.offset(df, dr) {
            match position.get(to) {
                Some(other) if other.side == piece.side => {}
                _ => out.push(to),
            }
        }
    }

    for &dir in movement.slides {
        let (df, dr) = orient(piece.side, dir);
        let mut cursor = from;
        while let Some(next) = cursor.offset(df, dr) {
            match position.get(next) {
                None => {
                    out.push(next);
                    cursor = next;
                }
                Some(other) => {
                    if other.side != piece.side {
                        out.push(next);
                    }
                    break;
                }
            }
        }
    }

    out
}

/// True when any piece of `by` attacks `target`.
fn attacked(position: &Position, target: Square, by: Side) -> bool {
    position
        .pieces(by)
        .any(|(sq, piece)| reachable(position, sq, piece).contains(&target))
}

/// True when `side`'s king is attacked.
pub fn in_check(position: &Position, side: Side) -> bool {
    position
        .king_square(side)
        .is_some_and(|king| attacked(position, king, side.opponent()))
}

/// True when `kind` arriving on `to` could never move again unpromoted.
fn is_dead_square(kind: PieceKind, side: Side, to: Square) -> bool {
    let rank = to.relative_rank(side);
    match kind {
        PieceKind::Pawn | PieceKind::Lance => rank == 1,
        PieceKind::Knight => rank <= 2,
        _ => false,
    }
}

/// Promotion rule: a promotable kind whose origin or destination lies in the zone.
pub fn promotion_eligible(kind: PieceKind, side: Side, from: Square, to: Square) -> bool {
    kind.can_promote() && (from.in_promotion_zone(side) || to.in_promotion_zone(side))
}

fn has_unpromoted_pawn_on_file(position: &Position, side: Side, file: u8) -> bool {
    (1..=9).any(|rank| {
        Square::new(file, rank).and_then(|sq| position.get(sq))
            == Some(Piece::new(PieceKind::Pawn, side))
    })
}

/// Applies an action without validating it.
fn play(position: &Position, action: &Action) -> Position {
    let mut next = position.clone();
    let mover = position.turn();
    match *action {
        Action::Board { from, to, promote } => {
            if let Some(piece) = next.get(from) {
                next.set(from, None);
                if let Some(captured) = next.get(to) {
                    next.add_to_hand(mover, captured.kind);
                }
                let kind = if promote { piece.kind.promoted() } else { piece.kind };
                next.set(to, Some(Piece::new(kind, piece.side)));
            }
        }
        Action::Drop { kind, to, side } => {
            next.take_from_hand(side, kind);
            next.set(to, Some(Piece::new(kind, side)));
        }
    }
    next.pass_turn();
    next
}

/// Standard shogi: movement, captures to hand, forced promotion, drop
/// restrictions (nifu, dead squares, pawn-drop mate) and king safety.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl StandardRules {
    /// Creates the rules oracle.
    pub fn new() -> Self {
        Self
    }

    /// Final legality gate shared by generation and validation.
    fn settle(&self, position: &Position, action: &Action) -> Result<Position, Rejection> {
        let mover = position.turn();
        let next = play(position, action);
        if in_check(&next, mover) {
            return Err(Rejection::LeavesKingInCheck);
        }
        if let Action::Drop { kind: PieceKind::Pawn, to, .. } = *action
            && self.is_pawn_drop_mate(&next)
        {
            return Err(Rejection::IllegalDrop(to));
        }
        Ok(next)
    }

    fn is_pawn_drop_mate(&self, after: &Position) -> bool {
        let defender = after.turn();
        in_check(after, defender) && self.generate(after).is_empty()
    }

    fn board_candidates(&self, position: &Position, from: Square) -> Vec<Action> {
        let Some(piece) = position.get(from) else {
            return Vec::new();
        };
        if piece.side != position.turn() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for to in reachable(position, from, piece) {
            if promotion_eligible(piece.kind, piece.side, from, to) {
                out.push(Action::Board { from, to, promote: true });
            }
            if !is_dead_square(piece.kind, piece.side, to) {
                out.push(Action::Board { from, to, promote: false });
            }
        }
        out
    }

    fn drop_candidates(&self, position: &Position, kind: PieceKind, side: Side) -> Vec<Action> {
        if side != position.turn() || position.hand(side, kind) == 0 {
            return Vec::new();
        }
        Square::all()
            .filter(|to| position.get(*to).is_none())
            .filter(|to| !is_dead_square(kind, side, *to))
            .filter(|to| kind != PieceKind::Pawn || !has_unpromoted_pawn_on_file(position, side, to.file()))
            .map(|to| Action::Drop { kind, to, side })
            .collect()
    }

    fn generate(&self, position: &Position) -> Vec<(Action, Position)> {
        let side = position.turn();
        let mut candidates: Vec<Action> = position
            .pieces(side)
            .flat_map(|(sq, _)| self.board_candidates(position, sq))
            .collect();
        for kind in HAND_KINDS {
            candidates.extend(self.drop_candidates(position, kind, side));
        }
        candidates
            .into_iter()
            .filter_map(|action| self.settle(position, &action).ok().map(|next| (action, next)))
            .collect()
    }
}

impl RulesOracle for StandardRules {
    #[instrument(skip(self, position), fields(from = %from))]
    fn targets_from(&self, position: &Position, from: Square) -> Vec<Action> {
        self.board_candidates(position, from)
            .into_iter()
            .filter(|action| self.settle(position, action).is_ok())
            .collect()
    }

    #[instrument(skip(self, position))]
    fn drops_for(&self, position: &Position, kind: PieceKind, side: Side) -> Vec<Action> {
        self.drop_candidates(position, kind, side)
            .into_iter()
            .filter(|action| self.settle(position, action).is_ok())
            .collect()
    }

    #[instrument(skip(self, position), fields(action = %action))]
    fn apply(&self, position: &Position, action: &Action) -> Result<Position, Rejection> {
        match *action {
            Action::Board { from, to, promote } => {
                let piece = position.get(from).ok_or(Rejection::EmptySquare(from))?;
                if piece.side != position.turn() {
                    return Err(Rejection::NotYourPiece(from));
                }
                if !reachable(position, from, piece).contains(&to) {
                    return Err(Rejection::IllegalDestination(to));
                }
                let eligible = promotion_eligible(piece.kind, piece.side, from, to);
                if promote && !eligible {
                    return Err(Rejection::PromotionNotAllowed);
                }
                if !promote && is_dead_square(piece.kind, piece.side, to) {
                    return Err(Rejection::PromotionRequired);
                }
            }
            Action::Drop { kind, to, side } => {
                if side != position.turn() {
                    return Err(Rejection::WrongSide);
                }
                if position.hand(side, kind) == 0 {
                    return Err(Rejection::NoPieceInHand(kind));
                }
                let nifu = kind == PieceKind::Pawn
                    && has_unpromoted_pawn_on_file(position, side, to.file());
                if position.get(to).is_some() || is_dead_square(kind, side, to) || nifu {
                    return Err(Rejection::IllegalDrop(to));
                }
            }
        }
        let result = self.settle(position, action);
        if let Err(rejection) = &result {
            trace!(%rejection, "Action rejected");
        }
        result
    }

    fn legal_actions(&self, position: &Position) -> Vec<Action> {
        self.generate(position).into_iter().map(|(action, _)| action).collect()
    }

    fn status(&self, position: &Position) -> GameStatus {
        if self.generate(position).is_empty() {
            GameStatus::Checkmate { winner: position.turn().opponent() }
        } else {
            GameStatus::Playing
        }
    }

    fn successors(&self, position: &Position) -> Vec<(Action, Position)> {
        self.generate(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        s.parse().expect("valid square")
    }

    fn pos(sfen: &str) -> Position {
        Position::from_sfen(sfen).expect("valid sfen")
    }

    #[test]
    fn test_initial_move_count() {
        let rules = StandardRules::new();
        assert_eq!(rules.legal_actions(&Position::initial()).len(), 30);
    }

    #[test]
    fn test_pawn_push() {
        let rules = StandardRules::new();
        let start = Position::initial();
        let action = Action::Board { from: sq("7g"), to: sq("7f"), promote: false };
        let next = rules.apply(&start, &action).expect("legal");
        assert_eq!(next.turn(), Side::White);
        assert_eq!(next.get(sq("7f")), Some(Piece::new(PieceKind::Pawn, Side::Black)));
        assert_eq!(next.get(sq("7g")), None);
    }

    #[test]
    fn test_moving_opponent_piece_rejected() {
        let rules = StandardRules::new();
        let action = Action::Board { from: sq("3c"), to: sq("3d"), promote: false };
        assert_eq!(
            rules.apply(&Position::initial(), &action),
            Err(Rejection::NotYourPiece(sq("3c")))
        );
    }

    #[test]
    fn test_forced_promotion() {
        let rules = StandardRules::new();
        let position = pos("4k4/9/P8/9/9/9/9/9/4K4 b - 1");
        let stay = Action::Board { from: sq("9c"), to: sq("9b"), promote: false };
        let promote = Action::Board { from: sq("9c"), to: sq("9b"), promote: true };
        assert!(rules.apply(&position, &stay).is_ok());
        assert!(rules.apply(&position, &promote).is_ok());

        let position = pos("4k4/P8/9/9/9/9/9/9/4K4 b - 1");
        let stay = Action::Board { from: sq("9b"), to: sq("9a"), promote: false };
        assert_eq!(rules.apply(&position, &stay), Err(Rejection::PromotionRequired));
        let targets = rules.targets_from(&position, sq("9b"));
        assert_eq!(targets, vec![Action::Board { from: sq("9b"), to: sq("9a"), promote: true }]);
    }

    #[test]
    fn test_promotion_outside_zone_rejected() {
        let rules = StandardRules::new();
        let action = Action::Board { from: sq("7g"), to: sq("7f"), promote: true };
        assert_eq!(
            rules.apply(&Position::initial(), &action),
            Err(Rejection::PromotionNotAllowed)
        );
    }

    #[test]
    fn test_capture_goes_to_hand_unpromoted() {
        let rules = StandardRules::new();
        let position = pos("4k4/9/9/9/4+p4/4R4/9/9/4K4 b - 1");
        let action = Action::Board { from: sq("5f"), to: sq("5e"), promote: false };
        let next = rules.apply(&position, &action).expect("legal");
        assert_eq!(next.hand(Side::Black, PieceKind::Pawn), 1);
    }

    #[test]
    fn test_nifu_rejected() {
        let rules = StandardRules::new();
        let position = pos("4k4/9/9/9/9/9/4P4/9/K8 b P 1");
        let action = Action::Drop { kind: PieceKind::Pawn, to: sq("5e"), side: Side::Black };
        assert_eq!(rules.apply(&position, &action), Err(Rejection::IllegalDrop(sq("5e"))));
        let drops = rules.drops_for(&position, PieceKind::Pawn, Side::Black);
        assert!(drops.iter().all(|a| a.to().file() != 5));
        assert!(!drops.is_empty());
    }

    #[test]
    fn test_drop_on_dead_square_rejected() {
        let rules = StandardRules::new();
        let position = pos("4k4/9/9/9/9/9/9/9/K8 b N 1");
        let action = Action::Drop { kind: PieceKind::Knight, to: sq("1b"), side: Side::Black };
        assert_eq!(rules.apply(&position, &action), Err(Rejection::IllegalDrop(sq("1b"))));
    }

    #[test]
    fn test_pinned_piece_cannot_leave_line() {
        let rules = StandardRules::new();
        // White rook on 5a pins the Black gold on 5e against the king on 5i.
        let position = pos("k3r4/9/9/9/4G4/9/9/9/4K4 b - 1");
        let action = Action::Board { from: sq("5e"), to: sq("4e"), promote: false };
        assert_eq!(rules.apply(&position, &action), Err(Rejection::LeavesKingInCheck));
    }

    #[test]
    fn test_checkmate_status() {
        let rules = StandardRules::new();
        // White king boxed in on 1a by a gold on 1b defended by a silver on 2c.
        let position = pos("8k/8G/7S1/9/9/9/9/9/K8 w - 1");
        assert_eq!(
            rules.status(&position),
            GameStatus::Checkmate { winner: Side::Black }
        );
        assert_eq!(rules.status(&Position::initial()), GameStatus::Playing);
    }

    #[test]
    fn test_pawn_drop_mate_rejected() {
        let rules = StandardRules::new();
        // Gold on 2c guards 1b and 2b, knight on 3c guards 2a.
        let position = pos("8k/9/6NG1/9/9/9/9/9/K8 b P 1");
        let action = Action::Drop { kind: PieceKind::Pawn, to: sq("1b"), side: Side::Black };
        assert_eq!(rules.apply(&position, &action), Err(Rejection::IllegalDrop(sq("1b"))));
    }

    #[test]
    fn test_pawn_drop_check_with_escape_allowed() {
        let rules = StandardRules::new();
        let position = pos("8k/9/7G1/9/9/9/9/9/K8 b P 1");
        let action = Action::Drop { kind: PieceKind::Pawn, to: sq("1b"), side: Side::Black };
        let next = rules.apply(&position, &action).expect("king can flee to 2a");
        assert!(in_check(&next, Side::White));
    }
}
