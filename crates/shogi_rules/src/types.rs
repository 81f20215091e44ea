//! Core domain types for shogi: sides, piece kinds and pieces.

use serde::{Deserialize, Serialize};

/// One of the two players.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    /// Sente, moves first.
    Black,
    /// Gote, moves second.
    White,
}

impl Side {
    /// Returns the opposing side.
    pub fn opponent(self) -> Self {
        match self {
            Side::Black => Side::White,
            Side::White => Side::Black,
        }
    }

    /// Side that plays the given zero-based ply of a game Black started.
    pub fn for_ply(ply: u64) -> Self {
        if ply % 2 == 0 { Side::Black } else { Side::White }
    }

    /// Index into per-side tables (Black = 0, White = 1).
    pub fn index(self) -> usize {
        match self {
            Side::Black => 0,
            Side::White => 1,
        }
    }
}

/// Kind of a piece, promoted forms included.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    /// Fu.
    Pawn,
    /// Kyo.
    Lance,
    /// Kei.
    Knight,
    /// Gin.
    Silver,
    /// Kin.
    Gold,
    /// Kaku.
    Bishop,
    /// Hi.
    Rook,
    /// Gyoku / Ou.
    King,
    /// Tokin.
    PromotedPawn,
    /// Narikyo.
    PromotedLance,
    /// Narikei.
    PromotedKnight,
    /// Narigin.
    PromotedSilver,
    /// Uma (promoted bishop).
    Horse,
    /// Ryu (promoted rook).
    Dragon,
}

/// Kinds that can be held in hand, in SFEN hand order.
pub const HAND_KINDS: [PieceKind; 7] = [
    PieceKind::Rook,
    PieceKind::Bishop,
    PieceKind::Gold,
    PieceKind::Silver,
    PieceKind::Knight,
    PieceKind::Lance,
    PieceKind::Pawn,
];

impl PieceKind {
    /// True for the six kinds that have a promoted form.
    pub fn can_promote(self) -> bool {
        matches!(
            self,
            PieceKind::Pawn
                | PieceKind::Lance
                | PieceKind::Knight
                | PieceKind::Silver
                | PieceKind::Bishop
                | PieceKind::Rook
        )
    }

    /// True for promoted kinds.
    pub fn is_promoted(self) -> bool {
        self.unpromoted() != self
    }

    /// Promoted form, or `self` if the kind cannot promote.
    pub fn promoted(self) -> Self {
        match self {
            PieceKind::Pawn => PieceKind::PromotedPawn,
            PieceKind::Lance => PieceKind::PromotedLance,
            PieceKind::Knight => PieceKind::PromotedKnight,
            PieceKind::Silver => PieceKind::PromotedSilver,
            PieceKind::Bishop => PieceKind::Horse,
            PieceKind::Rook => PieceKind::Dragon,
            other => other,
        }
    }

    /// Unpromoted form. Captured pieces go to hand in this form.
    pub fn unpromoted(self) -> Self {
        match self {
            PieceKind::PromotedPawn => PieceKind::Pawn,
            PieceKind::PromotedLance => PieceKind::Lance,
            PieceKind::PromotedKnight => PieceKind::Knight,
            PieceKind::PromotedSilver => PieceKind::Silver,
            PieceKind::Horse => PieceKind::Bishop,
            PieceKind::Dragon => PieceKind::Rook,
            other => other,
        }
    }

    /// Slot in a hand table, `None` for kinds that are never held.
    pub fn hand_index(self) -> Option<usize> {
        HAND_KINDS.iter().position(|k| *k == self)
    }

    /// Uppercase SFEN/USI letter of the unpromoted form.
    pub fn letter(self) -> char {
        match self.unpromoted() {
            PieceKind::Pawn => 'P',
            PieceKind::Lance => 'L',
            PieceKind::Knight => 'N',
            PieceKind::Silver => 'S',
            PieceKind::Gold => 'G',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            _ => 'K',
        }
    }

    /// Parses an SFEN/USI letter (either case) into an unpromoted kind.
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'P' => Some(PieceKind::Pawn),
            'L' => Some(PieceKind::Lance),
            'N' => Some(PieceKind::Knight),
            'S' => Some(PieceKind::Silver),
            'G' => Some(PieceKind::Gold),
            'B' => Some(PieceKind::Bishop),
            'R' => Some(PieceKind::Rook),
            'K' => Some(PieceKind::King),
            _ => None,
        }
    }
}

/// A piece on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    /// What the piece is.
    pub kind: PieceKind,
    /// Who owns it.
    pub side: Side,
}

impl Piece {
    /// Creates a piece.
    pub fn new(kind: PieceKind, side: Side) -> Self {
        Self { kind, side }
    }
}

/// Game status as adjudicated by the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GameStatus {
    /// Game is ongoing.
    Playing,
    /// Side to move has no legal action.
    Checkmate {
        /// The side that delivered mate.
        winner: Side,
    },
    /// A side gave up (engine found no move).
    Resigned {
        /// The side that did not resign.
        winner: Side,
    },
    /// Fourfold repetition.
    Draw,
}

impl GameStatus {
    /// True once the game can accept no more actions.
    pub fn is_over(self) -> bool {
        !matches!(self, GameStatus::Playing)
    }
}
