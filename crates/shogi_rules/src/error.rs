//! Error types for rule adjudication and notation parsing.

use crate::{PieceKind, Square};
use serde::{Deserialize, Serialize};

/// Why the rules refused an action against a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum Rejection {
    /// No piece stands on the origin square.
    #[display("No piece on {}", _0)]
    EmptySquare(Square),

    /// The origin piece belongs to the side not on move.
    #[display("Piece on {} does not belong to the side to move", _0)]
    NotYourPiece(Square),

    /// The piece cannot reach the destination.
    #[display("Piece cannot move to {}", _0)]
    IllegalDestination(Square),

    /// Promotion was requested outside the promotion rule.
    #[display("Promotion is not allowed for this move")]
    PromotionNotAllowed,

    /// The piece would be left without a legal move unpromoted.
    #[display("This move must promote")]
    PromotionRequired,

    /// The dropping side holds no such piece.
    #[display("No {} in hand", _0)]
    NoPieceInHand(PieceKind),

    /// The drop target is occupied, dead, a second pawn on the file, or mates with a pawn.
    #[display("Cannot drop on {}", _0)]
    IllegalDrop(Square),

    /// The action would leave the mover's king attacked.
    #[display("Move leaves the king in check")]
    LeavesKingInCheck,

    /// A drop was made for the side not on move.
    #[display("It is not that side's turn")]
    WrongSide,
}

impl std::error::Error for Rejection {}

/// Failure to decode SFEN, USI or square notation.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ParseError {
    /// Malformed square such as `"0z"`.
    #[display("Invalid square: {}", _0)]
    Square(String),

    /// Malformed USI action.
    #[display("Invalid USI move: {}", _0)]
    Usi(String),

    /// Malformed SFEN position.
    #[display("Invalid SFEN: {}", _0)]
    Sfen(String),
}

impl std::error::Error for ParseError {}
