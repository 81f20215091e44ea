//! Shogi rules for networked play.
//!
//! This crate holds everything about the game itself and nothing about the
//! network: board coordinates, actions, positions with SFEN and USI codecs,
//! the [`RulesOracle`] and [`SearchOracle`] seams, and a reference
//! implementation of each ([`StandardRules`], [`AlphaBetaSearch`]).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod error;
mod oracle;
mod position;
mod rules;
mod search;
mod square;
mod types;

pub use action::Action;
pub use error::{ParseError, Rejection};
pub use oracle::{RulesOracle, SearchBudget, SearchOracle};
pub use position::{INITIAL_SFEN, Position};
pub use rules::{StandardRules, in_check, promotion_eligible};
pub use search::{AlphaBetaSearch, evaluate};
pub use square::Square;
pub use types::{GameStatus, HAND_KINDS, Piece, PieceKind, Side};
