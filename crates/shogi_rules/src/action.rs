//! First-class action types for shogi.
//!
//! An action is the unit exchanged between clients: fully specified,
//! immutable, and independent of the position it is applied to.

use crate::{ParseError, PieceKind, Side, Square};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A move on the board or a placement from hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Moves the piece on `from` to `to`, optionally promoting it.
    Board {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
        /// Whether the piece promotes on arrival.
        promote: bool,
    },
    /// Places a held piece of `kind` on the empty square `to`.
    Drop {
        /// Kind taken from hand.
        kind: PieceKind,
        /// Destination square.
        to: Square,
        /// Owner of the hand.
        side: Side,
    },
}

impl Action {
    /// Destination square of either action shape.
    pub fn to(&self) -> Square {
        match self {
            Action::Board { to, .. } | Action::Drop { to, .. } => *to,
        }
    }

    /// Origin square for board actions.
    pub fn origin(&self) -> Option<Square> {
        match self {
            Action::Board { from, .. } => Some(*from),
            Action::Drop { .. } => None,
        }
    }

    /// True for reserve placements.
    pub fn is_drop(&self) -> bool {
        matches!(self, Action::Drop { .. })
    }

    /// Parses USI notation (`7g7f`, `8h2b+`, `P*5e`).
    ///
    /// USI drops carry no owner, so `side` supplies it.
    pub fn from_usi(s: &str, side: Side) -> Result<Self, ParseError> {
        let err = || ParseError::Usi(s.to_string());
        if let Some((letter, square)) = s.split_once('*') {
            let mut chars = letter.chars();
            let kind = match (chars.next(), chars.next()) {
                (Some(c), None) => PieceKind::from_letter(c).ok_or_else(err)?,
                _ => return Err(err()),
            };
            if kind.hand_index().is_none() {
                return Err(err());
            }
            let to = square.parse().map_err(|_| err())?;
            return Ok(Action::Drop { kind, to, side });
        }

        let (body, promote) = match s.strip_suffix('+') {
            Some(body) => (body, true),
            None => (s, false),
        };
        if body.len() != 4 || !body.is_ascii() {
            return Err(err());
        }
        let from = body[..2].parse().map_err(|_| err())?;
        let to = body[2..].parse().map_err(|_| err())?;
        Ok(Action::Board { from, to, promote })
    }

    /// Formats the action as USI notation.
    pub fn to_usi(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Board { from, to, promote } => {
                write!(f, "{}{}{}", from, to, if *promote { "+" } else { "" })
            }
            Action::Drop { kind, to, .. } => write!(f, "{}*{}", kind.letter(), to),
        }
    }
}
