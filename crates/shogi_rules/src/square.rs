//! Board coordinates in USI notation.

use crate::{ParseError, Side};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A square on the 9x9 board.
///
/// Files run 1-9 right to left from Black's seat, ranks run 1-9 (`a`-`i`)
/// from White's back rank towards Black's. Serialized as its USI name
/// (`"7g"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Creates a square, `None` when either coordinate is outside 1-9.
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        if (1..=9).contains(&file) && (1..=9).contains(&rank) {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    /// File number (1-9).
    pub fn file(self) -> u8 {
        self.file
    }

    /// Rank number (1-9).
    pub fn rank(self) -> u8 {
        self.rank
    }

    /// Dense index 0-80, rank-major.
    pub fn index(self) -> usize {
        (self.rank as usize - 1) * 9 + (self.file as usize - 1)
    }

    /// Inverse of [`Square::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= 81 {
            return None;
        }
        Self::new((index % 9) as u8 + 1, (index / 9) as u8 + 1)
    }

    /// Iterates all 81 squares in index order.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..81).filter_map(Square::from_index)
    }

    /// The square `(df, dr)` away, if still on the board.
    pub fn offset(self, df: i8, dr: i8) -> Option<Self> {
        let file = self.file as i8 + df;
        let rank = self.rank as i8 + dr;
        if file < 1 || rank < 1 {
            return None;
        }
        Self::new(file as u8, rank as u8)
    }

    /// Rank counted from `side`'s far edge: 1 is the last rank that side moves towards.
    pub fn relative_rank(self, side: Side) -> u8 {
        match side {
            Side::Black => self.rank,
            Side::White => 10 - self.rank,
        }
    }

    /// True when the square lies in `side`'s promotion zone (its far three ranks).
    pub fn in_promotion_zone(self, side: Side) -> bool {
        self.relative_rank(side) <= 3
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file, (b'a' + self.rank - 1) as char)
    }
}

impl FromStr for Square {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(ParseError::Square(s.to_string()));
        }
        let file = bytes[0].wrapping_sub(b'0');
        let rank = bytes[1].wrapping_sub(b'a').wrapping_add(1);
        Square::new(file, rank).ok_or_else(|| ParseError::Square(s.to_string()))
    }
}

impl TryFrom<String> for Square {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}
