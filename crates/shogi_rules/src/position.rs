//! Full game state: board, hands, side to move.

use crate::{HAND_KINDS, ParseError, Piece, PieceKind, Side, Square};
use std::fmt;

/// SFEN of the standard starting position.
pub const INITIAL_SFEN: &str =
    "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1";

/// Most pieces of one kind a hand can hold (all eighteen pawns).
const MAX_HAND_COUNT: u32 = 18;

/// Piece placement, pieces in hand, side to move and ply count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    board: [Option<Piece>; 81],
    hands: [[u8; 7]; 2],
    turn: Side,
    ply: u32,
}

impl Position {
    /// The standard starting position, Black to move.
    pub fn initial() -> Self {
        // INITIAL_SFEN is a compile-time constant known to parse.
        Self::from_sfen(INITIAL_SFEN).unwrap_or_else(|_| Self::empty(Side::Black))
    }

    /// An empty board with empty hands.
    pub fn empty(turn: Side) -> Self {
        Self {
            board: [None; 81],
            hands: [[0; 7]; 2],
            turn,
            ply: 0,
        }
    }

    /// Piece on `square`, if any.
    pub fn get(&self, square: Square) -> Option<Piece> {
        self.board[square.index()]
    }

    /// Places or clears a piece.
    pub fn set(&mut self, square: Square, piece: Option<Piece>) {
        self.board[square.index()] = piece;
    }

    /// Side to move.
    pub fn turn(&self) -> Side {
        self.turn
    }

    /// Number of plies played from the position this one was parsed from.
    pub fn ply(&self) -> u32 {
        self.ply
    }

    /// Count of `kind` held by `side`. Zero for kinds never held.
    pub fn hand(&self, side: Side, kind: PieceKind) -> u8 {
        kind.hand_index()
            .map(|i| self.hands[side.index()][i])
            .unwrap_or(0)
    }

    /// Adds one piece of `kind` (unpromoted) to `side`'s hand.
    pub fn add_to_hand(&mut self, side: Side, kind: PieceKind) {
        if let Some(i) = kind.unpromoted().hand_index() {
            self.hands[side.index()][i] = self.hands[side.index()][i].saturating_add(1);
        }
    }

    /// Removes one piece of `kind` from `side`'s hand; false if none was held.
    pub fn take_from_hand(&mut self, side: Side, kind: PieceKind) -> bool {
        match kind.hand_index() {
            Some(i) if self.hands[side.index()][i] > 0 => {
                self.hands[side.index()][i] -= 1;
                true
            }
            _ => false,
        }
    }

    /// Hands the move to the other side and counts the ply.
    pub fn pass_turn(&mut self) {
        self.turn = self.turn.opponent();
        self.ply += 1;
    }

    /// Square of `side`'s king.
    pub fn king_square(&self, side: Side) -> Option<Square> {
        Square::all().find(|sq| self.get(*sq) == Some(Piece::new(PieceKind::King, side)))
    }

    /// Iterates the occupied squares of `side`.
    pub fn pieces(&self, side: Side) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |sq| match self.get(sq) {
            Some(piece) if piece.side == side => Some((sq, piece)),
            _ => None,
        })
    }

    /// SFEN without the move number; equal keys mean the same game position.
    pub fn repetition_key(&self) -> String {
        let mut key = String::new();
        self.write_placement(&mut key);
        key.push(' ');
        key.push(if self.turn == Side::Black { 'b' } else { 'w' });
        key.push(' ');
        self.write_hands(&mut key);
        key
    }

    /// Encodes the position as SFEN.
    pub fn to_sfen(&self) -> String {
        format!("{} {}", self.repetition_key(), self.ply + 1)
    }

    /// Decodes an SFEN string. The move number is optional and defaults to 1.
    pub fn from_sfen(sfen: &str) -> Result<Self, ParseError> {
        let err = |why: &str| ParseError::Sfen(format!("{why}: {sfen}"));
        let mut fields = sfen.split_whitespace();
        let placement = fields.next().ok_or_else(|| err("missing board"))?;
        let turn = match fields.next() {
            Some("b") => Side::Black,
            Some("w") => Side::White,
            _ => return Err(err("bad side to move")),
        };
        let hands = fields.next().ok_or_else(|| err("missing hands"))?;
        let move_number = match fields.next() {
            Some(n) => n.parse::<u32>().map_err(|_| err("bad move number"))?,
            None => 1,
        };
        if move_number == 0 || fields.next().is_some() {
            return Err(err("bad trailer"));
        }

        let mut position = Self::empty(turn);
        position.ply = move_number - 1;

        let rows: Vec<&str> = placement.split('/').collect();
        if rows.len() != 9 {
            return Err(err("expected 9 ranks"));
        }
        for (r, row) in rows.iter().enumerate() {
            let rank = r as u8 + 1;
            let mut file: u8 = 9;
            let mut promoted = false;
            for c in row.chars() {
                if let Some(n) = c.to_digit(10) {
                    if promoted || n == 0 {
                        return Err(err("bad empty run"));
                    }
                    file = file
                        .checked_sub(n as u8)
                        .ok_or_else(|| err("rank overflows"))?;
                    continue;
                }
                if c == '+' {
                    if promoted {
                        return Err(err("double promotion mark"));
                    }
                    promoted = true;
                    continue;
                }
                let kind = PieceKind::from_letter(c).ok_or_else(|| err("unknown piece"))?;
                if promoted && !kind.can_promote() {
                    return Err(err("piece cannot promote"));
                }
                let kind = if promoted { kind.promoted() } else { kind };
                promoted = false;
                let side = if c.is_ascii_uppercase() { Side::Black } else { Side::White };
                let square = Square::new(file, rank).ok_or_else(|| err("rank overflows"))?;
                position.set(square, Some(Piece::new(kind, side)));
                file -= 1;
            }
            if file != 0 || promoted {
                return Err(err("rank does not cover 9 files"));
            }
        }

        if hands != "-" {
            let mut count: u32 = 0;
            for c in hands.chars() {
                if let Some(d) = c.to_digit(10) {
                    count = count
                        .checked_mul(10)
                        .and_then(|count| count.checked_add(d))
                        .filter(|count| *count <= MAX_HAND_COUNT)
                        .ok_or_else(|| err("hand count too large"))?;
                    continue;
                }
                let kind = PieceKind::from_letter(c)
                    .filter(|k| k.hand_index().is_some())
                    .ok_or_else(|| err("bad hand piece"))?;
                let side = if c.is_ascii_uppercase() { Side::Black } else { Side::White };
                let n = if count == 0 { 1 } else { count };
                for _ in 0..n {
                    position.add_to_hand(side, kind);
                }
                if u32::from(position.hand(side, kind)) > MAX_HAND_COUNT {
                    return Err(err("hand count too large"));
                }
                count = 0;
            }
            if count != 0 {
                return Err(err("dangling hand count"));
            }
        }

        Ok(position)
    }

    fn write_placement(&self, out: &mut String) {
        for rank in 1..=9u8 {
            let mut empty = 0;
            for file in (1..=9u8).rev() {
                let piece = Square::new(file, rank).and_then(|sq| self.get(sq));
                match piece {
                    None => empty += 1,
                    Some(piece) => {
                        if empty > 0 {
                            out.push_str(&empty.to_string());
                            empty = 0;
                        }
                        if piece.kind.is_promoted() {
                            out.push('+');
                        }
                        let letter = piece.kind.letter();
                        out.push(match piece.side {
                            Side::Black => letter,
                            Side::White => letter.to_ascii_lowercase(),
                        });
                    }
                }
            }
            if empty > 0 {
                out.push_str(&empty.to_string());
            }
            if rank < 9 {
                out.push('/');
            }
        }
    }

    fn write_hands(&self, out: &mut String) {
        let start = out.len();
        for side in [Side::Black, Side::White] {
            for kind in HAND_KINDS {
                let n = self.hand(side, kind);
                if n == 0 {
                    continue;
                }
                if n > 1 {
                    out.push_str(&n.to_string());
                }
                out.push(match side {
                    Side::Black => kind.letter(),
                    Side::White => kind.letter().to_ascii_lowercase(),
                });
            }
        }
        if out.len() == start {
            out.push('-');
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sfen())
    }
}
