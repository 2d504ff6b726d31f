//! Board coordinates, legality masks and engine move answers.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::instrument;

/// Number of cells on a side.
pub const BOARD_SIZE: u8 = 8;

/// Number of cells on the board.
pub const CELL_COUNT: u8 = BOARD_SIZE * BOARD_SIZE;

/// A cell on the 8x8 board, stored as `row * 8 + col`.
///
/// Displays and parses in algebraic notation: column letter `a`-`h`
/// followed by row digit `1`-`8`, so `d3` is row 2, column 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Position(u8);

impl Position {
    /// Creates a position from zero-based row and column.
    pub fn new(row: u8, col: u8) -> Option<Self> {
        if row < BOARD_SIZE && col < BOARD_SIZE {
            Some(Self(row * BOARD_SIZE + col))
        } else {
            None
        }
    }

    /// Creates a position from a cell index (0-63).
    pub fn from_index(index: usize) -> Option<Self> {
        if index < CELL_COUNT as usize {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Cell index (0-63).
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Zero-based row.
    pub fn row(self) -> u8 {
        self.0 / BOARD_SIZE
    }

    /// Zero-based column.
    pub fn col(self) -> u8 {
        self.0 % BOARD_SIZE
    }

    /// Single-bit mask for this cell.
    pub fn bit(self) -> u64 {
        1u64 << self.0
    }

    /// Iterates every cell in row-major order.
    pub fn all() -> impl Iterator<Item = Position> {
        (0..CELL_COUNT).map(Position)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", (b'a' + self.col()) as char, self.row() + 1)
    }
}

/// Error parsing a position from text.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Invalid position: {:?}", input)]
pub struct ParsePositionError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for Position {
    type Err = ParsePositionError;

    #[instrument]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePositionError {
            input: s.to_string(),
        };
        let lower = s.trim().to_ascii_lowercase();
        let bytes = lower.as_bytes();
        if bytes.len() != 2 {
            return Err(err());
        }
        let col = bytes[0].wrapping_sub(b'a');
        let row = bytes[1].wrapping_sub(b'1');
        Position::new(row, col).ok_or_else(err)
    }
}

impl TryFrom<u8> for Position {
    type Error = ParsePositionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Position::from_index(value as usize).ok_or_else(|| ParsePositionError {
            input: value.to_string(),
        })
    }
}

impl From<Position> for u8 {
    fn from(pos: Position) -> Self {
        pos.0
    }
}

/// Per-cell legality bitset (bit `i` set means cell `i` is a legal move).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MoveMask(u64);

impl MoveMask {
    /// An empty mask.
    pub const EMPTY: MoveMask = MoveMask(0);

    /// Wraps raw bits.
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if the cell is legal.
    pub fn contains(self, pos: Position) -> bool {
        self.0 & pos.bit() != 0
    }

    /// Number of legal cells.
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Returns true when no cell is legal.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates legal cells in index order.
    pub fn iter(self) -> impl Iterator<Item = Position> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as u8;
            bits &= bits - 1;
            Some(Position(index))
        })
    }
}

/// A move chosen by an automated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiMove {
    /// Place a stone here.
    Play(Position),
    /// No legal move exists.
    Pass,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algebraic_round_trip() {
        let pos = Position::new(2, 3).unwrap();
        assert_eq!(pos.to_string(), "d3");
        assert_eq!("D3".parse::<Position>().unwrap(), pos);
        assert_eq!(pos.index(), 19);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Position::new(8, 0).is_none());
        assert!(Position::from_index(64).is_none());
        assert!("i1".parse::<Position>().is_err());
        assert!("a9".parse::<Position>().is_err());
        assert!("a".parse::<Position>().is_err());
    }

    #[test]
    fn test_mask_iteration() {
        let mask = MoveMask::from_bits((1 << 19) | (1 << 26) | (1 << 63));
        let cells: Vec<usize> = mask.iter().map(Position::index).collect();
        assert_eq!(cells, vec![19, 26, 63]);
        assert_eq!(mask.count(), 3);
        assert!(mask.contains(Position::from_index(26).unwrap()));
        assert!(!mask.contains(Position::from_index(27).unwrap()));
    }
}
