//! Immutable bitboard snapshot of stone placement.

use super::position::{CELL_COUNT, Position};
use super::types::{Cell, Color, StoneCounts};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Stone placement as two occupancy masks.
///
/// Boards are values: rules operations return a new `Board` and never
/// modify one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    black: u64,
    white: u64,
}

impl Board {
    /// Standard opening position: White on d4 and e5, Black on e4 and d5.
    pub fn initial() -> Self {
        Self {
            black: (1 << 28) | (1 << 35),
            white: (1 << 27) | (1 << 36),
        }
    }

    /// Builds a board from raw masks. Overlapping bits are given to black.
    pub fn from_masks(black: u64, white: u64) -> Self {
        Self {
            black,
            white: white & !black,
        }
    }

    /// Occupancy mask of one color.
    pub fn stones(&self, color: Color) -> u64 {
        match color {
            Color::Black => self.black,
            Color::White => self.white,
        }
    }

    /// Mask of occupied cells.
    pub fn occupied(&self) -> u64 {
        self.black | self.white
    }

    /// Returns true when no empty cell is left.
    pub fn is_full(&self) -> bool {
        self.occupied() == u64::MAX
    }

    /// Contents of one cell.
    pub fn cell(&self, pos: Position) -> Cell {
        if self.black & pos.bit() != 0 {
            Cell::Stone(Color::Black)
        } else if self.white & pos.bit() != 0 {
            Cell::Stone(Color::White)
        } else {
            Cell::Empty
        }
    }

    /// Stone counts per color.
    pub fn stone_counts(&self) -> StoneCounts {
        StoneCounts {
            black: self.black.count_ones(),
            white: self.white.count_ones(),
        }
    }

    /// 64-character row-major form using `B`, `W` and `.`.
    pub fn to_compact(&self) -> String {
        Position::all()
            .map(|pos| match self.cell(pos) {
                Cell::Stone(Color::Black) => 'B',
                Cell::Stone(Color::White) => 'W',
                Cell::Empty => '.',
            })
            .collect()
    }

    /// Returns a copy with `pos` set to `color` and `flips` toggled.
    pub(crate) fn with_move(&self, pos: Position, color: Color, flips: u64) -> Self {
        let (mut mine, mut theirs) = match color {
            Color::Black => (self.black, self.white),
            Color::White => (self.white, self.black),
        };
        mine |= pos.bit() | flips;
        theirs &= !flips;
        match color {
            Color::Black => Self {
                black: mine,
                white: theirs,
            },
            Color::White => Self {
                black: theirs,
                white: mine,
            },
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  a b c d e f g h")?;
        for row in 0..8u8 {
            write!(f, "{}", row + 1)?;
            for col in 0..8u8 {
                let symbol = match Position::new(row, col).map(|pos| self.cell(pos)) {
                    Some(Cell::Stone(Color::Black)) => 'X',
                    Some(Cell::Stone(Color::White)) => 'O',
                    _ => '.',
                };
                write!(f, " {}", symbol)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Error parsing a board from its compact form.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Invalid board: {}", reason)]
pub struct ParseBoardError {
    /// Why the input was rejected.
    pub reason: String,
}

impl FromStr for Board {
    type Err = ParseBoardError;

    /// Parses 64 cells of `B`, `W` or `.`; whitespace is ignored so boards
    /// can be written one row per line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cells: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
        if cells.len() != CELL_COUNT as usize {
            return Err(ParseBoardError {
                reason: format!("expected 64 cells, found {}", cells.len()),
            });
        }

        let mut black = 0u64;
        let mut white = 0u64;
        for (i, c) in cells.into_iter().enumerate() {
            match c {
                'B' | 'b' | 'X' | 'x' => black |= 1 << i,
                'W' | 'w' | 'O' | 'o' => white |= 1 << i,
                '.' | '-' => {}
                other => {
                    return Err(ParseBoardError {
                        reason: format!("unexpected character {:?} at cell {}", other, i),
                    });
                }
            }
        }
        Ok(Self { black, white })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_layout() {
        let board = Board::initial();
        assert_eq!(
            board.to_compact(),
            "...........................WB......BW..........................."
        );
        assert_eq!(board.stone_counts(), StoneCounts { black: 2, white: 2 });
    }

    #[test]
    fn test_parse_compact() {
        let board: Board = Board::initial().to_compact().parse().unwrap();
        assert_eq!(board, Board::initial());
        assert!("BW".parse::<Board>().is_err());
    }

    #[test]
    fn test_with_move_flips() {
        let board = Board::initial();
        let d3 = Position::new(2, 3).unwrap();
        let d4 = Position::new(3, 3).unwrap();
        let next = board.with_move(d3, Color::Black, d4.bit());
        assert_eq!(next.cell(d4), Cell::Stone(Color::Black));
        assert_eq!(next.stone_counts(), StoneCounts { black: 4, white: 1 });
        // input board untouched
        assert_eq!(board.cell(d4), Cell::Stone(Color::White));
    }
}
