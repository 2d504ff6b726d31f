//! Core domain types for reversi.

use serde::{Deserialize, Serialize};

/// One of the two competing sides.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// Black (moves on even turns).
    Black,
    /// White (moves on odd turns).
    White,
}

impl Color {
    /// Returns the opposing color.
    pub fn opponent(self) -> Self {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Maps turn parity to the color to move: even is Black, odd is White.
    pub fn from_turn(turn: u32) -> Self {
        if turn % 2 == 0 {
            Color::Black
        } else {
            Color::White
        }
    }
}

/// Contents of a single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// No stone.
    Empty,
    /// A stone of the given color.
    Stone(Color),
}

/// Outcome of a game, always derived from the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum GameResult {
    /// At least one side can still move.
    Ongoing,
    /// Black has more stones and nobody can move.
    BlackWin,
    /// White has more stones and nobody can move.
    WhiteWin,
    /// Equal stone counts and nobody can move.
    Draw,
}

impl GameResult {
    /// Returns true once the game is finished.
    pub fn is_terminal(self) -> bool {
        self != GameResult::Ongoing
    }

    /// Returns the winning color, if any.
    pub fn winner(self) -> Option<Color> {
        match self {
            GameResult::BlackWin => Some(Color::Black),
            GameResult::WhiteWin => Some(Color::White),
            GameResult::Ongoing | GameResult::Draw => None,
        }
    }
}

/// Stone counts per color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoneCounts {
    /// Black stones on the board.
    pub black: u32,
    /// White stones on the board.
    pub white: u32,
}

impl StoneCounts {
    /// Returns the count for one color.
    pub fn of(&self, color: Color) -> u32 {
        match color {
            Color::Black => self.black,
            Color::White => self.white,
        }
    }
}
