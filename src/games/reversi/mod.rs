//! Reversi: board representation, rules and move search.

mod board;
mod engine;
mod position;
mod rules;
mod types;

pub use board::{Board, ParseBoardError};
pub use engine::BitboardEngine;
pub use position::{AiMove, BOARD_SIZE, CELL_COUNT, MoveMask, ParsePositionError, Position};
pub use rules::{EngineError, RulesEngine};
pub use types::{Cell, Color, GameResult, StoneCounts};
