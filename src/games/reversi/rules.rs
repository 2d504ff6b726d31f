//! The rules-engine boundary consumed by the session layer.

use super::board::Board;
use super::position::{AiMove, MoveMask, Position};
use super::types::{Color, GameResult};
use crate::config::StrengthLevel;
use derive_more::{Display, Error};
use std::time::Duration;
use tracing::instrument;

/// Rules engine error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Engine error: {} at {}:{}", message, file, line)]
pub struct EngineError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl EngineError {
    /// Creates a new engine error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Board rules and move search.
///
/// All operations except [`RulesEngine::choose_move`] must be deterministic
/// for identical inputs. Implementations are shared across threads: the
/// session runs `choose_move` on the blocking pool.
pub trait RulesEngine: Send + Sync + 'static {
    /// Legal cells for `color`.
    fn valid_moves(&self, board: &Board, color: Color) -> Result<MoveMask, EngineError>;

    /// Places a stone for `color` at `pos` and flips every bounded opponent run.
    fn apply_move(&self, board: &Board, pos: Position, color: Color)
    -> Result<Board, EngineError>;

    /// Returns true iff `color` has no legal cell.
    fn is_pass(&self, board: &Board, color: Color) -> Result<bool, EngineError> {
        Ok(self.valid_moves(board, color)?.is_empty())
    }

    /// Ongoing unless neither color can move, then decided by stone count.
    fn result(&self, board: &Board) -> Result<GameResult, EngineError>;

    /// Picks a move for `color` within `budget` at the given strength.
    ///
    /// Must return a legal move or [`AiMove::Pass`].
    fn choose_move(
        &self,
        board: &Board,
        color: Color,
        budget: Duration,
        strength: StrengthLevel,
    ) -> Result<AiMove, EngineError>;
}
