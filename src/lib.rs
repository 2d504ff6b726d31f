//! Strictly Reversi library - session layer for a two-player reversi client
//!
//! This library manages one game of reversi on behalf of a view: it validates
//! moves, resolves forced passes, keeps an undo/redo timeline and schedules
//! engine-controlled turns.
//!
//! # Architecture
//!
//! - **History**: Branchable timeline of board positions with a cursor
//! - **Controller**: Gatekeeper for every state transition
//! - **Session**: Composition root owning timers and the event channel
//! - **Games**: Bitboard reversi rules and search behind a [`RulesEngine`] trait
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_reversi::{BitboardEngine, PlayerMode, Session, SessionConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let session = Session::new(Arc::new(BitboardEngine::new()), SessionConfig::default(), tx)?;
//!
//! session.set_player_mode(PlayerMode::Human, PlayerMode::Automated);
//! let outcome = session.attempt_move(2, 3);
//! assert!(outcome.accepted);
//!
//! // White's reply arrives as an event
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod controller;
mod games;
mod history;
mod session;

// Crate-level exports - Configuration
pub use config::{ConfigError, PlayerConfig, PlayerMode, PlayerModes, SessionConfig, StrengthLevel};

// Crate-level exports - Turn control
pub use controller::{
    AutomatedRequest, AutomatedSettlement, AutomatedTicket, MoveOutcome, RejectReason,
    TurnController,
};

// Crate-level exports - History
pub use history::{HistoryEntry, HistoryTimeline};

// Crate-level exports - Session
pub use session::{Session, SessionError, SessionEvent, SessionSnapshot};

// Crate-level exports - Game types (reversi)
pub use games::reversi::{
    AiMove, BOARD_SIZE, BitboardEngine, Board, CELL_COUNT, Cell, Color, EngineError, GameResult,
    MoveMask, ParseBoardError, ParsePositionError, Position, RulesEngine, StoneCounts,
};
