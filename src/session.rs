//! Game session: the public contract consumed by the view layer.
//!
//! A [`Session`] owns one [`TurnController`] (and through it the history
//! timeline), the player strengths and the timers. Every mutator ends by
//! explicitly re-evaluating whether an automated turn should be scheduled.
//! Scheduled work only holds a weak handle to the session and a
//! cancellation token, so nothing outlives a dropped session.

use crate::config::{PlayerMode, PlayerModes, SessionConfig, StrengthLevel};
use crate::controller::{
    AutomatedRequest, AutomatedSettlement, AutomatedTicket, MoveOutcome, RejectReason,
    TurnController,
};
use crate::games::reversi::{
    AiMove, Board, Cell, Color, EngineError, GameResult, MoveMask, Position, RulesEngine,
    StoneCounts,
};
use derive_more::{Display, Error};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Notifications sent from a session to its view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A move was executed.
    MoveMade {
        /// Color that moved.
        color: Color,
        /// Cell played.
        position: Position,
        /// Turn counter after the move (and any pass).
        turn: u32,
    },
    /// A color had no legal reply and its turn was skipped.
    PassAnnounced(Color),
    /// The pass notice display window ended.
    PassNoticeCleared,
    /// An automated player started thinking.
    AutomatedThinking(Color),
    /// An automated answer was thrown away.
    AutomatedDiscarded,
    /// Undo or redo moved the history cursor.
    Rewound {
        /// Turn counter at the new cursor.
        turn: u32,
    },
    /// The game returned to its starting position.
    Reset,
    /// Player modes changed.
    ModesChanged(PlayerModes),
    /// The game finished.
    GameOver(GameResult),
}

/// Session construction error.
#[derive(Debug, Clone, Display, Error)]
#[display("Session error: {} at {}:{}", message, file, line)]
pub struct SessionError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SessionError {
    /// Creates a new session error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Every view fact at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Board in compact 64-character form.
    pub board: String,
    /// Stone counts.
    pub stones: StoneCounts,
    /// Turn counter.
    pub turn: u32,
    /// Color to move.
    pub current_color: Color,
    /// Mode of the color to move.
    pub current_mode: PlayerMode,
    /// Legal cells for the color to move, in algebraic notation.
    pub legal_moves: Vec<String>,
    /// Derived game result.
    pub result: GameResult,
    /// Undo available.
    pub can_undo: bool,
    /// Redo available.
    pub can_redo: bool,
    /// Color whose skipped turn is being announced.
    pub pending_pass_notice: Option<Color>,
    /// An automated move is being computed.
    pub automated_in_flight: bool,
    /// Number of history entries.
    pub history_len: usize,
    /// History cursor.
    pub history_cursor: usize,
}

struct SessionState<E> {
    controller: TurnController<E>,
    black_strength: StrengthLevel,
    white_strength: StrengthLevel,
    setup_gate: bool,
    automated_task: Option<CancellationToken>,
    pass_notice_task: Option<CancellationToken>,
}

impl<E> SessionState<E> {
    fn strength(&self, color: Color) -> StrengthLevel {
        match color {
            Color::Black => self.black_strength,
            Color::White => self.white_strength,
        }
    }

    fn cancel_automated_task(&mut self) {
        if let Some(token) = self.automated_task.take() {
            token.cancel();
        }
    }

    fn cancel_pass_notice_task(&mut self) {
        if let Some(token) = self.pass_notice_task.take() {
            token.cancel();
        }
    }
}

struct Shared<E> {
    engine: Arc<E>,
    config: SessionConfig,
    runtime: Handle,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown: CancellationToken,
    state: Mutex<SessionState<E>>,
}

/// One game session.
pub struct Session<E: RulesEngine> {
    shared: Arc<Shared<E>>,
}

impl<E: RulesEngine> Session<E> {
    /// Creates a session around an injected engine, starting from the
    /// standard opening position.
    ///
    /// Must be called from within a tokio runtime; automated turns and pass
    /// notices are timed on it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when no tokio runtime is running.
    pub fn new(
        engine: Arc<E>,
        config: SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        Self::with_initial_board(engine, config, Board::initial(), events)
    }

    /// Creates a session whose history starts at `initial`, turn 0, Black to
    /// move. Reset returns to this board.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when no tokio runtime is running, when the
    /// engine cannot judge `initial`, or when Black has no legal move on an
    /// unfinished `initial` board. Such a board has no turn 0 to play.
    #[instrument(skip_all, fields(initial = %initial.to_compact()))]
    pub fn with_initial_board(
        engine: Arc<E>,
        config: SessionConfig,
        initial: Board,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let runtime = Handle::try_current()
            .map_err(|e| SessionError::new(format!("No tokio runtime available: {}", e)))?;
        check_opening(engine.as_ref(), &initial)?;

        info!(
            black = %config.black().mode,
            white = %config.white().mode,
            "Creating new game session"
        );

        let state = SessionState {
            controller: TurnController::new(Arc::clone(&engine), initial, config.player_modes()),
            black_strength: config.black().strength,
            white_strength: config.white().strength,
            setup_gate: false,
            automated_task: None,
            pass_notice_task: None,
        };

        let session = Self {
            shared: Arc::new(Shared {
                engine,
                config,
                runtime,
                events,
                shutdown: CancellationToken::new(),
                state: Mutex::new(state),
            }),
        };
        session.shared.evaluate_automated_turn();
        Ok(session)
    }

    // ─────────────────────────────────────────────────────────────
    //  View queries
    // ─────────────────────────────────────────────────────────────

    /// Current board.
    pub fn board(&self) -> Board {
        self.shared.lock().controller.board()
    }

    /// Contents of one cell, or `None` off the board.
    pub fn cell(&self, row: u8, col: u8) -> Option<Cell> {
        Position::new(row, col).map(|pos| self.board().cell(pos))
    }

    /// Stone counts per color.
    pub fn stone_counts(&self) -> StoneCounts {
        self.board().stone_counts()
    }

    /// Turn counter.
    pub fn turn(&self) -> u32 {
        self.shared.lock().controller.turn()
    }

    /// Color to move.
    pub fn current_color(&self) -> Color {
        self.shared.lock().controller.current_color()
    }

    /// Mode of the color to move.
    pub fn current_mode(&self) -> PlayerMode {
        self.shared.lock().controller.current_mode()
    }

    /// Legal cells for the color to move.
    pub fn valid_moves(&self) -> MoveMask {
        self.shared.lock().controller.valid_moves()
    }

    /// True if undo is available.
    pub fn can_undo(&self) -> bool {
        self.shared.lock().controller.can_undo()
    }

    /// True if redo is available.
    pub fn can_redo(&self) -> bool {
        self.shared.lock().controller.can_redo()
    }

    /// Derived game result.
    pub fn result(&self) -> GameResult {
        self.shared.lock().controller.result()
    }

    /// Color whose skipped turn is being announced.
    pub fn pending_pass_notice(&self) -> Option<Color> {
        self.shared.lock().controller.pending_pass_notice()
    }

    /// True while an automated move is scheduled or computing.
    pub fn is_automated_in_flight(&self) -> bool {
        self.shared.lock().controller.is_automated_in_flight()
    }

    /// Current mode assignment.
    pub fn player_modes(&self) -> PlayerModes {
        self.shared.lock().controller.player_modes()
    }

    /// Strength of one color.
    pub fn strength_level(&self, color: Color) -> StrengthLevel {
        self.shared.lock().strength(color)
    }

    /// Number of history entries.
    pub fn history_len(&self) -> usize {
        self.shared.lock().controller.timeline().len()
    }

    /// History cursor.
    pub fn history_cursor(&self) -> usize {
        self.shared.lock().controller.timeline().cursor()
    }

    /// Every view fact, read under one lock.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.lock();
        let controller = &state.controller;
        let board = controller.board();
        SessionSnapshot {
            board: board.to_compact(),
            stones: board.stone_counts(),
            turn: controller.turn(),
            current_color: controller.current_color(),
            current_mode: controller.current_mode(),
            legal_moves: controller.valid_moves().iter().map(|p| p.to_string()).collect(),
            result: controller.result(),
            can_undo: controller.can_undo(),
            can_redo: controller.can_redo(),
            pending_pass_notice: controller.pending_pass_notice(),
            automated_in_flight: controller.is_automated_in_flight(),
            history_len: controller.timeline().len(),
            history_cursor: controller.timeline().cursor(),
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Mutators
    // ─────────────────────────────────────────────────────────────

    /// Human cell input at zero-based `row` and `col`.
    pub fn attempt_move(&self, row: u8, col: u8) -> MoveOutcome {
        match Position::new(row, col) {
            Some(pos) => self.attempt_move_at(pos),
            None => {
                debug!(row, col, "Move rejected: off the board");
                MoveOutcome::rejected(RejectReason::IllegalCell)
            }
        }
    }

    /// Human cell input at `pos`.
    #[instrument(skip(self), fields(position = %pos))]
    pub fn attempt_move_at(&self, pos: Position) -> MoveOutcome {
        let outcome = {
            let mut state = self.shared.lock();
            let color = state.controller.current_color();
            let outcome = state.controller.attempt_move(pos);
            if outcome.accepted {
                self.shared.after_move(&mut state, color, pos, outcome);
            }
            outcome
        };
        self.shared.evaluate_automated_turn();
        outcome
    }

    /// Steps back one history entry.
    pub fn undo(&self) -> bool {
        self.rewind(|controller| controller.undo())
    }

    /// Steps forward one history entry.
    pub fn redo(&self) -> bool {
        self.rewind(|controller| controller.redo())
    }

    fn rewind(&self, step: impl FnOnce(&mut TurnController<E>) -> bool) -> bool {
        let moved = {
            let mut state = self.shared.lock();
            let moved = step(&mut state.controller);
            if moved {
                state.cancel_pass_notice_task();
                let turn = state.controller.turn();
                self.shared.emit(SessionEvent::Rewound { turn });
            }
            moved
        };
        self.shared.evaluate_automated_turn();
        moved
    }

    /// Returns to the starting position. Modes and strengths are kept.
    #[instrument(skip(self))]
    pub fn reset(&self) {
        {
            let mut state = self.shared.lock();
            state.cancel_automated_task();
            state.cancel_pass_notice_task();
            state.controller.reset();
            self.shared.emit(SessionEvent::Reset);
        }
        self.shared.evaluate_automated_turn();
    }

    /// Assigns a mode to each color.
    #[instrument(skip(self))]
    pub fn set_player_mode(&self, black: PlayerMode, white: PlayerMode) {
        {
            let mut state = self.shared.lock();
            let modes = PlayerModes::new(black, white);
            state.cancel_automated_task();
            state.controller.set_player_modes(modes);
            self.shared.emit(SessionEvent::ModesChanged(modes));
        }
        self.shared.evaluate_automated_turn();
    }

    /// Sets the strength used while `color` is automated.
    #[instrument(skip(self))]
    pub fn set_strength_level(&self, color: Color, level: StrengthLevel) {
        let mut state = self.shared.lock();
        match color {
            Color::Black => state.black_strength = level,
            Color::White => state.white_strength = level,
        }
        info!(%color, %level, "Strength changed");
    }

    /// Opens or closes the external setup/menu gate. While open, automated
    /// turns are not dispatched and an outstanding request is dropped.
    #[instrument(skip(self))]
    pub fn set_setup_gate(&self, open: bool) {
        {
            let mut state = self.shared.lock();
            state.setup_gate = open;
            if open && state.controller.is_automated_in_flight() {
                state.cancel_automated_task();
                state.controller.cancel_automated();
                self.shared.emit(SessionEvent::AutomatedDiscarded);
            }
        }
        self.shared.evaluate_automated_turn();
    }

    /// Acknowledges the pass notice before its display window ends.
    pub fn clear_pass_notice(&self) -> bool {
        let cleared = {
            let mut state = self.shared.lock();
            state.cancel_pass_notice_task();
            let cleared = state.controller.clear_pass_notice();
            if cleared {
                self.shared.emit(SessionEvent::PassNoticeCleared);
            }
            cleared
        };
        self.shared.evaluate_automated_turn();
        cleared
    }

    /// Re-checks automated-turn eligibility and schedules one if due.
    /// Returns true if a request was scheduled.
    pub fn evaluate_automated_turn(&self) -> bool {
        self.shared.evaluate_automated_turn()
    }

    /// Cancels every pending timer and request. Later answers are ignored.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            info!("Shutting down session");
            self.shared.shutdown.cancel();
        }
    }
}

/// Rejects starting boards where the first mover is already stuck.
fn check_opening<E: RulesEngine>(engine: &E, initial: &Board) -> Result<(), SessionError> {
    let judge = |e: EngineError| SessionError::new(format!("Engine rejected start board: {}", e));
    let result = engine.result(initial).map_err(judge)?;
    if !result.is_terminal() && engine.is_pass(initial, Color::Black).map_err(judge)? {
        warn!(board = %initial.to_compact(), "Black has no opening move");
        return Err(SessionError::new("Black has no legal move on an unfinished start board"));
    }
    Ok(())
}

impl<E: RulesEngine> Drop for Session<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<E: RulesEngine> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, SessionState<E>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Announces an accepted move and starts the pass-notice window.
    fn after_move(
        self: &Arc<Self>,
        state: &mut SessionState<E>,
        color: Color,
        position: Position,
        outcome: MoveOutcome,
    ) {
        let turn = state.controller.turn();
        self.emit(SessionEvent::MoveMade {
            color,
            position,
            turn,
        });
        if let Some(skipped) = outcome.pass_notice {
            info!(%skipped, "Pass announced");
            self.emit(SessionEvent::PassAnnounced(skipped));
            self.schedule_pass_notice_clear(state);
        }
        let result = state.controller.result();
        if result.is_terminal() {
            info!(%result, "Game over");
            self.emit(SessionEvent::GameOver(result));
        }
    }

    fn schedule_pass_notice_clear(self: &Arc<Self>, state: &mut SessionState<E>) {
        let token = self.shutdown.child_token();
        state.cancel_pass_notice_task();
        state.pass_notice_task = Some(token.clone());

        let weak = Arc::downgrade(self);
        let window = self.config.pass_notice_window();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }
            if let Some(shared) = weak.upgrade() {
                shared.expire_pass_notice(&token);
            }
        });
    }

    /// Rewind, reset and early acknowledgement cancel `token` under the lock,
    /// so a live token means the notice still belongs to this window.
    fn expire_pass_notice(self: &Arc<Self>, token: &CancellationToken) {
        {
            let mut state = self.lock();
            if token.is_cancelled() {
                return;
            }
            state.pass_notice_task = None;
            if state.controller.clear_pass_notice() {
                debug!("Pass notice window elapsed");
                self.emit(SessionEvent::PassNoticeCleared);
            }
        }
        self.evaluate_automated_turn();
    }

    fn evaluate_automated_turn(self: &Arc<Self>) -> bool {
        let mut state = self.lock();
        if self.shutdown.is_cancelled() {
            return false;
        }
        let gate = state.setup_gate;
        let Some(request) = state.controller.evaluate_automated_turn(gate) else {
            return false;
        };

        let token = self.shutdown.child_token();
        state.cancel_automated_task();
        state.automated_task = Some(token.clone());
        let strength = state.strength(request.color);
        self.emit(SessionEvent::AutomatedThinking(request.color));

        let job = AutomatedJob {
            shared: Arc::downgrade(self),
            request,
            strength,
            delay: self.config.automated_delay(),
            budget: self.config.think_time(),
            token,
        };
        self.runtime.spawn(job.run());
        true
    }

    /// Settles an automated answer. A pass, failure or rejected answer
    /// leaves the turn with the automated player; it is requested again on
    /// the next state change rather than retried in a loop.
    fn settle(self: &Arc<Self>, ticket: AutomatedTicket, reply: Result<AiMove, EngineError>) {
        let played = match &reply {
            Ok(AiMove::Play(pos)) => Some(*pos),
            _ => None,
        };
        let reevaluate = {
            let mut state = self.lock();
            if self.shutdown.is_cancelled() {
                return;
            }
            let color = state.controller.current_color();
            let settlement = state.controller.settle_automated(ticket, reply);
            state.automated_task = None;
            match (settlement, played) {
                (AutomatedSettlement::Applied(outcome), Some(pos)) if outcome.accepted => {
                    self.after_move(&mut state, color, pos, outcome);
                    true
                }
                (AutomatedSettlement::Applied(outcome), _) => {
                    warn!(rejection = ?outcome.rejection, "Automated move rejected");
                    self.emit(SessionEvent::AutomatedDiscarded);
                    false
                }
                (AutomatedSettlement::Discarded, _) => {
                    self.emit(SessionEvent::AutomatedDiscarded);
                    true
                }
                (AutomatedSettlement::Passed, _) | (AutomatedSettlement::Failed, _) => {
                    self.emit(SessionEvent::AutomatedDiscarded);
                    false
                }
            }
        };
        if reevaluate {
            self.evaluate_automated_turn();
        }
    }

    /// Clears the in-flight flag for a request that ended without settling.
    fn release(&self, ticket: AutomatedTicket) {
        let mut state = self.lock();
        if state.controller.release_automated(ticket) {
            debug!("Automated request released without an answer");
            state.automated_task = None;
            self.emit(SessionEvent::AutomatedDiscarded);
        }
    }
}

/// A scheduled automated move: presentational delay, then a bounded search.
struct AutomatedJob<E> {
    shared: Weak<Shared<E>>,
    request: AutomatedRequest,
    strength: StrengthLevel,
    delay: Duration,
    budget: Duration,
    token: CancellationToken,
}

impl<E: RulesEngine> AutomatedJob<E> {
    async fn run(self) {
        let AutomatedRequest {
            ticket,
            board,
            color,
        } = self.request;
        let _release = InFlightRelease {
            shared: self.shared.clone(),
            ticket,
        };

        tokio::select! {
            _ = self.token.cancelled() => {
                debug!(%color, "Automated turn cancelled during delay");
                return;
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        let Some(engine) = self.shared.upgrade().map(|shared| Arc::clone(&shared.engine)) else {
            return;
        };
        let (budget, strength) = (self.budget, self.strength);
        let search = tokio::task::spawn_blocking(move || {
            engine.choose_move(&board, color, budget, strength)
        });

        let reply = tokio::select! {
            _ = self.token.cancelled() => {
                debug!(%color, "Automated turn cancelled during search");
                return;
            }
            joined = search => joined.unwrap_or_else(|e| {
                Err(EngineError::new(format!("Search task failed: {}", e)))
            }),
        };

        if self.token.is_cancelled() {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.settle(ticket, reply);
        }
    }
}

/// Releases the in-flight flag on every exit path of an [`AutomatedJob`].
struct InFlightRelease<E: RulesEngine> {
    shared: Weak<Shared<E>>,
    ticket: AutomatedTicket,
}

impl<E: RulesEngine> Drop for InFlightRelease<E> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release(self.ticket);
        }
    }
}
