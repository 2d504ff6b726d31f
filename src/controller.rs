//! Turn control: move validation, pass cascades and automated-turn gating.
//!
//! [`TurnController`] is the only component that calls the rules engine's
//! mutators. It owns the history timeline and the transient flags that gate
//! input (pending pass notice, automated request in flight, post-rewind
//! guard). It is synchronous; the session layer owns all timers.

use crate::config::{PlayerMode, PlayerModes};
use crate::games::reversi::{
    AiMove, Board, Cell, Color, EngineError, GameResult, MoveMask, Position, RulesEngine,
};
use crate::history::{HistoryEntry, HistoryTimeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why a move attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum RejectReason {
    /// The game is finished.
    #[display("Game is already over")]
    GameOver,
    /// A pass notice is still displayed.
    #[display("A pass notice is pending")]
    PassNoticePending,
    /// An automated move is being computed.
    #[display("An automated move is in flight")]
    AutomatedTurnInFlight,
    /// The color to move is not human-controlled.
    #[display("It is not a human player's turn")]
    NotHumanTurn,
    /// The color to move is not engine-controlled.
    #[display("It is not an automated player's turn")]
    NotAutomatedTurn,
    /// The cell is occupied, off the board, or flips nothing.
    #[display("Illegal cell")]
    IllegalCell,
    /// The rules engine failed; nothing was recorded.
    #[display("Rules engine failure")]
    EngineFailure,
}

/// Result of a move attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// True if the move was executed and recorded.
    pub accepted: bool,
    /// The color whose turn was skipped as a consequence, if any.
    pub pass_notice: Option<Color>,
    /// Why the move was refused, when not accepted.
    pub rejection: Option<RejectReason>,
}

impl MoveOutcome {
    fn accepted(pass_notice: Option<Color>) -> Self {
        Self {
            accepted: true,
            pass_notice,
            rejection: None,
        }
    }

    pub(crate) fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            pass_notice: None,
            rejection: Some(reason),
        }
    }
}

/// Identifies one automated request and the state epoch it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AutomatedTicket {
    id: u64,
    epoch: u64,
}

/// An automated move request ready to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomatedRequest {
    /// Ticket to present when the answer comes back.
    pub ticket: AutomatedTicket,
    /// Board to search.
    pub board: Board,
    /// Color to move.
    pub color: Color,
}

/// What happened to a settled automated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomatedSettlement {
    /// The answer went through the regular move path.
    Applied(MoveOutcome),
    /// The engine answered pass; nothing changed.
    Passed,
    /// The engine failed; nothing changed.
    Failed,
    /// The state moved on since the request was issued.
    Discarded,
}

/// Which kind of player is submitting a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveOrigin {
    Human,
    Automated,
}

impl MoveOrigin {
    fn mode(self) -> PlayerMode {
        match self {
            MoveOrigin::Human => PlayerMode::Human,
            MoveOrigin::Automated => PlayerMode::Automated,
        }
    }
}

/// Gatekeeper for every game state transition.
#[derive(Debug)]
pub struct TurnController<E> {
    engine: Arc<E>,
    initial: Board,
    timeline: HistoryTimeline,
    modes: PlayerModes,
    pending_pass_notice: Option<Color>,
    automated_in_flight: Option<AutomatedTicket>,
    post_rewind_guard: bool,
    epoch: u64,
    next_ticket: u64,
}

impl<E: RulesEngine> TurnController<E> {
    /// Creates a controller whose timeline starts at `initial`, turn 0.
    #[instrument(skip(engine, initial))]
    pub fn new(engine: Arc<E>, initial: Board, modes: PlayerModes) -> Self {
        info!("Creating turn controller");
        Self {
            engine,
            initial,
            timeline: HistoryTimeline::new(initial),
            modes,
            pending_pass_notice: None,
            automated_in_flight: None,
            post_rewind_guard: false,
            epoch: 0,
            next_ticket: 0,
        }
    }

    /// The history timeline.
    pub fn timeline(&self) -> &HistoryTimeline {
        &self.timeline
    }

    /// Entry under the history cursor.
    pub fn current(&self) -> HistoryEntry {
        self.timeline.current()
    }

    /// Current board.
    pub fn board(&self) -> Board {
        self.current().board
    }

    /// Current turn counter.
    pub fn turn(&self) -> u32 {
        self.current().turn
    }

    /// Color to move, by turn parity.
    pub fn current_color(&self) -> Color {
        Color::from_turn(self.turn())
    }

    /// Mode of the color to move.
    pub fn current_mode(&self) -> PlayerMode {
        self.modes.of(self.current_color())
    }

    /// Mode assignment.
    pub fn player_modes(&self) -> PlayerModes {
        self.modes
    }

    /// Color whose skipped turn is being announced, if any.
    pub fn pending_pass_notice(&self) -> Option<Color> {
        self.pending_pass_notice
    }

    /// True while an automated request is outstanding.
    pub fn is_automated_in_flight(&self) -> bool {
        self.automated_in_flight.is_some()
    }

    /// True after undo/redo until the next move, reset or cell interaction.
    pub fn post_rewind_guard(&self) -> bool {
        self.post_rewind_guard
    }

    /// Counter bumped by every event that invalidates outstanding requests.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Legal cells for the color to move; empty if the engine fails.
    pub fn valid_moves(&self) -> MoveMask {
        self.engine
            .valid_moves(&self.board(), self.current_color())
            .unwrap_or_else(|e| {
                warn!(error = %e, "Legality query failed, reporting no legal moves");
                MoveMask::EMPTY
            })
    }

    /// Result of the current board; `Ongoing` if the engine fails.
    pub fn result(&self) -> GameResult {
        self.engine.result(&self.board()).unwrap_or_else(|e| {
            warn!(error = %e, "Result query failed, reporting ongoing");
            GameResult::Ongoing
        })
    }

    /// True if undo is possible right now.
    pub fn can_undo(&self) -> bool {
        self.timeline.can_undo() && self.automated_in_flight.is_none()
    }

    /// True if redo is possible right now.
    pub fn can_redo(&self) -> bool {
        self.timeline.can_redo() && self.automated_in_flight.is_none()
    }

    /// Human cell input. Any cell interaction lifts the post-rewind guard.
    #[instrument(skip(self), fields(position = %pos, turn = self.turn()))]
    pub fn attempt_move(&mut self, pos: Position) -> MoveOutcome {
        if self.post_rewind_guard {
            debug!("Cell interaction lifts post-rewind guard");
            self.post_rewind_guard = false;
        }
        self.execute(pos, MoveOrigin::Human)
    }

    /// Validates and executes one move, then resolves a forced pass.
    fn execute(&mut self, pos: Position, origin: MoveOrigin) -> MoveOutcome {
        if let Some(reason) = self.precheck(origin) {
            debug!(%reason, ?origin, "Move rejected");
            return MoveOutcome::rejected(reason);
        }

        let board = self.board();
        let color = self.current_color();
        if board.cell(pos) != Cell::Empty {
            debug!("Move rejected: cell occupied");
            return MoveOutcome::rejected(RejectReason::IllegalCell);
        }

        match self.engine.valid_moves(&board, color) {
            Ok(mask) if mask.contains(pos) => {}
            Ok(_) => {
                debug!("Move rejected: cell not legal");
                return MoveOutcome::rejected(RejectReason::IllegalCell);
            }
            Err(e) => {
                warn!(error = %e, "Legality check failed, move abandoned");
                return MoveOutcome::rejected(RejectReason::EngineFailure);
            }
        }

        let (next_board, turn, pass_notice) = match self.resolve(&board, pos, color) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "Engine failed during move, history untouched");
                return MoveOutcome::rejected(RejectReason::EngineFailure);
            }
        };

        self.timeline.record(next_board, turn);
        self.post_rewind_guard = false;
        self.pending_pass_notice = pass_notice;

        info!(
            %color,
            position = %pos,
            turn,
            pass = ?pass_notice,
            "Move accepted"
        );
        MoveOutcome::accepted(pass_notice)
    }

    /// Input gates checked before touching the engine.
    fn precheck(&self, origin: MoveOrigin) -> Option<RejectReason> {
        if self.result().is_terminal() {
            return Some(RejectReason::GameOver);
        }
        if self.pending_pass_notice.is_some() {
            return Some(RejectReason::PassNoticePending);
        }
        if origin == MoveOrigin::Human && self.automated_in_flight.is_some() {
            return Some(RejectReason::AutomatedTurnInFlight);
        }
        if self.current_mode() != origin.mode() {
            return Some(match origin {
                MoveOrigin::Human => RejectReason::NotHumanTurn,
                MoveOrigin::Automated => RejectReason::NotAutomatedTurn,
            });
        }
        None
    }

    /// Applies the move and computes the resulting turn and pass notice
    /// without committing anything.
    fn resolve(
        &self,
        board: &Board,
        pos: Position,
        color: Color,
    ) -> Result<(Board, u32, Option<Color>), EngineError> {
        let next_board = self.engine.apply_move(board, pos, color)?;
        let mut turn = self.turn() + 1;
        let next = Color::from_turn(turn);

        let mut pass_notice = None;
        if self.engine.is_pass(&next_board, next)?
            && !self.engine.result(&next_board)?.is_terminal()
        {
            turn += 1;
            pass_notice = Some(next);
        }
        Ok((next_board, turn, pass_notice))
    }

    /// Steps back one history entry.
    #[instrument(skip(self))]
    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            debug!("Undo unavailable");
            return false;
        }
        self.timeline.undo();
        self.after_rewind();
        info!(turn = self.turn(), cursor = self.timeline.cursor(), "Undo");
        true
    }

    /// Steps forward one history entry.
    #[instrument(skip(self))]
    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            debug!("Redo unavailable");
            return false;
        }
        self.timeline.redo();
        self.after_rewind();
        info!(turn = self.turn(), cursor = self.timeline.cursor(), "Redo");
        true
    }

    fn after_rewind(&mut self) {
        self.post_rewind_guard = true;
        self.pending_pass_notice = None;
        self.epoch += 1;
    }

    /// Returns to the starting position and clears all transient flags.
    /// Player modes are kept.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        self.timeline.reset(self.initial);
        self.automated_in_flight = None;
        self.post_rewind_guard = false;
        self.pending_pass_notice = None;
        self.epoch += 1;
        info!("Game reset");
    }

    /// Replaces the mode assignment. Board and history are untouched; an
    /// outstanding automated request is invalidated.
    #[instrument(skip(self))]
    pub fn set_player_modes(&mut self, modes: PlayerModes) {
        self.modes = modes;
        self.cancel_automated();
        info!(black = %modes.black, white = %modes.white, "Player modes changed");
    }

    /// Drops the pending pass notice. Returns false if none was pending.
    pub fn clear_pass_notice(&mut self) -> bool {
        self.pending_pass_notice.take().is_some()
    }

    /// Invalidates any outstanding automated request.
    pub fn cancel_automated(&mut self) {
        if self.automated_in_flight.take().is_some() {
            debug!("Outstanding automated request cancelled");
        }
        self.epoch += 1;
    }

    /// True if an automated move may be requested now.
    pub fn is_automated_eligible(&self, setup_gate: bool) -> bool {
        !setup_gate
            && self.pending_pass_notice.is_none()
            && self.automated_in_flight.is_none()
            && !self.post_rewind_guard
            && self.current_mode() == PlayerMode::Automated
            && !self.result().is_terminal()
    }

    /// Marks an automated request in flight and returns it, if eligible.
    #[instrument(skip(self), fields(turn = self.turn()))]
    pub fn evaluate_automated_turn(&mut self, setup_gate: bool) -> Option<AutomatedRequest> {
        if !self.is_automated_eligible(setup_gate) {
            return None;
        }
        self.next_ticket += 1;
        let ticket = AutomatedTicket {
            id: self.next_ticket,
            epoch: self.epoch,
        };
        self.automated_in_flight = Some(ticket);
        let color = self.current_color();
        info!(%color, ticket = ticket.id, "Automated turn requested");
        Some(AutomatedRequest {
            ticket,
            board: self.board(),
            color,
        })
    }

    /// Clears the in-flight flag if `ticket` still owns it.
    pub fn release_automated(&mut self, ticket: AutomatedTicket) -> bool {
        if self.automated_in_flight == Some(ticket) {
            self.automated_in_flight = None;
            true
        } else {
            false
        }
    }

    /// Applies an automated answer through the regular move path, unless the
    /// request has been invalidated in the meantime.
    #[instrument(skip(self, ticket, reply), fields(ticket_id = ticket.id))]
    pub fn settle_automated(
        &mut self,
        ticket: AutomatedTicket,
        reply: Result<AiMove, EngineError>,
    ) -> AutomatedSettlement {
        if !self.release_automated(ticket) || ticket.epoch != self.epoch {
            debug!("Stale automated answer discarded");
            return AutomatedSettlement::Discarded;
        }
        if self.post_rewind_guard {
            debug!("Automated answer discarded after rewind");
            return AutomatedSettlement::Discarded;
        }

        match reply {
            Ok(AiMove::Play(pos)) => {
                AutomatedSettlement::Applied(self.execute(pos, MoveOrigin::Automated))
            }
            Ok(AiMove::Pass) => {
                debug!("Engine answered pass, nothing to apply");
                AutomatedSettlement::Passed
            }
            Err(e) => {
                warn!(error = %e, "Automated move failed");
                AutomatedSettlement::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::reversi::BitboardEngine;

    fn controller(modes: PlayerModes) -> TurnController<BitboardEngine> {
        TurnController::new(Arc::new(BitboardEngine::new()), Board::initial(), modes)
    }

    fn pos(s: &str) -> Position {
        s.parse().unwrap()
    }

    #[test]
    fn test_human_move_records_history() {
        let mut tc = controller(PlayerModes::default());
        let outcome = tc.attempt_move(pos("d3"));
        assert!(outcome.accepted);
        assert_eq!(tc.turn(), 1);
        assert_eq!(tc.timeline().len(), 2);
        assert_eq!(tc.current_color(), Color::White);
    }

    #[test]
    fn test_human_rejected_on_automated_turn() {
        let mut tc = controller(PlayerModes::new(PlayerMode::Automated, PlayerMode::Human));
        let outcome = tc.attempt_move(pos("d3"));
        assert_eq!(outcome.rejection, Some(RejectReason::NotHumanTurn));
        assert_eq!(tc.turn(), 0);
    }

    #[test]
    fn test_stale_ticket_discarded_after_reset() {
        let mut tc = controller(PlayerModes::new(PlayerMode::Automated, PlayerMode::Human));
        let request = tc.evaluate_automated_turn(false).unwrap();
        assert!(tc.is_automated_in_flight());
        tc.reset();
        assert!(!tc.is_automated_in_flight());
        let settled = tc.settle_automated(request.ticket, Ok(AiMove::Play(pos("d3"))));
        assert_eq!(settled, AutomatedSettlement::Discarded);
        assert_eq!(tc.turn(), 0);
    }

    #[test]
    fn test_automated_answer_applied() {
        let mut tc = controller(PlayerModes::new(PlayerMode::Automated, PlayerMode::Human));
        let request = tc.evaluate_automated_turn(false).unwrap();
        assert_eq!(request.color, Color::Black);
        assert!(tc.evaluate_automated_turn(false).is_none());
        let settled = tc.settle_automated(request.ticket, Ok(AiMove::Play(pos("c4"))));
        assert!(matches!(settled, AutomatedSettlement::Applied(o) if o.accepted));
        assert!(!tc.is_automated_in_flight());
        assert_eq!(tc.turn(), 1);
    }

    #[test]
    fn test_pass_answer_is_noop() {
        let mut tc = controller(PlayerModes::new(PlayerMode::Automated, PlayerMode::Human));
        let request = tc.evaluate_automated_turn(false).unwrap();
        assert_eq!(
            tc.settle_automated(request.ticket, Ok(AiMove::Pass)),
            AutomatedSettlement::Passed
        );
        assert!(!tc.is_automated_in_flight());
        assert_eq!(tc.turn(), 0);
    }

    #[test]
    fn test_setup_gate_blocks_dispatch() {
        let mut tc = controller(PlayerModes::new(PlayerMode::Automated, PlayerMode::Automated));
        assert!(tc.evaluate_automated_turn(true).is_none());
        assert!(tc.evaluate_automated_turn(false).is_some());
    }
}
