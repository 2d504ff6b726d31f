//! Tests for the session: automated dispatch, cancellation and teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use strictly_reversi::{
    AiMove, BitboardEngine, Board, Color, EngineError, GameResult, MoveMask, PlayerConfig,
    PlayerMode, Position, RejectReason, RulesEngine, Session, SessionConfig, SessionEvent,
    StrengthLevel,
};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(10);

fn fast_config(black: PlayerMode, white: PlayerMode) -> SessionConfig {
    let level = StrengthLevel::new(2).unwrap();
    SessionConfig::default()
        .with_automated_delay_ms(20)
        .with_think_time_ms(50)
        .with_pass_notice_ms(30)
        .with_black(PlayerConfig { mode: black, strength: level })
        .with_white(PlayerConfig { mode: white, strength: level })
}

fn start(config: SessionConfig) -> (Session<BitboardEngine>, UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = unbounded_channel();
    let session = Session::new(Arc::new(BitboardEngine::new()), config, tx).unwrap();
    (session, rx)
}

/// Waits for the first event matching `pred`, failing after [`WAIT`].
async fn wait_for(
    events: &mut UnboundedReceiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drains whatever is queued right now.
fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn pos(s: &str) -> Position {
    s.parse().unwrap()
}

#[test]
fn test_new_requires_runtime() {
    let (tx, _rx) = unbounded_channel();
    let result = Session::new(Arc::new(BitboardEngine::new()), SessionConfig::default(), tx);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_initial_view() {
    let (session, _events) = start(fast_config(PlayerMode::Human, PlayerMode::Human));
    assert_eq!(session.turn(), 0);
    assert_eq!(session.current_color(), Color::Black);
    assert_eq!(session.current_mode(), PlayerMode::Human);
    assert_eq!(session.stone_counts().black, 2);
    assert_eq!(session.stone_counts().white, 2);
    assert_eq!(session.valid_moves().count(), 4);
    assert_eq!(session.result(), GameResult::Ongoing);
    assert!(!session.can_undo());
    assert!(!session.can_redo());
    assert_eq!(session.cell(8, 0), None);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.legal_moves, vec!["d3", "c4", "f5", "e6"]);
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["current_color"], "black");
    assert_eq!(json["current_mode"], "human");
}

#[tokio::test]
async fn test_off_board_move_rejected() {
    let (session, _events) = start(fast_config(PlayerMode::Human, PlayerMode::Human));
    let outcome = session.attempt_move(9, 2);
    assert_eq!(outcome.rejection, Some(RejectReason::IllegalCell));
}

#[tokio::test]
async fn test_automated_reply_follows_human_move() {
    let (session, mut events) = start(fast_config(PlayerMode::Human, PlayerMode::Automated));

    assert!(session.attempt_move(2, 3).accepted);
    wait_for(&mut events, |e| matches!(e, SessionEvent::AutomatedThinking(Color::White))).await;
    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::MoveMade { color: Color::White, .. })
    })
    .await;

    assert!(matches!(event, SessionEvent::MoveMade { turn: 2, .. }));
    assert_eq!(session.turn(), 2);
    assert_eq!(session.history_len(), 3);
    assert!(!session.is_automated_in_flight());
    assert!(session.can_undo());
}

#[tokio::test]
async fn test_reset_discards_pending_request() {
    let config = fast_config(PlayerMode::Human, PlayerMode::Automated).with_automated_delay_ms(150);
    let (session, mut events) = start(config);

    assert!(session.attempt_move(2, 3).accepted);
    assert!(session.is_automated_in_flight());
    assert!(!session.can_undo());

    session.reset();
    assert!(!session.is_automated_in_flight());
    assert_eq!(session.turn(), 0);

    sleep(Duration::from_millis(400)).await;
    assert_eq!(session.turn(), 0);
    assert_eq!(session.history_len(), 1);
    let seen = drain(&mut events);
    assert!(seen.contains(&SessionEvent::Reset));
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::MoveMade { color: Color::White, .. })));
}

#[tokio::test]
async fn test_mode_change_discards_pending_request() {
    let config = fast_config(PlayerMode::Automated, PlayerMode::Human).with_automated_delay_ms(150);
    let (session, _events) = start(config);
    assert!(session.is_automated_in_flight());

    session.set_player_mode(PlayerMode::Human, PlayerMode::Human);
    assert!(!session.is_automated_in_flight());

    sleep(Duration::from_millis(400)).await;
    assert_eq!(session.turn(), 0);
    assert_eq!(session.history_len(), 1);
}

#[tokio::test]
async fn test_undo_suppresses_dispatch_until_cell_interaction() {
    let (session, mut events) = start(fast_config(PlayerMode::Human, PlayerMode::Automated));
    session.attempt_move(2, 3);
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::MoveMade { color: Color::White, .. })
    })
    .await;

    assert!(session.undo());
    assert_eq!(session.turn(), 1);
    assert_eq!(session.current_mode(), PlayerMode::Automated);

    sleep(Duration::from_millis(200)).await;
    assert!(!session.is_automated_in_flight());
    assert_eq!(session.turn(), 1);
    assert!(session.can_redo());

    let outcome = session.attempt_move(0, 0);
    assert_eq!(outcome.rejection, Some(RejectReason::NotHumanTurn));
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::MoveMade { color: Color::White, .. })
    })
    .await;
    assert_eq!(session.turn(), 2);
}

#[tokio::test]
async fn test_setup_gate_holds_dispatch() {
    let config = fast_config(PlayerMode::Human, PlayerMode::Human);
    let (session, mut events) = start(config);
    session.set_setup_gate(true);
    session.set_player_mode(PlayerMode::Automated, PlayerMode::Human);
    assert!(!session.is_automated_in_flight());

    session.set_setup_gate(false);
    assert!(session.is_automated_in_flight());
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::MoveMade { color: Color::Black, .. })
    })
    .await;
}

#[tokio::test]
async fn test_pass_notice_window_blocks_input() {
    let board: Board = "BW......................................................BW......"
        .parse()
        .unwrap();
    let config = fast_config(PlayerMode::Human, PlayerMode::Human).with_pass_notice_ms(100);
    let (tx, mut events) = unbounded_channel();
    let session =
        Session::with_initial_board(Arc::new(BitboardEngine::new()), config, board, tx).unwrap();

    let outcome = session.attempt_move_at(pos("c1"));
    assert_eq!(outcome.pass_notice, Some(Color::White));
    assert_eq!(session.pending_pass_notice(), Some(Color::White));
    assert_eq!(session.current_color(), Color::Black);

    let blocked = session.attempt_move_at(pos("c8"));
    assert_eq!(blocked.rejection, Some(RejectReason::PassNoticePending));

    wait_for(&mut events, |e| matches!(e, SessionEvent::PassAnnounced(Color::White))).await;
    wait_for(&mut events, |e| *e == SessionEvent::PassNoticeCleared).await;
    assert_eq!(session.pending_pass_notice(), None);

    assert!(session.attempt_move_at(pos("c8")).accepted);
    let over = wait_for(&mut events, |e| matches!(e, SessionEvent::GameOver(_))).await;
    assert_eq!(over, SessionEvent::GameOver(GameResult::BlackWin));
}

#[tokio::test]
async fn test_pass_notice_acknowledged_early() {
    let board: Board = "BW......................................................BW......"
        .parse()
        .unwrap();
    let config = fast_config(PlayerMode::Human, PlayerMode::Human).with_pass_notice_ms(60_000);
    let (tx, _events) = unbounded_channel();
    let session =
        Session::with_initial_board(Arc::new(BitboardEngine::new()), config, board, tx).unwrap();

    session.attempt_move_at(pos("c1"));
    assert!(session.clear_pass_notice());
    assert!(session.attempt_move_at(pos("c8")).accepted);
}

#[tokio::test]
async fn test_automated_game_runs_to_completion() {
    let config = fast_config(PlayerMode::Automated, PlayerMode::Automated)
        .with_automated_delay_ms(0)
        .with_pass_notice_ms(0)
        .with_think_time_ms(20);
    let (session, mut events) = start(config);
    session.set_strength_level(Color::Black, StrengthLevel::new(1).unwrap());
    session.set_strength_level(Color::White, StrengthLevel::new(1).unwrap());

    let over = timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Some(SessionEvent::GameOver(result)) => return result,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("game did not finish");

    assert!(over.is_terminal());
    assert_eq!(session.result(), over);
    let counts = session.stone_counts();
    assert!(counts.black + counts.white <= 64);
    assert!(!session.is_automated_in_flight());
}

#[tokio::test]
async fn test_drop_cancels_scheduled_work() {
    let config = fast_config(PlayerMode::Automated, PlayerMode::Human).with_automated_delay_ms(100);
    let (session, mut events) = start(config);
    assert!(session.is_automated_in_flight());
    drop(session);

    let rest = timeout(WAIT, async {
        let mut rest = Vec::new();
        while let Some(event) = events.recv().await {
            rest.push(event);
        }
        rest
    })
    .await
    .expect("sender outlived the session");
    assert!(!rest.iter().any(|e| matches!(e, SessionEvent::MoveMade { .. })));
}

#[tokio::test]
async fn test_shutdown_stops_dispatch() {
    let config = fast_config(PlayerMode::Human, PlayerMode::Automated).with_automated_delay_ms(100);
    let (session, _events) = start(config);
    session.shutdown();
    session.attempt_move(2, 3);
    assert!(!session.is_automated_in_flight());
    sleep(Duration::from_millis(300)).await;
    assert_eq!(session.turn(), 1);
}

/// Legal rules, but the search always fails.
struct BrokenSearch {
    inner: BitboardEngine,
    calls: AtomicUsize,
}

impl RulesEngine for BrokenSearch {
    fn valid_moves(&self, board: &Board, color: Color) -> Result<MoveMask, EngineError> {
        self.inner.valid_moves(board, color)
    }

    fn apply_move(&self, board: &Board, pos: Position, color: Color) -> Result<Board, EngineError> {
        self.inner.apply_move(board, pos, color)
    }

    fn result(&self, board: &Board) -> Result<GameResult, EngineError> {
        self.inner.result(board)
    }

    fn choose_move(
        &self,
        _board: &Board,
        _color: Color,
        _budget: Duration,
        _strength: StrengthLevel,
    ) -> Result<AiMove, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::new("search unavailable"))
    }
}

#[tokio::test]
async fn test_search_failure_leaves_state_intact() {
    let engine = Arc::new(BrokenSearch {
        inner: BitboardEngine::new(),
        calls: AtomicUsize::new(0),
    });
    let (tx, mut events) = unbounded_channel();
    let session = Session::new(
        Arc::clone(&engine),
        fast_config(PlayerMode::Automated, PlayerMode::Human),
        tx,
    )
    .unwrap();

    wait_for(&mut events, |e| *e == SessionEvent::AutomatedDiscarded).await;
    assert!(!session.is_automated_in_flight());
    assert_eq!(session.turn(), 0);
    assert_eq!(session.history_len(), 1);

    // No retry loop: the next request waits for a state change
    sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

    session.set_player_mode(PlayerMode::Automated, PlayerMode::Human);
    wait_for(&mut events, |e| *e == SessionEvent::AutomatedDiscarded).await;
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_mode_change_keeps_pass_notice_window() {
    let board: Board = "BW......................................................BW......"
        .parse()
        .unwrap();
    let config = fast_config(PlayerMode::Human, PlayerMode::Human).with_pass_notice_ms(50);
    let (tx, mut events) = unbounded_channel();
    let session =
        Session::with_initial_board(Arc::new(BitboardEngine::new()), config, board, tx).unwrap();

    let outcome = session.attempt_move_at(pos("c1"));
    assert_eq!(outcome.pass_notice, Some(Color::White));
    session.set_player_mode(PlayerMode::Human, PlayerMode::Human);

    wait_for(&mut events, |e| *e == SessionEvent::PassNoticeCleared).await;
    assert_eq!(session.pending_pass_notice(), None);
    assert!(session.attempt_move_at(pos("c8")).accepted);
}

#[tokio::test]
async fn test_start_board_with_stuck_black_rejected() {
    // White a1, Black b1: only White can move
    let board = Board::from_masks(1 << 1, 1 << 0);
    let (tx, _events) = unbounded_channel();
    let result = Session::with_initial_board(
        Arc::new(BitboardEngine::new()),
        SessionConfig::default(),
        board,
        tx,
    );
    let err = result.err().expect("start board should be rejected");
    assert!(err.message.contains("no legal move"));
}

#[tokio::test]
async fn test_finished_start_board_accepted() {
    let board = Board::from_masks(0b111, 0);
    let (tx, _events) = unbounded_channel();
    let session = Session::with_initial_board(
        Arc::new(BitboardEngine::new()),
        SessionConfig::default(),
        board,
        tx,
    )
    .unwrap();
    assert_eq!(session.result(), GameResult::BlackWin);
    assert_eq!(session.attempt_move(0, 3).rejection, Some(RejectReason::GameOver));
}
