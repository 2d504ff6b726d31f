//! Strictly Reversi - terminal front end
//!
//! A thin view over [`strictly_reversi::Session`]: commands come from stdin,
//! session events are rendered as they arrive.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use std::path::PathBuf;
use std::sync::Arc;
use strictly_reversi::{
    BitboardEngine, Color, PlayerConfig, PlayerMode, Position, Session, SessionConfig,
    SessionEvent, StrengthLevel,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Play {
            black,
            white,
            strength,
            config,
        } => run_play(black, white, strength, config).await,
        Command::Watch { strength, json } => run_watch(strength, json).await,
    }
}

/// Builds the session config from an optional file plus command-line overrides.
fn build_config(
    black: Option<PlayerMode>,
    white: Option<PlayerMode>,
    strength: Option<u8>,
    path: Option<PathBuf>,
) -> Result<SessionConfig> {
    let config = match path {
        Some(path) => SessionConfig::from_file(&path)
            .with_context(|| format!("Loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    let strength = strength.map(StrengthLevel::new).transpose()?;

    let mut black_cfg = *config.black();
    let mut white_cfg = *config.white();
    if let Some(mode) = black {
        black_cfg.mode = mode;
    }
    if let Some(mode) = white {
        white_cfg.mode = mode;
    }
    if let Some(level) = strength {
        black_cfg.strength = level;
        white_cfg.strength = level;
    }
    Ok(config.with_black(black_cfg).with_white(white_cfg))
}

/// Run an interactive game on stdin/stdout
#[instrument(skip_all)]
async fn run_play(
    black: Option<PlayerMode>,
    white: Option<PlayerMode>,
    strength: Option<u8>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = build_config(black, white, strength, config)?;
    let (tx, mut events) = mpsc::unbounded_channel();
    let session = Session::new(Arc::new(BitboardEngine::new()), config, tx)?;

    info!("Starting interactive game");
    print_help();
    print_board(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle_command(&session, line.trim()) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("{}", e),
                }
            }
            Some(event) = events.recv() => render_event(&session, &event),
        }
    }

    session.shutdown();
    Ok(())
}

/// Applies one stdin command. Returns false on quit.
fn handle_command(session: &Session<BitboardEngine>, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(true);
    };
    debug!(command = head, "Handling command");

    match head.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => return Ok(false),
        "help" | "?" => print_help(),
        "board" => print_board(session),
        "undo" => {
            if !session.undo() {
                println!("Nothing to undo");
            }
        }
        "redo" => {
            if !session.redo() {
                println!("Nothing to redo");
            }
        }
        "reset" => session.reset(),
        "ok" => {
            session.clear_pass_notice();
        }
        "mode" => {
            let (Some(b), Some(w)) = (words.next(), words.next()) else {
                bail!("Usage: mode <black> <white>");
            };
            session.set_player_mode(b.parse()?, w.parse()?);
        }
        "strength" => {
            let (Some(color), Some(level)) = (words.next(), words.next()) else {
                bail!("Usage: strength <black|white> <1-10>");
            };
            let color = parse_color(color)?;
            let level = StrengthLevel::new(level.parse()?)?;
            session.set_strength_level(color, level);
            println!("{} strength set to {}", color, level);
        }
        cell => {
            let pos: Position = cell.parse()?;
            let outcome = session.attempt_move_at(pos);
            if let Some(reason) = outcome.rejection {
                println!("{}: {}", pos, reason);
            }
        }
    }
    Ok(true)
}

fn parse_color(input: &str) -> Result<Color> {
    match input.to_ascii_lowercase().as_str() {
        "black" | "b" => Ok(Color::Black),
        "white" | "w" => Ok(Color::White),
        other => bail!("Unknown color '{}'", other),
    }
}

fn render_event(session: &Session<BitboardEngine>, event: &SessionEvent) {
    match event {
        SessionEvent::MoveMade {
            color, position, ..
        } => {
            println!("{} plays {}", color, position);
            print_board(session);
        }
        SessionEvent::PassAnnounced(color) => println!("{} has no legal move and passes", color),
        SessionEvent::AutomatedThinking(color) => println!("{} is thinking...", color),
        SessionEvent::Rewound { turn } => {
            println!("Back to turn {}", turn);
            print_board(session);
        }
        SessionEvent::Reset => {
            println!("New game");
            print_board(session);
        }
        SessionEvent::ModesChanged(modes) => {
            println!("Black: {}, White: {}", modes.black, modes.white);
        }
        SessionEvent::GameOver(result) => {
            let counts = session.stone_counts();
            match result.winner() {
                Some(color) => println!(
                    "Game over: {} wins ({} - {})",
                    color, counts.black, counts.white
                ),
                None => println!("Game over: {} ({} - {})", result, counts.black, counts.white),
            }
        }
        SessionEvent::PassNoticeCleared | SessionEvent::AutomatedDiscarded => {}
    }
}

fn print_board(session: &Session<BitboardEngine>) {
    let snapshot = session.snapshot();
    println!("{}", session.board());
    println!(
        "Turn {} - {} ({}) to move - Black {} / White {}",
        snapshot.turn,
        snapshot.current_color,
        snapshot.current_mode,
        snapshot.stones.black,
        snapshot.stones.white
    );
    if !snapshot.result.is_terminal() && !snapshot.legal_moves.is_empty() {
        println!("Legal: {}", snapshot.legal_moves.join(" "));
    }
}

fn print_help() {
    println!("Commands: <cell> (e.g. d3), undo, redo, reset, ok, board,");
    println!("          mode <black> <white>, strength <color> <n>, quit");
}

/// Run an automated game to completion
#[instrument]
async fn run_watch(strength: u8, json: bool) -> Result<()> {
    let level = StrengthLevel::new(strength)?;
    let player = PlayerConfig {
        mode: PlayerMode::Automated,
        strength: level,
    };
    let config = SessionConfig::default()
        .with_automated_delay_ms(0)
        .with_think_time_ms(250)
        .with_pass_notice_ms(0)
        .with_black(player)
        .with_white(player);

    let (tx, mut events) = mpsc::unbounded_channel();
    let session = Session::new(Arc::new(BitboardEngine::new()), config, tx)?;
    info!(%level, "Watching automated game");

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::MoveMade { .. } if json => {
                println!("{}", serde_json::to_string(&session.snapshot())?);
            }
            SessionEvent::MoveMade { .. } => render_event(&session, &event),
            SessionEvent::GameOver(_) => {
                render_event(&session, &event);
                break;
            }
            SessionEvent::PassAnnounced(_) => render_event(&session, &event),
            _ => {}
        }
    }

    if !session.result().is_terminal() {
        warn!("Event stream ended before the game finished");
    }
    session.shutdown();
    Ok(())
}
