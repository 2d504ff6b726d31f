//! Command-line interface for strictly_reversi.

use clap::{Parser, Subcommand};
use strictly_reversi::PlayerMode;

/// Strictly Reversi - Two-player reversi with undo/redo and an automated opponent
#[derive(Parser, Debug)]
#[command(name = "strictly_reversi")]
#[command(about = "Play reversi in the terminal", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play an interactive game, reading commands from stdin
    Play {
        /// Mode for Black (human or automated)
        #[arg(long)]
        black: Option<PlayerMode>,

        /// Mode for White (human or automated)
        #[arg(long)]
        white: Option<PlayerMode>,

        /// Strength for every automated player (1-10)
        #[arg(short, long)]
        strength: Option<u8>,

        /// Path to a session config file
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },

    /// Watch two automated players finish a game
    Watch {
        /// Strength for both players (1-10)
        #[arg(short, long, default_value = "3")]
        strength: u8,

        /// Print a JSON snapshot after every move instead of the board
        #[arg(long)]
        json: bool,
    },
}
