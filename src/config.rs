//! Session configuration: player modes, strengths and timings.

use crate::games::reversi::Color;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Who chooses the moves for a color.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PlayerMode {
    /// Moves come from cell input.
    #[default]
    Human,
    /// Moves come from the engine's search.
    #[serde(alias = "ai")]
    #[strum(to_string = "automated", serialize = "ai")]
    Automated,
}

/// Mode assignment for both colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerModes {
    /// Mode for Black.
    pub black: PlayerMode,
    /// Mode for White.
    pub white: PlayerMode,
}

impl PlayerModes {
    /// Creates an assignment.
    pub fn new(black: PlayerMode, white: PlayerMode) -> Self {
        Self { black, white }
    }

    /// Mode of one color.
    pub fn of(&self, color: Color) -> PlayerMode {
        match color {
            Color::Black => self.black,
            Color::White => self.white,
        }
    }
}

/// Automated player strength, always within `[1, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(try_from = "u8", into = "u8")]
#[display("{}", _0)]
pub struct StrengthLevel(u8);

impl StrengthLevel {
    /// Weakest level.
    pub const MIN: u8 = 1;
    /// Strongest level.
    pub const MAX: u8 = 10;

    /// Validates a level.
    #[track_caller]
    pub fn new(level: u8) -> Result<Self, ConfigError> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ConfigError::new(format!(
                "Strength level {} outside {}..={}",
                level,
                Self::MIN,
                Self::MAX
            )))
        }
    }

    /// The level as a number.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for StrengthLevel {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for StrengthLevel {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StrengthLevel> for u8 {
    fn from(level: StrengthLevel) -> Self {
        level.0
    }
}

/// Startup settings for one color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Initial mode.
    pub mode: PlayerMode,
    /// Initial strength (used while automated).
    pub strength: StrengthLevel,
}

/// Configuration for a game session.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct SessionConfig {
    /// Presentational delay before an automated request is sent.
    #[serde(default = "default_automated_delay_ms")]
    automated_delay_ms: u64,

    /// Thinking-time budget handed to the engine.
    #[serde(default = "default_think_time_ms")]
    think_time_ms: u64,

    /// How long a pass notice blocks input before it is cleared.
    #[serde(default = "default_pass_notice_ms")]
    pass_notice_ms: u64,

    /// Black's startup settings.
    #[serde(default)]
    black: PlayerConfig,

    /// White's startup settings.
    #[serde(default)]
    white: PlayerConfig,
}

fn default_automated_delay_ms() -> u64 {
    1200
}

fn default_think_time_ms() -> u64 {
    1000
}

fn default_pass_notice_ms() -> u64 {
    700
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            automated_delay_ms: default_automated_delay_ms(),
            think_time_ms: default_think_time_ms(),
            pass_notice_ms: default_pass_notice_ms(),
            black: PlayerConfig::default(),
            white: PlayerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Loads configuration from TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(
            black = %config.black.mode,
            white = %config.white.mode,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))
    }

    /// Settings for one color.
    pub fn player(&self, color: Color) -> &PlayerConfig {
        match color {
            Color::Black => &self.black,
            Color::White => &self.white,
        }
    }

    /// Startup mode assignment.
    pub fn player_modes(&self) -> PlayerModes {
        PlayerModes::new(self.black.mode, self.white.mode)
    }

    /// Presentational delay as a duration.
    pub fn automated_delay(&self) -> Duration {
        Duration::from_millis(self.automated_delay_ms)
    }

    /// Engine budget as a duration.
    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }

    /// Pass-notice window as a duration.
    pub fn pass_notice_window(&self) -> Duration {
        Duration::from_millis(self.pass_notice_ms)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_bounds() {
        assert!(StrengthLevel::new(0).is_err());
        assert!(StrengthLevel::new(11).is_err());
        assert_eq!(StrengthLevel::new(10).unwrap().get(), 10);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("human".parse::<PlayerMode>().unwrap(), PlayerMode::Human);
        assert_eq!("AI".parse::<PlayerMode>().unwrap(), PlayerMode::Automated);
        assert_eq!("automated".parse::<PlayerMode>().unwrap(), PlayerMode::Automated);
        assert!("robot".parse::<PlayerMode>().is_err());
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = SessionConfig::from_toml("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.automated_delay(), Duration::from_millis(1200));
        assert_eq!(config.pass_notice_window(), Duration::from_millis(700));
    }
}
