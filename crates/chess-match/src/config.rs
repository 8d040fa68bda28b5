//! Configuration file loading.
//!
//! Settings come from a TOML file (`chess-match.toml` in the current
//! directory by default). Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::session::{DifficultyDepths, SessionSettings};

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// The evaluator would search no deeper than engine play.
    #[error("evaluation_depth ({evaluation}) must be greater than every difficulty depth (deepest is {deepest})")]
    EvaluationDepthTooShallow { evaluation: u32, deepest: u32 },
    #[error("hint_movetime_ms must be positive")]
    ZeroHintTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    /// UCI engine executable. A bare name is looked up in `PATH`.
    #[serde(default = "default_engine_path")]
    pub engine_path: String,
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,
    /// Fixed search budget for hints.
    #[serde(default = "default_hint_movetime_ms")]
    pub hint_movetime_ms: u64,
    /// Depth of the post-game evaluation pass.
    #[serde(default = "default_evaluation_depth")]
    pub evaluation_depth: u32,
    #[serde(default)]
    pub difficulty: DifficultyDepths,
}

fn default_engine_path() -> String {
    "stockfish".to_string()
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("user_data.json")
}

fn default_hint_movetime_ms() -> u64 {
    100
}

fn default_evaluation_depth() -> u32 {
    22
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine_path: default_engine_path(),
            profile_path: default_profile_path(),
            hint_movetime_ms: default_hint_movetime_ms(),
            evaluation_depth: default_evaluation_depth(),
            difficulty: DifficultyDepths::default(),
        }
    }
}

impl AppConfig {
    /// Loads and validates the configuration at `path`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// [`ConfigError::ParseError`] if it contains invalid TOML, or a validation
    /// error for inconsistent values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("chess-match.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let deepest = self.difficulty.deepest();
        if self.evaluation_depth <= deepest {
            return Err(ConfigError::EvaluationDepthTooShallow {
                evaluation: self.evaluation_depth,
                deepest,
            });
        }
        if self.hint_movetime_ms == 0 {
            return Err(ConfigError::ZeroHintTime);
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            depths: self.difficulty,
            hint_movetime: Duration::from_millis(self.hint_movetime_ms),
        }
    }
}
