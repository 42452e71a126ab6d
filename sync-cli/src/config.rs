//! Configuration management for lpsync.
//!
//! Two files live in the data directory:
//! - `lpsync.toml` (optional): session tuning, loaded with serde defaults
//! - `state.json`: the resume point of the last run

use anyhow::{Context, Result};
use lpsync_client::{HistoryConfig, ResumePoint, RetryPolicy, SessionConfig};
use lpsync_types::PollMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name inside the data directory.
pub const CONFIG_FILE: &str = "lpsync.toml";

/// Resume point file name inside the data directory.
pub const STATE_FILE: &str = "state.json";

/// Root configuration for lpsync.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Live polling configuration.
    #[serde(default)]
    pub poll: PollSection,
    /// History catch-up configuration.
    #[serde(default)]
    pub history: HistorySection,
    /// History retry configuration.
    #[serde(default)]
    pub retry: RetrySection,
}

/// Live polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    /// Seconds the server may hold a poll open (default: 25).
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u32,
    /// Poll mode bits (default: 2, include attachments).
    #[serde(default = "default_mode")]
    pub mode: u32,
}

/// History catch-up configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    /// Messages per page (default: 200, minimum 200).
    #[serde(default = "default_messages_limit")]
    pub messages_limit: u32,
    /// Event budget per page (default: 1000, minimum 1000).
    #[serde(default = "default_events_limit")]
    pub events_limit: u32,
    /// Truncate bodies to this many characters.
    pub preview_length: Option<u32>,
    /// Only history from users currently online.
    #[serde(default)]
    pub onlines_only: bool,
}

/// History retry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Attempts per page, including the first (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay in milliseconds (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_wait_secs() -> u32 {
    lpsync_client::DEFAULT_WAIT_SECS
}

fn default_mode() -> u32 {
    PollMode::default().bits()
}

fn default_messages_limit() -> u32 {
    lpsync_client::MIN_MESSAGES_LIMIT
}

fn default_events_limit() -> u32 {
    lpsync_client::MIN_EVENTS_LIMIT
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            wait_secs: default_wait_secs(),
            mode: default_mode(),
        }
    }
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            messages_limit: default_messages_limit(),
            events_limit: default_events_limit(),
            preview_length: None,
            onlines_only: false,
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl CliConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load the explicit config file, or `lpsync.toml` from the data
    /// directory if it exists, or fall back to defaults.
    pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let path = data_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Build the session configuration this file describes.
    pub fn session_config(&self) -> SessionConfig {
        let mut history = HistoryConfig::default()
            .with_messages_limit(self.history.messages_limit)
            .with_events_limit(self.history.events_limit)
            .with_onlines_only(self.history.onlines_only);
        if let Some(length) = self.history.preview_length {
            history = history.with_preview_length(length);
        }

        let retry = RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        );

        SessionConfig::default()
            .with_wait_secs(self.poll.wait_secs)
            .with_mode(PollMode::from_bits(self.poll.mode))
            .with_history(history)
            .with_retry(retry)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Load the persisted resume point, if any.
pub async fn load_resume_point(data_dir: &Path) -> Result<Option<ResumePoint>> {
    let path = data_dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let contents = tokio::fs::read_to_string(&path)
        .await
        .context("Failed to read resume point")?;
    let resume = serde_json::from_str(&contents).context("Invalid resume point")?;
    Ok(Some(resume))
}

/// Persist the resume point.
pub async fn save_resume_point(data_dir: &Path, resume: &ResumePoint) -> Result<()> {
    let path = data_dir.join(STATE_FILE);
    let contents = serde_json::to_string_pretty(resume)?;
    tokio::fs::write(&path, contents)
        .await
        .context("Failed to save resume point")?;
    Ok(())
}

/// Delete the persisted resume point. Returns whether one existed.
pub async fn clear_resume_point(data_dir: &Path) -> Result<bool> {
    let path = data_dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(false);
    }
    tokio::fs::remove_file(&path)
        .await
        .context("Failed to delete resume point")?;
    Ok(true)
}
