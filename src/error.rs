//! Error types for the engine supervisor and the playback client

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures that prevent the engine from reaching the running state.
///
/// `Clone` because one start attempt is shared by every concurrent caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine executable not found at {}", .0.display())]
    ExecutableMissing(PathBuf),

    #[error("Wine is not installed; it is required to run the engine on this platform")]
    CompatLayerMissing,

    #[error("failed to spawn engine: {0}")]
    Spawn(String),

    #[error("engine did not become ready within {}s", .0.as_secs())]
    ReadyTimeout(Duration),

    #[error("engine start aborted: {0}")]
    StartAborted(String),
}

/// Failures surfaced by playback operations.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("invalid content id: {0}")]
    InvalidContentId(String),

    #[error("invalid engine URL: {0}")]
    InvalidUrl(String),

    /// Error message reported by the engine itself.
    #[error("{0}")]
    Engine(String),

    #[error("engine request timed out")]
    Timeout,

    #[error("engine request failed: {0}")]
    Transport(String),

    #[error("malformed engine response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for PlaybackError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PlaybackError::Timeout
        } else if e.is_decode() {
            PlaybackError::Malformed(e.to_string())
        } else {
            PlaybackError::Transport(e.to_string())
        }
    }
}
