//! The operations a front-end may invoke.
//!
//! Every input is validated before any network call; results are plain
//! serialisable values, never errors.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

use crate::cache;
use crate::config::Config;
use crate::engine::{EngineProcessManager, EngineStatus};
use crate::error::PlaybackError;
use crate::playback::{PlaybackSession, PlaybackSessionClient, StreamStats};

static CONTENT_ID_PATTERN: OnceCell<Regex> = OnceCell::new();

/// `{ success, error? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// `{ success, error?, session? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<PlaybackSession>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Accepts exactly 40 hexadecimal characters.
pub fn validate_content_id(content_id: &str) -> Result<(), PlaybackError> {
    let pattern = CONTENT_ID_PATTERN
        .get_or_try_init(|| Regex::new(r"^[a-fA-F0-9]{40}$"))
        .map_err(|e| PlaybackError::InvalidContentId(e.to_string()))?;
    if pattern.is_match(content_id) {
        Ok(())
    } else {
        Err(PlaybackError::InvalidContentId(content_id.to_string()))
    }
}

/// Only URLs on the local engine's own origin may be requested.
pub fn validate_engine_url(url: &str, origin: &str) -> Result<(), PlaybackError> {
    if url.starts_with(origin) {
        Ok(())
    } else {
        Err(PlaybackError::InvalidUrl(url.to_string()))
    }
}

pub struct Bridge {
    engine: EngineProcessManager,
    client: PlaybackSessionClient,
    cache_dir: PathBuf,
}

impl Bridge {
    pub fn new(config: &Config, engine: EngineProcessManager, client: PlaybackSessionClient) -> Self {
        let cache_dir = config.engine_cache_dir(engine.platform());
        Self {
            engine,
            client,
            cache_dir,
        }
    }

    pub fn engine(&self) -> &EngineProcessManager {
        &self.engine
    }

    pub fn client(&self) -> &PlaybackSessionClient {
        &self.client
    }

    pub async fn engine_start(&self) -> OpResult {
        match self.engine.start().await {
            Ok(()) => OpResult::ok(),
            Err(e) => OpResult::failed(e),
        }
    }

    pub async fn engine_stop(&self) -> OpResult {
        self.engine.stop().await;
        OpResult::ok()
    }

    pub async fn engine_status(&self) -> EngineStatus {
        self.engine.status().await
    }

    pub fn engine_exists(&self) -> bool {
        self.engine.exists()
    }

    pub async fn play(&self, content_id: &str) -> PlayResult {
        if let Err(e) = validate_content_id(content_id) {
            log::warn!("Rejected play request: {e}");
            return PlayResult {
                success: false,
                error: Some(e.to_string()),
                session: None,
            };
        }

        match self.client.start_playback(content_id).await {
            Ok(session) => PlayResult {
                success: true,
                error: None,
                session: Some(session),
            },
            Err(e) => PlayResult {
                success: false,
                error: Some(e.to_string()),
                session: None,
            },
        }
    }

    pub async fn stats(&self, stat_url: &str) -> StreamStats {
        if let Err(e) = validate_engine_url(stat_url, self.client.origin()) {
            log::warn!("Rejected stats request: {e}");
            return StreamStats::error();
        }
        self.client.get_stats(stat_url).await
    }

    pub async fn stop(&self, command_url: &str) -> OpResult {
        if let Err(e) = validate_engine_url(command_url, self.client.origin()) {
            log::warn!("Rejected stop request: {e}");
            return OpResult::failed(e);
        }
        match self.client.send_stop(command_url).await {
            Ok(()) => OpResult::ok(),
            Err(e) => OpResult::failed(e),
        }
    }

    pub async fn cache_size(&self) -> CacheInfo {
        let dir = self.cache_dir.clone();
        let bytes = tokio::task::spawn_blocking(move || cache::dir_size(&dir))
            .await
            .unwrap_or_else(|e| {
                log::warn!("Cache size task failed: {e}");
                0
            });
        CacheInfo {
            path: self.cache_dir.clone(),
            bytes,
        }
    }

    pub async fn cache_clear(&self) -> OpResult {
        let dir = self.cache_dir.clone();
        match tokio::task::spawn_blocking(move || cache::clear_dir(&dir)).await {
            Ok(Ok(freed)) => {
                log::info!("Cleared {freed} bytes from {}", self.cache_dir.display());
                OpResult::ok()
            }
            Ok(Err(e)) => OpResult::failed(e),
            Err(e) => OpResult::failed(e),
        }
    }
}
