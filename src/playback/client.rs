//! HTTP client for the engine's per-stream endpoints.

use std::time::Duration;

use url::Url;

use super::model::{Envelope, PlaybackSession, RawManifest, RawStats, StreamStats};
use crate::config::Config;
use crate::engine::local_client;
use crate::error::PlaybackError;

/// URI scheme some content links carry in front of the content id.
const CONTENT_SCHEME: &str = "acestream://";

#[derive(Debug, Clone)]
pub struct PlaybackSessionClient {
    http: reqwest::Client,
    origin: String,
    start_timeout: Duration,
    stats_timeout: Duration,
    stop_timeout: Duration,
}

impl PlaybackSessionClient {
    pub fn new(config: &Config) -> Self {
        Self::with_client(local_client(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            origin: config.engine_origin(),
            start_timeout: config.playback.start_timeout(),
            stats_timeout: config.playback.stats_timeout(),
            stop_timeout: config.playback.stop_timeout(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Ask the engine for a new session on `content_id`.
    ///
    /// Engine-reported errors come back as [`PlaybackError::Engine`] with the
    /// engine's own message.
    pub async fn start_playback(&self, content_id: &str) -> Result<PlaybackSession, PlaybackError> {
        let content_id = content_id.trim();
        let content_id = content_id.strip_prefix(CONTENT_SCHEME).unwrap_or(content_id);

        let url = Url::parse_with_params(
            &format!("{}ace/manifest.m3u8", self.origin),
            [("content_id", content_id), ("format", "json")],
        )
        .map_err(|e| PlaybackError::InvalidUrl(e.to_string()))?;

        log::info!("Starting playback of {content_id}");
        let response = self
            .http
            .get(url)
            .timeout(self.start_timeout)
            .send()
            .await?;
        let http_status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<RawManifest> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !http_status.is_success() => {
                return Err(PlaybackError::Transport(format!(
                    "manifest request returned {http_status}"
                )));
            }
            Err(e) => return Err(PlaybackError::Malformed(e.to_string())),
        };

        if let Some(message) = envelope.error.filter(|m| !m.is_empty()) {
            log::warn!("Engine refused {content_id}: {message}");
            return Err(PlaybackError::Engine(message));
        }

        let manifest = envelope
            .response
            .ok_or_else(|| PlaybackError::Malformed("manifest response is empty".into()))?;
        let session = manifest.into_session(content_id);
        log::info!(
            "Playback session {} started (live: {})",
            session.session_id,
            session.is_live
        );
        Ok(session)
    }

    /// Fetch one stats sample. Every failure yields [`StreamStats::error`].
    pub async fn get_stats(&self, stat_url: &str) -> StreamStats {
        match self.fetch_stats(stat_url).await {
            Ok(stats) => stats,
            Err(e) => {
                log::debug!("Stats unavailable: {e}");
                StreamStats::error()
            }
        }
    }

    async fn fetch_stats(&self, stat_url: &str) -> Result<StreamStats, PlaybackError> {
        let envelope: Envelope<RawStats> = self
            .http
            .get(stat_url)
            .timeout(self.stats_timeout)
            .send()
            .await?
            .json()
            .await?;

        match envelope.response {
            Some(raw) => Ok(raw.into()),
            None => Err(PlaybackError::Engine(
                envelope.error.unwrap_or_else(|| "empty stats response".into()),
            )),
        }
    }

    /// Send `method=stop` to a session's command URL and report the outcome.
    pub async fn send_stop(&self, command_url: &str) -> Result<(), PlaybackError> {
        let mut url =
            Url::parse(command_url).map_err(|e| PlaybackError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("method", "stop");

        let response = self
            .http
            .get(url)
            .timeout(self.stop_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlaybackError::Transport(format!(
                "stop command returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Best-effort stop: failures are logged, never returned.
    pub async fn stop_playback(&self, command_url: &str) {
        match self.send_stop(command_url).await {
            Ok(()) => log::info!("Playback stopped"),
            Err(e) => log::warn!("Failed to stop playback: {e}"),
        }
    }
}
