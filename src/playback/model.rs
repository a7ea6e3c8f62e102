//! Playback session and stream statistics as exposed to the UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifiers and URLs of one active stream, as returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub playback_url: String,
    pub stat_url: String,
    pub command_url: String,
    pub event_url: String,
    /// Content id the session was requested with (40 hex chars)
    pub content_id: String,
    pub infohash: String,
    pub session_id: String,
    pub is_live: bool,
}

/// Engine download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Pre-buffering / starting up
    Starting,
    Downloading,
    Checking,
    Idle,
    Error,
    Unknown,
}

impl StreamStatus {
    pub fn from_engine(raw: &str) -> Self {
        match raw {
            "prebuf" | "buf" | "starting" => StreamStatus::Starting,
            "dl" => StreamStatus::Downloading,
            "check" => StreamStatus::Checking,
            "idle" => StreamStatus::Idle,
            "err" | "error" => StreamStatus::Error,
            _ => StreamStatus::Unknown,
        }
    }
}

/// One stats sample. Speeds are bytes per second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub status: StreamStatus,
    pub peers: u32,
    pub speed_down: u64,
    pub speed_up: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub is_live: bool,
}

impl StreamStats {
    /// Stand-in for a sample that could not be fetched or parsed.
    pub fn error() -> Self {
        Self {
            status: StreamStatus::Error,
            peers: 0,
            speed_down: 0,
            speed_up: 0,
            downloaded: 0,
            uploaded: 0,
            is_live: false,
        }
    }

    /// Data is flowing from at least one peer.
    pub fn is_healthy(&self) -> bool {
        self.status == StreamStatus::Downloading && self.peers > 0
    }

    /// Downloading state without any peer or traffic yet.
    pub fn is_searching(&self) -> bool {
        self.status == StreamStatus::Downloading && self.peers == 0 && self.speed_down == 0
    }
}

/// `{ response: {...}, error: "..." }`, the envelope of every engine reply.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub response: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawManifest {
    pub playback_url: String,
    pub stat_url: String,
    pub command_url: String,
    #[serde(default)]
    pub event_url: Option<String>,
    #[serde(default)]
    pub infohash: Option<String>,
    pub playback_session_id: String,
    #[serde(default)]
    pub is_live: Value,
}

impl RawManifest {
    pub fn into_session(self, content_id: &str) -> PlaybackSession {
        PlaybackSession {
            playback_url: self.playback_url,
            stat_url: self.stat_url,
            command_url: self.command_url,
            event_url: self.event_url.unwrap_or_default(),
            content_id: content_id.to_string(),
            infohash: self.infohash.unwrap_or_default(),
            session_id: self.playback_session_id,
            is_live: truthy(&self.is_live),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStats {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub peers: Option<f64>,
    /// KB/s
    #[serde(default)]
    pub speed_down: Option<f64>,
    /// KB/s
    #[serde(default)]
    pub speed_up: Option<f64>,
    #[serde(default)]
    pub downloaded: Option<f64>,
    #[serde(default)]
    pub uploaded: Option<f64>,
    #[serde(default)]
    pub is_live: Value,
}

impl From<RawStats> for StreamStats {
    fn from(raw: RawStats) -> Self {
        StreamStats {
            status: raw
                .status
                .as_deref()
                .map_or(StreamStatus::Unknown, StreamStatus::from_engine),
            peers: non_negative(raw.peers) as u32,
            speed_down: kib_to_bytes(raw.speed_down),
            speed_up: kib_to_bytes(raw.speed_up),
            downloaded: non_negative(raw.downloaded) as u64,
            uploaded: non_negative(raw.uploaded) as u64,
            is_live: truthy(&raw.is_live),
        }
    }
}

fn non_negative(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite() && *x > 0.0).unwrap_or(0.0)
}

fn kib_to_bytes(v: Option<f64>) -> u64 {
    (non_negative(v) * 1024.0).round() as u64
}

/// The engine sends flags as `1`/`0` or as booleans.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    }
}
