//! Playback sessions on the engine's HTTP API.

mod client;
mod model;

pub use client::PlaybackSessionClient;
pub use model::{PlaybackSession, StreamStats, StreamStatus};
