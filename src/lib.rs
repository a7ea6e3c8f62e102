//! Supervisor and reconnecting session driver for a local P2P streaming engine.
//!
//! The engine is an external process exposing an HTTP API on
//! `127.0.0.1:6878`. [`engine::EngineProcessManager`] owns its lifecycle,
//! [`playback::PlaybackSessionClient`] talks to it, and
//! [`reconnect::ReconnectController`] restarts failing streams.

pub mod bridge;
pub mod cache;
pub mod compat;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod monitor;
pub mod platform;
pub mod playback;
pub mod reaper;
pub mod reconnect;
pub mod signals;
pub mod task;
