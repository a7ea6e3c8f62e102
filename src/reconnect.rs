//! Automatic stream reconnection.
//!
//! Every stats sample goes through [`ReconnectController::observe`]. An error
//! sample arms a single backoff timer; when it fires the session is stopped
//! and started again on the same content id. Attempts are capped; a healthy
//! sample (downloading with peers) forgives earlier attempts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ReconnectConfig;
use crate::engine::EngineProcessManager;
use crate::error::PlaybackError;
use crate::playback::{PlaybackSession, PlaybackSessionClient, StreamStats, StreamStatus};

/// Attempt cap plus the increasing delay schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    schedule: Vec<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, schedule: Vec<Duration>) -> Self {
        Self {
            max_attempts,
            schedule,
        }
    }

    pub fn from_config(cfg: &ReconnectConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            cfg.backoff_ms.iter().copied().map(Duration::from_millis).collect(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt number `attempt` (0-based), clamped to the last entry.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.schedule.len().saturating_sub(1));
        self.schedule.get(idx).copied().unwrap_or_default()
    }
}

/// What the UI needs to show while reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectSnapshot {
    pub attempts: u32,
    pub max_attempts: u32,
    pub retry_scheduled: bool,
    /// Cap reached; no further automatic restarts
    pub exhausted: bool,
}

/// What a single sample caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Nothing to do
    Ignored,
    Scheduled(Duration),
    AlreadyScheduled,
    Exhausted,
    /// Attempt counter was reset by a healthy sample
    Recovered,
}

/// The stream currently shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStream {
    pub title: Option<String>,
    pub session: PlaybackSession,
}

/// The two halves of a restart, injected into the controller.
pub trait SessionRestarter: Send + Sync {
    /// Best-effort; never fails.
    fn stop(&self, command_url: String) -> BoxFuture<'static, ()>;

    fn start(&self, content_id: String) -> BoxFuture<'static, Result<PlaybackSession, PlaybackError>>;
}

impl SessionRestarter for PlaybackSessionClient {
    fn stop(&self, command_url: String) -> BoxFuture<'static, ()> {
        let client = self.clone();
        async move { client.stop_playback(&command_url).await }.boxed()
    }

    fn start(&self, content_id: String) -> BoxFuture<'static, Result<PlaybackSession, PlaybackError>> {
        let client = self.clone();
        async move { client.start_playback(&content_id).await }.boxed()
    }
}

/// Restarter that also brings the engine back if it died.
#[derive(Clone)]
pub struct EngineRestarter {
    engine: EngineProcessManager,
    client: PlaybackSessionClient,
}

impl EngineRestarter {
    pub fn new(engine: EngineProcessManager, client: PlaybackSessionClient) -> Self {
        Self { engine, client }
    }
}

impl SessionRestarter for EngineRestarter {
    fn stop(&self, command_url: String) -> BoxFuture<'static, ()> {
        SessionRestarter::stop(&self.client, command_url)
    }

    fn start(&self, content_id: String) -> BoxFuture<'static, Result<PlaybackSession, PlaybackError>> {
        let engine = self.engine.clone();
        let client = self.client.clone();
        async move {
            engine
                .ensure_running()
                .await
                .map_err(|e| PlaybackError::Engine(e.to_string()))?;
            client.start_playback(&content_id).await
        }
        .boxed()
    }
}

#[derive(Default)]
struct ReconnectState {
    attempts: u32,
    retry_scheduled: bool,
    /// The backoff timer; cleared once the restart itself begins
    pending: Option<JoinHandle<()>>,
    /// Bumped on every reset so a late retry cannot touch a newer session
    epoch: u64,
}

struct Inner {
    policy: BackoffPolicy,
    restarter: Arc<dyn SessionRestarter>,
    session: watch::Sender<Option<ActiveStream>>,
    state: Mutex<ReconnectState>,
}

/// Owns the active stream slot and the retry state machine.
#[derive(Clone)]
pub struct ReconnectController {
    inner: Arc<Inner>,
}

impl ReconnectController {
    pub fn new(policy: BackoffPolicy, restarter: Arc<dyn SessionRestarter>) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                policy,
                restarter,
                session,
                state: Mutex::new(ReconnectState::default()),
            }),
        }
    }

    /// The user started a stream: fresh retry budget.
    pub fn begin(&self, stream: ActiveStream) {
        self.reset();
        self.inner.session.send_replace(Some(stream));
    }

    /// The user stopped the stream. Returns it so the caller can stop it on the engine.
    pub fn end(&self) -> Option<ActiveStream> {
        self.reset();
        self.inner.session.send_replace(None)
    }

    pub fn session(&self) -> Option<ActiveStream> {
        self.inner.session.borrow().clone()
    }

    /// Watch wholesale replacements of the active stream.
    pub fn subscribe_session(&self) -> watch::Receiver<Option<ActiveStream>> {
        self.inner.session.subscribe()
    }

    /// Cancel any pending retry and forget all attempts.
    ///
    /// A restart already past its timer is left to finish; the epoch bump
    /// makes it stop whatever session it produced.
    pub fn reset(&self) {
        let mut state = self.inner.lock_state();
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.retry_scheduled = false;
        state.attempts = 0;
        state.epoch += 1;
    }

    pub fn snapshot(&self) -> ReconnectSnapshot {
        let state = self.inner.lock_state();
        let max_attempts = self.inner.policy.max_attempts();
        ReconnectSnapshot {
            attempts: state.attempts,
            max_attempts,
            retry_scheduled: state.retry_scheduled,
            exhausted: state.attempts >= max_attempts,
        }
    }

    /// Feed one stats sample. Must be called from within a Tokio runtime.
    pub fn observe(&self, stats: &StreamStats) -> Observation {
        let mut state = self.inner.lock_state();

        if stats.is_healthy() {
            if state.attempts > 0 {
                log::info!("Stream recovered, resetting {} reconnect attempts", state.attempts);
                state.attempts = 0;
                return Observation::Recovered;
            }
            return Observation::Ignored;
        }

        if stats.status != StreamStatus::Error {
            return Observation::Ignored;
        }
        if state.retry_scheduled {
            return Observation::AlreadyScheduled;
        }
        if state.attempts >= self.inner.policy.max_attempts() {
            log::debug!("Reconnect attempts exhausted ({})", state.attempts);
            return Observation::Exhausted;
        }
        if self.inner.session.borrow().is_none() {
            return Observation::Ignored;
        }

        let delay = self.inner.policy.delay_for(state.attempts);
        log::info!(
            "Stream error, reconnecting in {}s (attempt {}/{})",
            delay.as_secs(),
            state.attempts + 1,
            self.inner.policy.max_attempts()
        );
        state.retry_scheduled = true;
        let epoch = state.epoch;
        let inner = Arc::clone(&self.inner);
        state.pending = Some(tokio::spawn(inner.retry_after(delay, epoch)));
        Observation::Scheduled(delay)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ReconnectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn retry_after(self: Arc<Self>, delay: Duration, epoch: u64) {
        tokio::time::sleep(delay).await;

        let active = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                return;
            }
            // past this point reset() no longer aborts the task
            state.pending = None;
            let active = self.session.borrow().clone();
            if active.is_none() {
                state.retry_scheduled = false;
            }
            active
        };
        let Some(active) = active else {
            return;
        };

        // stop must complete before start so two sessions never share the engine
        self.restarter.stop(active.session.command_url.clone()).await;
        if self.lock_state().epoch != epoch {
            log::debug!("Stream changed while stopping the old session, skipping restart");
            return;
        }
        let result = self.restarter.start(active.session.content_id.clone()).await;

        let stale = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                true
            } else {
                state.attempts += 1;
                state.retry_scheduled = false;
                match &result {
                    Ok(session) => log::info!(
                        "Reconnected (attempt {}/{}), new session {}",
                        state.attempts,
                        self.policy.max_attempts(),
                        session.session_id
                    ),
                    Err(e) => log::warn!(
                        "Reconnect attempt {}/{} failed: {e}",
                        state.attempts,
                        self.policy.max_attempts()
                    ),
                }
                false
            }
        };

        match result {
            Ok(session) if stale => {
                log::info!(
                    "Stream was closed or replaced while restarting, stopping session {}",
                    session.session_id
                );
                self.restarter.stop(session.command_url).await;
            }
            Ok(session) => {
                self.session.send_replace(Some(ActiveStream {
                    title: active.title,
                    session,
                }));
            }
            Err(_) => {}
        }
    }
}
