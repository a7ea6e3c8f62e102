//! Engine process lifecycle: Stopped → Starting → Running → Stopped.
//!
//! Start requests are coalesced: while one attempt is in flight every caller
//! awaits the same shared outcome, so the engine is never spawned twice.
//! Stop is a three-step cleanup (tree kill, process-name sweep, wineserver
//! kill); each step runs regardless of what the previous one achieved.

use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{sleep, Instant};

use super::launcher::{EngineLauncher, LaunchSpec, SystemLauncher};
use super::locate::{engine_args, EngineLocator};
use super::output::{OutputHub, OutputSubscription};
use super::status::{local_client, probe, EngineStatus};
use crate::compat::CompatLayerSupervisor;
use crate::config::{Config, EngineConfig};
use crate::error::EngineError;
use crate::exec::{CommandExecutor, CommandSpec, SystemExecutor};
use crate::platform::Platform;
use crate::reaper::ProcessTreeReaper;

type StartOutcome = Shared<BoxFuture<'static, Result<(), EngineError>>>;

/// Lifecycle phase as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
}

/// The single supervised child. Only touched under the manager's lock.
#[derive(Default)]
struct EngineHandle {
    pid: Option<u32>,
    /// Bumped on every spawn so stale exit notifications are ignored
    generation: u64,
    alive: bool,
    starting: bool,
    /// Bumped by every stop; a start begun under an older value is void
    stops: u64,
    in_flight: Option<StartOutcome>,
}

struct Inner {
    config: EngineConfig,
    platform: Platform,
    locator: EngineLocator,
    http: reqwest::Client,
    launcher: Arc<dyn EngineLauncher>,
    executor: Arc<dyn CommandExecutor>,
    reaper: ProcessTreeReaper,
    compat: CompatLayerSupervisor,
    handle: Mutex<EngineHandle>,
    output: OutputHub,
}

/// Owns the engine child process. Cheap to clone; clones share one handle.
#[derive(Clone)]
pub struct EngineProcessManager {
    inner: Arc<Inner>,
}

impl EngineProcessManager {
    /// Manager that spawns real processes and runs real cleanup commands.
    pub fn new(config: &Config, platform: Platform) -> Self {
        Self::with_parts(
            config,
            platform,
            Arc::new(SystemLauncher),
            Arc::new(SystemExecutor),
        )
    }

    pub fn with_parts(
        config: &Config,
        platform: Platform,
        launcher: Arc<dyn EngineLauncher>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let compat = CompatLayerSupervisor::new(
            Arc::clone(&executor),
            config.compat_prefix(),
            platform.engine_executable(),
        );
        Self::with_compat(config, platform, launcher, executor, compat)
    }

    /// Full injection, including a preconfigured Wine supervisor.
    pub fn with_compat(
        config: &Config,
        platform: Platform,
        launcher: Arc<dyn EngineLauncher>,
        executor: Arc<dyn CommandExecutor>,
        compat: CompatLayerSupervisor,
    ) -> Self {
        let inner = Inner {
            config: config.engine.clone(),
            platform,
            locator: EngineLocator::new(&config.engine, platform),
            http: local_client(),
            launcher,
            reaper: ProcessTreeReaper::new(Arc::clone(&executor), platform),
            executor,
            compat,
            handle: Mutex::new(EngineHandle::default()),
            output: OutputHub::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    pub fn compat(&self) -> &CompatLayerSupervisor {
        &self.inner.compat
    }

    /// Subscribe to engine stdout/stderr lines and exit notifications.
    pub fn subscribe_output(&self) -> OutputSubscription {
        self.inner.output.subscribe()
    }

    /// Probe the engine HTTP API. Never fails.
    pub async fn status(&self) -> EngineStatus {
        self.inner.probe().await
    }

    /// Whether the engine executable is present for this platform.
    pub fn exists(&self) -> bool {
        self.inner.locator.executable().is_file()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.inner.handle.lock().await.pid
    }

    pub async fn is_starting(&self) -> bool {
        self.inner.handle.lock().await.starting
    }

    pub async fn state(&self) -> EngineState {
        let handle = self.inner.handle.lock().await;
        if handle.starting {
            EngineState::Starting
        } else if handle.alive {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    /// Start the engine, or join the start already in progress.
    pub async fn start(&self) -> Result<(), EngineError> {
        let outcome = {
            let mut handle = self.inner.handle.lock().await;
            match &handle.in_flight {
                Some(pending) => {
                    log::debug!("Engine start already in progress, joining it");
                    pending.clone()
                }
                None => {
                    handle.starting = true;
                    let outcome = Inner::spawn_start(Arc::clone(&self.inner), handle.stops);
                    handle.in_flight = Some(outcome.clone());
                    outcome
                }
            }
        };
        outcome.await
    }

    /// Make sure the engine answers, starting it when needed.
    pub async fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_starting().await {
            let deadline = Instant::now() + self.inner.config.ready_timeout();
            while self.is_starting().await && Instant::now() < deadline {
                sleep(self.inner.config.ensure_poll_interval()).await;
            }
        }

        if self.status().await.running {
            return Ok(());
        }
        self.start().await
    }

    /// Tear everything down. Best-effort, never fails.
    pub async fn stop(&self) {
        let pid = {
            let mut handle = self.inner.handle.lock().await;
            handle.stops += 1;
            handle.alive = false;
            handle.pid.take()
        };

        match pid {
            Some(pid) => {
                log::info!("Stopping engine (pid {pid})");
                self.inner.reaper.kill_tree(pid).await;
            }
            None => log::debug!("No live engine handle, running fallback cleanup only"),
        }

        self.inner.sweep_engine_processes();

        if self.inner.platform.needs_compat_layer() {
            self.inner.compat.force_kill_server().await;
        }
    }
}

fn stopped_during_start() -> EngineError {
    EngineError::StartAborted("engine stopped while starting".into())
}

impl Inner {
    async fn probe(&self) -> EngineStatus {
        probe(&self.http, &self.config.origin(), self.config.status_timeout()).await
    }

    /// Run one start attempt on its own task so it completes even if every
    /// caller stops waiting.
    fn spawn_start(inner: Arc<Inner>, stops: u64) -> StartOutcome {
        let task = tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                let result = Arc::clone(&inner).start_attempt(stops).await;
                let mut handle = inner.handle.lock().await;
                handle.starting = false;
                handle.in_flight = None;
                result
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let mut handle = inner.handle.lock().await;
                    handle.starting = false;
                    handle.in_flight = None;
                    Err(EngineError::StartAborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn start_attempt(self: Arc<Self>, stops: u64) -> Result<(), EngineError> {
        let status = self.probe().await;
        if status.running {
            log::info!(
                "Engine already running (version {})",
                status.version.as_deref().unwrap_or("unknown")
            );
            return Ok(());
        }

        let spec = self.launch_spec()?;

        if self.platform.needs_compat_layer() {
            self.compat.cleanup_stale_processes().await;
        }

        log::info!(
            "Starting engine: {} {}",
            spec.program.display(),
            spec.args.join(" ")
        );

        // held across the spawn: a concurrent stop() sees either no child or this one
        let mut handle = self.handle.lock().await;
        if handle.stops != stops {
            log::info!("Engine stop requested during start, not spawning");
            return Err(stopped_during_start());
        }

        let launched = self.launcher.launch(&spec, self.output.clone()).map_err(|e| {
            EngineError::Spawn(format!("{}: {e}", spec.program.display()))
        })?;

        handle.generation += 1;
        handle.pid = launched.pid;
        handle.alive = true;
        let generation = handle.generation;
        drop(handle);

        log::info!(
            "Engine spawned (PID: {})",
            launched
                .pid
                .map_or_else(|| "unavailable".to_string(), |p| p.to_string())
        );
        Arc::clone(&self).watch_exit(generation, launched.exited);

        let ready = self.wait_until_ready(generation).await;
        // stop() owns the teardown of a child it saw
        let stopped = self.handle.lock().await.stops != stops;
        match ready {
            _ if stopped => {
                log::info!("Engine start cancelled by stop");
                Err(stopped_during_start())
            }
            Ok(status) => {
                log::info!(
                    "Engine ready (version {}, platform {})",
                    status.version.as_deref().unwrap_or("unknown"),
                    status.platform.as_deref().unwrap_or("unknown")
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Engine failed to start: {e}");
                let pid = {
                    let mut handle = self.handle.lock().await;
                    if handle.generation == generation {
                        handle.alive = false;
                        handle.pid.take()
                    } else {
                        None
                    }
                };
                if let Some(pid) = pid {
                    self.reaper.kill_tree(pid).await;
                }
                Err(e)
            }
        }
    }

    fn launch_spec(&self) -> Result<LaunchSpec, EngineError> {
        let executable = self.locator.executable();
        if !executable.is_file() {
            return Err(EngineError::ExecutableMissing(executable));
        }

        let working_dir = executable.parent().map(|p| p.to_path_buf());
        let engine_args = engine_args(self.config.port);

        if self.platform.needs_compat_layer() {
            let runtime = self
                .compat
                .locate_runtime()
                .ok_or(EngineError::CompatLayerMissing)?;
            let mut args = vec![executable.to_string_lossy().into_owned()];
            args.extend(engine_args);
            Ok(LaunchSpec {
                program: runtime,
                args,
                envs: self.compat.environment(),
                working_dir,
            })
        } else {
            Ok(LaunchSpec {
                program: executable,
                args: engine_args,
                envs: Vec::new(),
                working_dir,
            })
        }
    }

    /// Poll the status endpoint until it reports a version.
    async fn wait_until_ready(&self, generation: u64) -> Result<EngineStatus, EngineError> {
        let timeout = self.config.ready_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            let status = self.probe().await;
            if status.running {
                return Ok(status);
            }

            {
                let handle = self.handle.lock().await;
                if handle.generation == generation && !handle.alive {
                    return Err(EngineError::StartAborted(
                        "engine exited before becoming ready".into(),
                    ));
                }
            }

            if Instant::now() >= deadline {
                return Err(EngineError::ReadyTimeout(timeout));
            }
            sleep(self.config.ready_poll_interval()).await;
        }
    }

    fn watch_exit(self: Arc<Self>, generation: u64, exited: oneshot::Receiver<Option<i32>>) {
        tokio::spawn(async move {
            let code = exited.await.unwrap_or(None);
            let mut handle = self.handle.lock().await;
            if handle.generation == generation && handle.alive {
                log::info!("Engine process exited (code {code:?})");
                handle.pid = None;
                handle.alive = false;
            }
        });
    }

    /// One fire-and-forget command matching every known engine process name.
    fn sweep_engine_processes(&self) {
        let names = self.platform.engine_process_names();
        let cmd = match self.platform {
            Platform::Windows => {
                let mut cmd = CommandSpec::new("taskkill").args(["/F", "/T"]);
                for name in names {
                    cmd = cmd.args(["/IM", *name]);
                }
                cmd
            }
            Platform::MacOs | Platform::Linux => {
                let pattern = names.join("|");
                CommandSpec::new("pkill").args(["-9", "-f", pattern.as_str()])
            }
        };
        log::debug!("Sweeping stray engine processes: {cmd}");
        self.executor.fire(cmd);
    }
}
