//! Wine supervision for running the Windows engine build on macOS.
//!
//! The engine runs inside a dedicated prefix so that its `wineserver` can be
//! killed without touching Wine instances that belong to other applications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::exec::{CommandExecutor, CommandSpec};

/// Well-known Wine install locations, checked in order.
pub const RUNTIME_SEARCH_PATHS: &[&str] = &[
    "/Applications/Wine Stable.app/Contents/Resources/wine/bin/wine",
    "/Applications/Wine Stable.app/Contents/Resources/wine/bin/wine64",
    "/Applications/Wine Devel.app/Contents/Resources/wine/bin/wine",
    "/Applications/Wine Staging.app/Contents/Resources/wine/bin/wine",
    "/opt/homebrew/bin/wine",
    "/opt/homebrew/bin/wine64",
    "/usr/local/bin/wine",
    "/usr/local/bin/wine64",
];

/// Binary names looked up in PATH when no well-known location matched.
const PATH_CANDIDATES: [&str; 2] = ["wine64", "wine"];

/// Time the server gets to exit after the graceful request.
const SERVER_GRACE: Duration = Duration::from_millis(1500);

pub struct CompatLayerSupervisor {
    executor: Arc<dyn CommandExecutor>,
    prefix: PathBuf,
    /// Engine executable name, used to scope stale-process sweeps
    engine_executable: String,
    search_paths: Vec<PathBuf>,
}

impl CompatLayerSupervisor {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        prefix: PathBuf,
        engine_executable: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            prefix,
            engine_executable: engine_executable.into(),
            search_paths: RUNTIME_SEARCH_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Replace the well-known install locations.
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Find the Wine loader: known install paths first, then PATH.
    pub fn locate_runtime(&self) -> Option<PathBuf> {
        if let Some(found) = self.search_paths.iter().find(|p| p.is_file()) {
            return Some(found.clone());
        }

        PATH_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
    }

    pub fn is_installed(&self) -> bool {
        self.locate_runtime().is_some()
    }

    /// `wine --version`, e.g. `wine-9.0`.
    pub async fn version(&self) -> Option<String> {
        let runtime = self.locate_runtime()?;
        let outcome = self.executor.run(CommandSpec::new(runtime).arg("--version")).await;
        if !outcome.success() {
            log::debug!("wine --version failed: {:?}", outcome.launch_error);
            return None;
        }
        let version = outcome.stdout.trim();
        (!version.is_empty()).then(|| version.to_string())
    }

    /// The dedicated prefix directory.
    pub fn prefix_path(&self) -> &Path {
        &self.prefix
    }

    /// Environment added to every Wine invocation made on our behalf.
    pub fn environment(&self) -> Vec<(String, String)> {
        vec![
            ("WINEPREFIX".into(), self.prefix.to_string_lossy().into_owned()),
            ("WINEDEBUG".into(), "-all".into()),
            ("WINEDLLOVERRIDES".into(), "winemenubuilder.exe=d".into()),
        ]
    }

    /// `wineserver` next to the loader, or from PATH.
    fn server_binary(&self) -> PathBuf {
        self.locate_runtime()
            .and_then(|rt| rt.parent().map(|dir| dir.join("wineserver")))
            .filter(|p| p.is_file())
            .or_else(|| which::which("wineserver").ok())
            .unwrap_or_else(|| PathBuf::from("wineserver"))
    }

    fn server_command(&self, signal_flag: &str) -> CommandSpec {
        let mut cmd = CommandSpec::new(self.server_binary()).arg(signal_flag);
        for (key, value) in self.environment() {
            cmd = cmd.env(key, value);
        }
        cmd
    }

    /// Stop the prefix's wineserver: SIGTERM, short grace period, then SIGKILL
    /// if it is still there.
    ///
    /// `wineserver -k` only addresses the server of the prefix in `WINEPREFIX`.
    pub async fn force_kill_server(&self) {
        log::info!("Stopping wineserver for prefix {}", self.prefix.display());

        let graceful = self.executor.run(self.server_command("-k15")).await;
        if !graceful.success() {
            // no server running for this prefix
            log::debug!(
                "wineserver -k15 exited with {:?} {}",
                graceful.code,
                graceful.launch_error.as_deref().unwrap_or_default()
            );
            return;
        }

        tokio::time::sleep(SERVER_GRACE).await;

        // -k9 fails when this prefix has no server left, so it doubles as the liveness check
        let forced = self.executor.run(self.server_command("-k9")).await;
        if forced.success() {
            log::warn!("wineserver survived the graceful stop, sent SIGKILL");
        } else {
            log::debug!("wineserver exited within the grace period");
        }
    }

    /// Kill engine processes left over from previous runs.
    ///
    /// Patterns are the engine executable name and the prefix path, so Wine
    /// processes serving other applications are left alone.
    pub async fn cleanup_stale_processes(&self) {
        let prefix = self.prefix.to_string_lossy().into_owned();
        for pattern in [self.engine_executable.as_str(), prefix.as_str()] {
            let outcome = self
                .executor
                .run(CommandSpec::new("pkill").args(["-9", "-f", pattern]))
                .await;
            match outcome.code {
                Some(0) => log::info!("Killed stale processes matching '{pattern}'"),
                Some(1) => log::debug!("No stale processes matching '{pattern}'"),
                _ => log::debug!(
                    "pkill '{pattern}' did not succeed: {}",
                    outcome.launch_error.as_deref().unwrap_or(outcome.stderr.trim())
                ),
            }
        }
    }
}
