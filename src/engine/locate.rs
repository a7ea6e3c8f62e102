//! Engine executable location and command line.

use std::env;
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::platform::Platform;

/// Resolves `engine/<platform folder>/<executable>` under the right root.
#[derive(Debug, Clone)]
pub struct EngineLocator {
    platform: Platform,
    packaged: bool,
    resources_dir: Option<PathBuf>,
    dev_dir: Option<PathBuf>,
}

impl EngineLocator {
    pub fn new(cfg: &EngineConfig, platform: Platform) -> Self {
        Self {
            platform,
            packaged: cfg.packaged,
            resources_dir: cfg.resources_dir.clone(),
            dev_dir: cfg.dev_dir.clone(),
        }
    }

    /// Root that contains the `engine/` folder.
    ///
    /// Packaged builds read from the bundle resources next to the executable
    /// (`Contents/Resources` inside a macOS app). Development builds read from
    /// the working directory.
    fn root(&self) -> PathBuf {
        if self.packaged {
            if let Some(dir) = &self.resources_dir {
                return dir.clone();
            }
            if let Some(exe_dir) = env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            {
                return match self.platform {
                    Platform::MacOs => exe_dir
                        .parent()
                        .map(|contents| contents.join("Resources"))
                        .unwrap_or(exe_dir),
                    Platform::Windows | Platform::Linux => exe_dir.join("resources"),
                };
            }
        }

        if let Some(dir) = &self.dev_dir {
            return dir.clone();
        }
        env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    pub fn engine_dir(&self) -> PathBuf {
        self.root()
            .join("engine")
            .join(self.platform.engine_folder())
    }

    pub fn executable(&self) -> PathBuf {
        self.engine_dir().join(self.platform.engine_executable())
    }
}

/// Fixed engine arguments: console client, HTTP API port, logs on stdout.
pub fn engine_args(port: u16) -> Vec<String> {
    vec![
        "--client-console".into(),
        "--http-port".into(),
        port.to_string(),
        "--log-stdout".into(),
        "--log-stdout-level".into(),
        "info".into(),
    ]
}
