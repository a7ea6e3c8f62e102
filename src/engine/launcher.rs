//! Spawning the engine child process.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use super::output::{EngineOutput, OutputHub};

/// Everything needed to start the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub envs: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

/// A freshly spawned engine.
pub struct LaunchedEngine {
    pub pid: Option<u32>,
    /// Resolves with the exit code once the process is gone.
    pub exited: oneshot::Receiver<Option<i32>>,
}

/// Starts engine processes. The manager never spawns directly.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec, output: OutputHub) -> io::Result<LaunchedEngine>;
}

/// Launcher backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl EngineLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec, output: OutputHub) -> io::Result<LaunchedEngine> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.envs.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(windows)]
        cmd.creation_flags(0x0800_0000); // CREATE_NO_WINDOW

        let mut child = cmd.spawn()?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            let hub = output.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.is_empty() {
                        log::info!("[engine] {line}");
                        hub.publish(EngineOutput::Stdout(line));
                    }
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let hub = output.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.is_empty() {
                        log::warn!("[engine] {line}");
                        hub.publish(EngineOutput::Stderr(line));
                    }
                }
            });
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    log::error!("Failed to wait for engine process: {e}");
                    None
                }
            };
            output.publish(EngineOutput::Exited { code });
            let _ = exit_tx.send(code);
        });

        Ok(LaunchedEngine { pid, exited: exit_rx })
    }
}
