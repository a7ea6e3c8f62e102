//! Command execution seam used by every cleanup path.
//!
//! Process sweeps and kills are expressed as [`CommandSpec`]s handed to a
//! [`CommandExecutor`]. The system executor runs them through the OS; tests
//! inject recording executors instead.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Upper bound for a single external command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Windows: do not flash a console window for helper commands.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Program file name without directories (`pkill`, `taskkill`, ...).
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of one command invocation. Never an error: failure is data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` when killed by a signal or never started.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the command could not be started at all or timed out.
    pub launch_error: Option<String>,
}

impl CommandOutcome {
    pub fn exited(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            launch_error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.launch_error.is_none() && self.code == Some(0)
    }
}

/// Runs external commands on behalf of the supervisor.
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion and report its outcome.
    fn run(&self, cmd: CommandSpec) -> BoxFuture<'static, CommandOutcome>;

    /// Fire-and-forget: start the command and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    fn fire(&self, cmd: CommandSpec) {
        let label = cmd.to_string();
        let fut = self.run(cmd);
        tokio::spawn(async move {
            let outcome = fut.await;
            if !outcome.success() {
                log::debug!(
                    "background command `{label}` did not succeed (code {:?}, {})",
                    outcome.code,
                    outcome
                        .launch_error
                        .as_deref()
                        .unwrap_or_else(|| outcome.stderr.trim())
                );
            }
        });
    }
}

/// Executor backed by real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn run(&self, cmd: CommandSpec) -> BoxFuture<'static, CommandOutcome> {
        async move {
            let mut command = tokio::process::Command::new(&cmd.program);
            command
                .args(&cmd.args)
                .envs(cmd.envs.iter().map(|(k, v)| (k, v)))
                .stdin(std::process::Stdio::null())
                .kill_on_drop(true);

            #[cfg(windows)]
            command.creation_flags(CREATE_NO_WINDOW);

            match tokio::time::timeout(COMMAND_TIMEOUT, command.output()).await {
                Ok(Ok(output)) => CommandOutcome {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    launch_error: None,
                },
                Ok(Err(e)) => CommandOutcome::not_run(format!("failed to run {}: {e}", cmd.program_name())),
                Err(_) => CommandOutcome::not_run(format!(
                    "{} timed out after {}s",
                    cmd.program_name(),
                    COMMAND_TIMEOUT.as_secs()
                )),
            }
        }
        .boxed()
    }
}
