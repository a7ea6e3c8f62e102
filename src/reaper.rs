//! Best-effort termination of a whole process tree.
//!
//! - Windows: `taskkill /pid <pid> /T /F` kills the root and every descendant.
//! - Unix: children are discovered with `pgrep -P`, killed bottom-up with
//!   `kill -9`, and the root goes last.
//!
//! Nothing here ever fails: a process that is already gone is the expected
//! case during shutdown.

use std::sync::Arc;

use async_recursion::async_recursion;

use crate::exec::{CommandExecutor, CommandSpec};
use crate::platform::Platform;

#[derive(Clone)]
pub struct ProcessTreeReaper {
    executor: Arc<dyn CommandExecutor>,
    platform: Platform,
}

impl ProcessTreeReaper {
    pub fn new(executor: Arc<dyn CommandExecutor>, platform: Platform) -> Self {
        Self { executor, platform }
    }

    /// Kill `root` and all of its descendants.
    pub async fn kill_tree(&self, root: u32) {
        if root == 0 {
            log::warn!("Refusing to kill process tree rooted at pid 0");
            return;
        }

        match self.platform {
            Platform::Windows => self.kill_tree_windows(root).await,
            Platform::MacOs | Platform::Linux => {
                log::debug!("Killing process tree rooted at {root}");
                self.kill_descendants(root).await;
                self.kill_one(root).await;
            }
        }
    }

    async fn kill_tree_windows(&self, root: u32) {
        let outcome = self
            .executor
            .run(CommandSpec::new("taskkill").args(["/pid", root.to_string().as_str(), "/T", "/F"]))
            .await;
        if !outcome.success() {
            // 128: process not found
            log::debug!(
                "taskkill for pid {root} exited with {:?}: {}",
                outcome.code,
                outcome.stderr.trim()
            );
        }
    }

    /// Depth-first: every child's subtree is gone before the child itself.
    #[async_recursion]
    async fn kill_descendants(&self, pid: u32) {
        for child in self.list_children(pid).await {
            self.kill_descendants(child).await;
            self.kill_one(child).await;
        }
    }

    async fn list_children(&self, pid: u32) -> Vec<u32> {
        let outcome = self
            .executor
            .run(CommandSpec::new("pgrep").args(["-P", pid.to_string().as_str()]))
            .await;

        // pgrep exits 1 when nothing matched
        if let Some(err) = &outcome.launch_error {
            log::debug!("Could not list children of {pid}: {err}");
            return Vec::new();
        }

        parse_pids(&outcome.stdout)
    }

    async fn kill_one(&self, pid: u32) {
        let outcome = self
            .executor
            .run(CommandSpec::new("kill").args(["-9", pid.to_string().as_str()]))
            .await;
        if outcome.success() {
            log::debug!("Killed pid {pid}");
        } else if outcome.stderr.contains("No such process") {
            log::debug!("pid {pid} already exited");
        } else {
            log::debug!(
                "kill -9 {pid} did not succeed (code {:?}): {}",
                outcome.code,
                outcome
                    .launch_error
                    .as_deref()
                    .unwrap_or_else(|| outcome.stderr.trim())
            );
        }
    }
}

/// One pid per line, anything unparsable ignored.
pub(crate) fn parse_pids(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_pids;

    #[test]
    fn parse_pids_skips_noise() {
        assert_eq!(parse_pids("12\n 34 \n\nabc\n0\n"), vec![12, 34]);
        assert!(parse_pids("").is_empty());
    }
}
