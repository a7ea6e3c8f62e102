use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Top‑level configuration, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine cache directory override
    pub cache_dir: Option<PathBuf>,
    pub engine: EngineConfig,
    pub playback: PlaybackConfig,
    pub reconnect: ReconnectConfig,
    pub compat: CompatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub status_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub ready_poll_interval_ms: u64,
    pub ensure_poll_interval_ms: u64,
    /// Running from an installed bundle rather than a source checkout
    pub packaged: bool,
    pub resources_dir: Option<PathBuf>,
    pub dev_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub start_timeout_ms: u64,
    pub stats_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub stats_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub backoff_ms: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    /// Wine prefix override (defaults to `~/.acebridge-wine`)
    pub prefix: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6878,
            status_timeout_ms: 2_000,
            ready_timeout_ms: 30_000,
            ready_poll_interval_ms: 500,
            ensure_poll_interval_ms: 100,
            packaged: false,
            resources_dir: None,
            dev_dir: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 30_000,
            stats_timeout_ms: 5_000,
            stop_timeout_ms: 5_000,
            stats_interval_ms: 2_000,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: vec![3_000, 5_000, 10_000, 15_000, 30_000],
        }
    }
}

impl EngineConfig {
    /// Base URL of the engine HTTP API, always with a trailing slash.
    pub fn origin(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn ensure_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ensure_poll_interval_ms)
    }
}

impl PlaybackConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

impl Config {
    /// `http://127.0.0.1:6878/` with the default settings.
    pub fn engine_origin(&self) -> String {
        self.engine.origin()
    }

    /// Wine prefix used on platforms that need the compatibility layer.
    pub fn compat_prefix(&self) -> PathBuf {
        self.compat.prefix.clone().unwrap_or_else(default_prefix)
    }

    /// Engine cache directory, configured or platform default.
    pub fn engine_cache_dir(&self, platform: Platform) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| default_cache_dir(platform, &self.compat_prefix()))
    }

    /// Read the config at `path`, writing a default one first if it is absent.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config not found at {}, creating default configuration",
                path.display()
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let default_toml = toml::to_string_pretty(&Config::default())
                .context("Failed to serialize default config")?;
            fs::write(path, default_toml).context("Failed to write config file")?;
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(cfg)
    }
}

/// `<config dir>/acebridge/acebridge.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("acebridge").join("acebridge.toml"))
}

fn default_prefix() -> PathBuf {
    home_or_tmp().join(".acebridge-wine")
}

fn home_or_tmp() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

/// Where the engine keeps its stream cache
///
/// - Windows: %APPDATA%\ACEStream\.acestream_cache
/// - macOS: inside the Wine prefix, under the emulated user profile
/// - Linux: ~/.ACEStream/.acestream_cache
fn default_cache_dir(platform: Platform, prefix: &Path) -> PathBuf {
    match platform {
        Platform::Windows => dirs::data_dir()
            .unwrap_or_else(home_or_tmp)
            .join("ACEStream")
            .join(".acestream_cache"),
        Platform::MacOs => {
            let user = std::env::var("USER").unwrap_or_else(|_| "user".into());
            prefix
                .join("drive_c")
                .join("users")
                .join(user)
                .join("AppData")
                .join("Roaming")
                .join("ACEStream")
                .join(".acestream_cache")
        }
        Platform::Linux => home_or_tmp().join(".ACEStream").join(".acestream_cache"),
    }
}
