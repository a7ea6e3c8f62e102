use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "acebridge: local streaming engine supervisor")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Control the engine process
    Engine {
        #[command(subcommand)]
        action: EngineCmd,
    },
    /// Play a stream until interrupted, reconnecting on errors
    Play {
        /// 40-character hex content id
        content_id: String,

        /// Display name for status lines
        #[arg(long)]
        title: Option<String>,
    },
    /// Wine compatibility layer (macOS)
    Compat {
        #[command(subcommand)]
        action: CompatCmd,
    },
    /// Engine cache directory
    Cache {
        #[command(subcommand)]
        action: CacheCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum EngineCmd {
    /// Start the engine and wait until it answers (Exit 0 = success, 1 = failed)
    Start,
    /// Stop the engine and sweep leftover processes
    Stop,
    /// Probe the engine (Exit 0 = running, 1 = not running)
    Status,
    /// Check the engine executable is present (Exit 0 = present, 1 = missing)
    Exists,
}

#[derive(Subcommand, Debug)]
pub enum CompatCmd {
    /// Show Wine location, version and prefix
    Status,
    /// Kill the prefix's wineserver
    KillServer,
    /// Kill stale engine processes left in the prefix
    Cleanup,
}

#[derive(Subcommand, Debug)]
pub enum CacheCmd {
    /// Print the cache size
    Size,
    /// Delete the cache contents
    Clear,
}
