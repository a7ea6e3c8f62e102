mod cli;

use std::sync::Arc;
use std::time::Duration;

use acebridge::bridge::{Bridge, validate_content_id};
use acebridge::config::{self, Config};
use acebridge::engine::EngineProcessManager;
use acebridge::monitor::StatsMonitor;
use acebridge::platform::Platform;
use acebridge::playback::{PlaybackSessionClient, StreamStats};
use acebridge::reconnect::{ActiveStream, BackoffPolicy, EngineRestarter, ReconnectController};
use acebridge::signals;
use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use serde::Serialize;

fn main() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

struct App {
    config: Config,
    bridge: Bridge,
    json: bool,
}

async fn real_main() -> Result<i32> {
    let args = cli::Args::parse();

    let cfg_path = match args.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let config = Config::load_or_create(&cfg_path)?;
    info!("Using config from: {}", cfg_path.display());

    let platform = Platform::current();
    let engine = EngineProcessManager::new(&config, platform);
    let client = PlaybackSessionClient::new(&config);
    let bridge = Bridge::new(&config, engine, client);
    let app = App {
        config,
        bridge,
        json: args.json,
    };

    match args.sub {
        cli::Cmd::Engine { action } => handle_engine(&app, action).await,
        cli::Cmd::Play { content_id, title } => handle_play(&app, &content_id, title).await,
        cli::Cmd::Compat { action } => handle_compat(&app, action).await,
        cli::Cmd::Cache { action } => handle_cache(&app, action).await,
    }
}

/// Print `value` as JSON, or the human line.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

fn exit_code(ok: bool) -> i32 {
    if ok { 0 } else { 1 }
}

async fn handle_engine(app: &App, action: cli::EngineCmd) -> Result<i32> {
    match action {
        cli::EngineCmd::Start => {
            let result = app.bridge.engine_start().await;
            emit(app.json, &result, || match &result.error {
                None => "engine running".to_string(),
                Some(e) => format!("Failed to start: {e}"),
            })?;
            Ok(exit_code(result.success))
        }
        cli::EngineCmd::Stop => {
            let result = app.bridge.engine_stop().await;
            emit(app.json, &result, || "engine stopped".to_string())?;
            Ok(0)
        }
        cli::EngineCmd::Status => {
            let status = app.bridge.engine_status().await;
            emit(app.json, &status, || {
                if status.running {
                    format!(
                        "engine is running (version {}, platform {})",
                        status.version.as_deref().unwrap_or("unknown"),
                        status.platform.as_deref().unwrap_or("unknown")
                    )
                } else {
                    format!(
                        "engine is stopped ({})",
                        status.error.as_deref().unwrap_or("no answer")
                    )
                }
            })?;
            Ok(exit_code(status.running))
        }
        cli::EngineCmd::Exists => {
            let exists = app.bridge.engine_exists();
            emit(app.json, &exists, || {
                if exists {
                    "engine executable present".to_string()
                } else {
                    "engine executable missing".to_string()
                }
            })?;
            Ok(exit_code(exists))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsLine<'a> {
    timestamp: chrono::DateTime<chrono::Local>,
    title: Option<&'a str>,
    stats: &'a StreamStats,
    reconnect: acebridge::reconnect::ReconnectSnapshot,
}

async fn handle_play(app: &App, content_id: &str, title: Option<String>) -> Result<i32> {
    if let Err(e) = validate_content_id(content_id) {
        eprintln!("{e}");
        return Ok(2);
    }
    signals::install_signal_handlers()?;

    let engine = app.bridge.engine().clone();
    let client = app.bridge.client().clone();

    engine
        .ensure_running()
        .await
        .context("Engine failed to start")?;

    let result = app.bridge.play(content_id).await;
    let Some(session) = result.session else {
        emit(app.json, &result, || {
            format!(
                "Failed to start playback: {}",
                result.error.as_deref().unwrap_or("unknown error")
            )
        })?;
        return Ok(1);
    };
    if !app.json {
        println!("playback: {}", session.playback_url);
    }

    let restarter = Arc::new(EngineRestarter::new(engine.clone(), client.clone()));
    let controller =
        ReconnectController::new(BackoffPolicy::from_config(&app.config.reconnect), restarter);
    controller.begin(ActiveStream {
        title: title.clone(),
        session,
    });

    let monitor = StatsMonitor::spawn(
        client.clone(),
        controller.clone(),
        app.config.playback.stats_interval(),
    );
    let mut samples = monitor.subscribe();
    let mut sig_tick = tokio::time::interval(Duration::from_millis(200));
    let mut last_url = controller.session().map(|s| s.session.playback_url);

    loop {
        tokio::select! {
            changed = samples.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(stats) = samples.borrow_and_update().clone() else {
                    continue;
                };
                let current_url = controller.session().map(|s| s.session.playback_url);
                if current_url != last_url {
                    if let (Some(url), false) = (&current_url, app.json) {
                        println!("playback: {url}");
                    }
                    last_url = current_url;
                }
                let line = StatsLine {
                    timestamp: chrono::Local::now(),
                    title: title.as_deref(),
                    stats: &stats,
                    reconnect: controller.snapshot(),
                };
                emit(app.json, &line, || human_stats(&line))?;
            }
            _ = sig_tick.tick() => {
                if let Some(sig) = signals::check_signals() {
                    info!("{} received, stopping playback", signals::signal_name(sig));
                    break;
                }
            }
        }
    }

    drop(monitor);
    if let Some(active) = controller.end() {
        client.stop_playback(&active.session.command_url).await;
    }
    engine.stop().await;
    Ok(0)
}

fn human_stats(line: &StatsLine<'_>) -> String {
    let stats = line.stats;
    let mut out = format!(
        "[{}] {}{:?} peers={} down={} KB/s up={} KB/s",
        line.timestamp.format("%H:%M:%S"),
        line.title.map(|t| format!("{t}: ")).unwrap_or_default(),
        stats.status,
        stats.peers,
        stats.speed_down / 1024,
        stats.speed_up / 1024,
    );
    if stats.is_searching() {
        out.push_str(" (searching for peers)");
    }
    let reconnect = line.reconnect;
    if reconnect.exhausted {
        out.push_str(" reconnect attempts exhausted");
    } else if reconnect.retry_scheduled || reconnect.attempts > 0 {
        out.push_str(&format!(
            " reconnecting {}/{}",
            reconnect.attempts + u32::from(reconnect.retry_scheduled),
            reconnect.max_attempts
        ));
    }
    out
}

async fn handle_compat(app: &App, action: cli::CompatCmd) -> Result<i32> {
    let compat = app.bridge.engine().compat();
    match action {
        cli::CompatCmd::Status => {
            let runtime = compat.locate_runtime();
            let version = compat.version().await;
            let report = serde_json::json!({
                "required": app.bridge.engine().platform().needs_compat_layer(),
                "installed": runtime.is_some(),
                "runtime": runtime,
                "version": version,
                "prefix": compat.prefix_path(),
            });
            emit(app.json, &report, || match &runtime {
                Some(path) => format!(
                    "wine {} at {} (prefix {})",
                    version.as_deref().unwrap_or("unknown version"),
                    path.display(),
                    compat.prefix_path().display()
                ),
                None => "wine not found".to_string(),
            })?;
            Ok(exit_code(runtime.is_some()))
        }
        cli::CompatCmd::KillServer => {
            compat.force_kill_server().await;
            Ok(0)
        }
        cli::CompatCmd::Cleanup => {
            compat.cleanup_stale_processes().await;
            Ok(0)
        }
    }
}

async fn handle_cache(app: &App, action: cli::CacheCmd) -> Result<i32> {
    match action {
        cli::CacheCmd::Size => {
            let info = app.bridge.cache_size().await;
            emit(app.json, &info, || {
                format!(
                    "{:.1} MB in {}",
                    info.bytes as f64 / (1024.0 * 1024.0),
                    info.path.display()
                )
            })?;
            Ok(0)
        }
        cli::CacheCmd::Clear => {
            let result = app.bridge.cache_clear().await;
            emit(app.json, &result, || match &result.error {
                None => "cache cleared".to_string(),
                Some(e) => format!("Failed to clear cache: {e}"),
            })?;
            Ok(exit_code(result.success))
        }
    }
}
