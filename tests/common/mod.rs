//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acebridge::config::Config;
use acebridge::engine::{EngineLauncher, EngineOutput, LaunchSpec, LaunchedEngine, OutputHub};
use acebridge::exec::{CommandExecutor, CommandOutcome, CommandSpec};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Records every command and simulates `pgrep -P` / `kill -9` over a process table.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    children: Mutex<HashMap<u32, Vec<u32>>>,
    alive: Mutex<HashSet<u32>>,
    kill_order: Mutex<Vec<u32>>,
    /// Canned outcomes keyed by `program arg0 arg1 ...`
    scripted: Mutex<HashMap<String, CommandOutcome>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spawn_process(&self, pid: u32, parent: Option<u32>) {
        self.alive.lock().unwrap().insert(pid);
        if let Some(parent) = parent {
            self.children.lock().unwrap().entry(parent).or_default().push(pid);
        }
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    pub fn script(&self, line: &str, outcome: CommandOutcome) {
        self.scripted.lock().unwrap().insert(line.to_string(), outcome);
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls rendered as `program arg0 arg1 ...` with the bare program name.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(render).collect()
    }

    pub fn kill_order(&self) -> Vec<u32> {
        self.kill_order.lock().unwrap().clone()
    }

    fn outcome(&self, cmd: &CommandSpec) -> CommandOutcome {
        let line = render(cmd);
        if let Some(outcome) = self.scripted.lock().unwrap().get(&line) {
            return outcome.clone();
        }

        match (cmd.program_name().as_str(), cmd.args.as_slice()) {
            ("pgrep", [flag, pid]) if flag == "-P" => {
                let pid: u32 = pid.parse().unwrap_or(0);
                let alive = self.alive.lock().unwrap();
                let kids: Vec<String> = self
                    .children
                    .lock()
                    .unwrap()
                    .get(&pid)
                    .into_iter()
                    .flatten()
                    .filter(|c| alive.contains(*c))
                    .map(|c| c.to_string())
                    .collect();
                if kids.is_empty() {
                    CommandOutcome::exited(1, "")
                } else {
                    CommandOutcome::exited(0, kids.join("\n") + "\n")
                }
            }
            ("kill", [sig, pid]) if sig == "-9" => {
                let pid: u32 = pid.parse().unwrap_or(0);
                if self.alive.lock().unwrap().remove(&pid) {
                    self.kill_order.lock().unwrap().push(pid);
                    CommandOutcome::exited(0, "")
                } else {
                    CommandOutcome {
                        code: Some(1),
                        stdout: String::new(),
                        stderr: format!("kill: ({pid}) - No such process"),
                        launch_error: None,
                    }
                }
            }
            ("pkill", _) | ("pgrep", _) => CommandOutcome::exited(1, ""),
            _ => CommandOutcome::exited(0, ""),
        }
    }
}

pub fn render(cmd: &CommandSpec) -> String {
    std::iter::once(cmd.program_name())
        .chain(cmd.args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommandExecutor for FakeExecutor {
    fn run(&self, cmd: CommandSpec) -> BoxFuture<'static, CommandOutcome> {
        let outcome = self.outcome(&cmd);
        self.calls.lock().unwrap().push(cmd);
        async move { outcome }.boxed()
    }
}

/// Counts launches; flips `ready` so the stub status endpoint starts answering.
pub struct FakeLauncher {
    pub launches: AtomicUsize,
    pub ready: Arc<AtomicBool>,
    pub next_pid: u32,
    pub specs: Mutex<Vec<LaunchSpec>>,
    /// Held so the exit receivers stay pending
    exits: Mutex<Vec<oneshot::Sender<Option<i32>>>>,
    pub fail: bool,
}

impl FakeLauncher {
    pub fn new(ready: Arc<AtomicBool>, next_pid: u32) -> Arc<Self> {
        Arc::new(Self {
            launches: AtomicUsize::new(0),
            ready,
            next_pid,
            specs: Mutex::new(Vec::new()),
            exits: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    /// Launcher whose spawn always fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            launches: AtomicUsize::new(0),
            ready: Arc::new(AtomicBool::new(false)),
            next_pid: 0,
            specs: Mutex::new(Vec::new()),
            exits: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Simulate the engine process exiting on its own.
    pub fn exit_all(&self, code: i32) {
        for tx in self.exits.lock().unwrap().drain(..) {
            let _ = tx.send(Some(code));
        }
    }
}

impl EngineLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec, output: OutputHub) -> io::Result<LaunchedEngine> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "not executable"));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());
        self.ready.store(true, Ordering::SeqCst);
        output.publish(EngineOutput::Stdout(format!("pid {} listening", self.next_pid)));
        let (tx, rx) = oneshot::channel();
        self.exits.lock().unwrap().push(tx);
        Ok(LaunchedEngine {
            pid: Some(self.next_pid),
            exited: rx,
        })
    }
}

/// Status endpoint answering with a version once `ready` is set.
pub fn status_stub(ready: Arc<AtomicBool>) -> Router {
    slow_status_stub(ready, Duration::ZERO)
}

/// Like [`status_stub`], but every answer takes `delay`.
pub fn slow_status_stub(ready: Arc<AtomicBool>, delay: Duration) -> Router {
    Router::new().route(
        "/webui/api/service",
        get(move || {
            let ready = Arc::clone(&ready);
            async move {
                tokio::time::sleep(delay).await;
                if ready.load(Ordering::SeqCst) {
                    (
                        StatusCode::OK,
                        Json(json!({"result": {"version": "3.2.3", "platform": "linux"}, "error": null})),
                    )
                } else {
                    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"result": null, "error": "starting"})))
                }
            }
        }),
    )
}

/// Bind `router` on an ephemeral loopback port and serve it in the background.
pub async fn serve(router: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

/// Config pointing at a stub engine on `port`, with a dev engine tree under `root`.
pub fn config_for(port: u16, root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.engine.port = port;
    cfg.engine.dev_dir = Some(root.to_path_buf());
    cfg.engine.ready_timeout_ms = 3_000;
    cfg.engine.ready_poll_interval_ms = 20;
    cfg.engine.ensure_poll_interval_ms = 10;
    cfg.engine.status_timeout_ms = 500;
    cfg.playback.start_timeout_ms = 2_000;
    cfg.playback.stats_timeout_ms = 500;
    cfg.compat.prefix = Some(root.join("prefix"));
    cfg
}

/// Create `engine/linux/acestreamengine` under `root`.
pub fn install_linux_engine(root: &Path) {
    let dir = root.join("engine").join("linux");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("acestreamengine"), b"#!/bin/sh\n").unwrap();
}

/// A port nothing listens on.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Everything a fake engine saw and how it should answer.
#[derive(Default)]
pub struct EngineStub {
    pub requests: AtomicUsize,
    pub manifest_requests: Mutex<Vec<HashMap<String, String>>>,
    pub stop_requests: Mutex<Vec<HashMap<String, String>>>,
    /// `(status, peers)` returned by successive stats calls; the last one repeats
    pub stats_script: Mutex<Vec<(String, u32)>>,
    pub port: AtomicU16,
    pub manifest_error: Mutex<Option<String>>,
    pub sessions_started: AtomicUsize,
}

impl EngineStub {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn script_stats(&self, samples: &[(&str, u32)]) {
        *self.stats_script.lock().unwrap() =
            samples.iter().map(|(s, p)| (s.to_string(), *p)).collect();
    }

    pub fn url(&self, path: &str) -> String {
        on_port(self.port.load(Ordering::SeqCst), path)
    }
}

/// Serve a fresh playback stub; returns it with its port recorded.
pub async fn serve_engine() -> (Arc<EngineStub>, u16) {
    let stub = Arc::new(EngineStub::default());
    let port = serve(playback_stub(Arc::clone(&stub))).await;
    stub.port.store(port, Ordering::SeqCst);
    (stub, port)
}

/// Minimal engine HTTP API: manifest, stats, command, plus failure routes.
pub fn playback_stub(stub: Arc<EngineStub>) -> Router {
    use axum::extract::{Path as UrlPath, Query};

    let manifest = {
        let stub = Arc::clone(&stub);
        move |Query(q): Query<HashMap<String, String>>| {
            let stub = Arc::clone(&stub);
            async move {
                stub.requests.fetch_add(1, Ordering::SeqCst);
                stub.manifest_requests.lock().unwrap().push(q);
                if let Some(message) = stub.manifest_error.lock().unwrap().clone() {
                    return Json(json!({"response": null, "error": message}));
                }
                let n = stub.sessions_started.fetch_add(1, Ordering::SeqCst) + 1;
                let playback_url = if n == 1 { "u1".to_string() } else { format!("u{n}") };
                Json(json!({
                    "response": {
                        "playback_url": playback_url,
                        "stat_url": stub.url(&format!("/ace/stat/{n}")),
                        "command_url": stub.url(&format!("/ace/cmd/{n}")),
                        "event_url": stub.url(&format!("/ace/event/{n}")),
                        "infohash": "abc",
                        "playback_session_id": format!("session-{n}"),
                        "is_live": 1
                    },
                    "error": null
                }))
            }
        }
    };

    let stats = {
        let stub = Arc::clone(&stub);
        move |UrlPath(_id): UrlPath<String>| {
            let stub = Arc::clone(&stub);
            async move {
                stub.requests.fetch_add(1, Ordering::SeqCst);
                let (status, peers) = {
                    let mut script = stub.stats_script.lock().unwrap();
                    if script.len() > 1 {
                        script.remove(0)
                    } else {
                        script.first().cloned().unwrap_or_else(|| ("dl".to_string(), 3))
                    }
                };
                Json(json!({
                    "response": {
                        "status": status,
                        "peers": peers,
                        "speed_down": peers * 100,
                        "speed_up": 10,
                        "downloaded": 4096,
                        "uploaded": 512,
                        "is_live": 1
                    },
                    "error": null
                }))
            }
        }
    };

    let command = {
        let stub = Arc::clone(&stub);
        move |Query(q): Query<HashMap<String, String>>| {
            let stub = Arc::clone(&stub);
            async move {
                stub.requests.fetch_add(1, Ordering::SeqCst);
                stub.stop_requests.lock().unwrap().push(q);
                Json(json!({"response": "ok", "error": null}))
            }
        }
    };

    let slow = {
        let stub = Arc::clone(&stub);
        move || {
            let stub = Arc::clone(&stub);
            async move {
                stub.requests.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"response": {"status": "dl"}, "error": null}))
            }
        }
    };

    let fallback = {
        let stub = Arc::clone(&stub);
        move || {
            let stub = Arc::clone(&stub);
            async move {
                stub.requests.fetch_add(1, Ordering::SeqCst);
                (StatusCode::OK, "this is not json")
            }
        }
    };

    Router::new()
        .route("/ace/manifest.m3u8", get(manifest))
        .route("/ace/stat/{id}", get(stats))
        .route("/ace/cmd/{id}", get(command))
        .route("/slow", get(slow))
        .fallback(fallback)
}

/// Absolute URL on the stub for a path the stub handed out.
pub fn on_port(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}
