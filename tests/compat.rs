mod common;

use std::sync::Arc;
use std::time::Duration;

use acebridge::compat::CompatLayerSupervisor;
use acebridge::exec::CommandOutcome;
use common::FakeExecutor;

fn supervisor(executor: Arc<FakeExecutor>, root: &std::path::Path) -> CompatLayerSupervisor {
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(bin.join("wine"), b"").unwrap();
    std::fs::write(bin.join("wineserver"), b"").unwrap();
    CompatLayerSupervisor::new(executor, root.join("prefix"), "ace_console.exe")
        .with_search_paths(vec![root.join("missing").join("wine"), bin.join("wine")])
}

#[test]
fn environment_pins_the_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let compat = supervisor(FakeExecutor::new(), dir.path());

    let env = compat.environment();
    let prefix = dir.path().join("prefix").to_string_lossy().into_owned();
    assert!(env.contains(&("WINEPREFIX".to_string(), prefix)));
    assert!(env.contains(&("WINEDEBUG".to_string(), "-all".to_string())));
    assert!(env.contains(&(
        "WINEDLLOVERRIDES".to_string(),
        "winemenubuilder.exe=d".to_string()
    )));
}

#[test]
fn runtime_found_in_search_paths_order() {
    let dir = tempfile::tempdir().unwrap();
    let compat = supervisor(FakeExecutor::new(), dir.path());

    assert_eq!(compat.locate_runtime(), Some(dir.path().join("bin").join("wine")));
    assert!(compat.is_installed());
}

#[tokio::test]
async fn version_is_read_from_the_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let executor = FakeExecutor::new();
    let wine = dir.path().join("bin").join("wine");
    let compat = supervisor(executor.clone(), dir.path());
    executor.script(
        "wine --version",
        CommandOutcome::exited(0, "wine-9.0\n"),
    );

    assert_eq!(compat.version().await.as_deref(), Some("wine-9.0"));
    assert_eq!(executor.calls()[0].program, wine);
}

#[tokio::test(start_paused = true)]
async fn kill_server_escalates_when_server_survives() {
    let dir = tempfile::tempdir().unwrap();
    let executor = FakeExecutor::new();
    let compat = supervisor(executor.clone(), dir.path());

    let started = tokio::time::Instant::now();
    compat.force_kill_server().await;

    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert_eq!(executor.lines(), vec!["wineserver -k15", "wineserver -k9"]);
    let prefix = dir.path().join("prefix").to_string_lossy().into_owned();
    for call in executor.calls().iter().filter(|c| c.program_name() == "wineserver") {
        assert!(call.envs.contains(&("WINEPREFIX".to_string(), prefix.clone())));
        assert_eq!(call.program, dir.path().join("bin").join("wineserver"));
    }
}

#[tokio::test(start_paused = true)]
async fn other_prefixes_do_not_drive_the_liveness_check() {
    let dir = tempfile::tempdir().unwrap();
    let executor = FakeExecutor::new();
    // another application's wineserver is running, ours is already gone
    executor.script("pgrep -x wineserver", CommandOutcome::exited(0, "555\n"));
    executor.script("wineserver -k9", CommandOutcome::exited(1, ""));
    let compat = supervisor(executor.clone(), dir.path());

    compat.force_kill_server().await;

    assert_eq!(executor.lines(), vec!["wineserver -k15", "wineserver -k9"]);
    let prefix = dir.path().join("prefix").to_string_lossy().into_owned();
    assert!(
        executor
            .calls()
            .iter()
            .all(|c| c.envs.contains(&("WINEPREFIX".to_string(), prefix.clone())))
    );
}

#[tokio::test]
async fn kill_server_skips_everything_without_a_server() {
    let dir = tempfile::tempdir().unwrap();
    let executor = FakeExecutor::new();
    executor.script("wineserver -k15", CommandOutcome::exited(1, ""));
    let compat = supervisor(executor.clone(), dir.path());

    compat.force_kill_server().await;

    assert_eq!(executor.lines(), vec!["wineserver -k15"]);
}

#[tokio::test]
async fn stale_cleanup_targets_engine_and_prefix_only() {
    let dir = tempfile::tempdir().unwrap();
    let executor = FakeExecutor::new();
    let compat = supervisor(executor.clone(), dir.path());

    compat.cleanup_stale_processes().await;

    let prefix = dir.path().join("prefix").to_string_lossy().into_owned();
    assert_eq!(
        executor.lines(),
        vec![
            "pkill -9 -f ace_console.exe".to_string(),
            format!("pkill -9 -f {prefix}"),
        ]
    );
}
