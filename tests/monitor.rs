mod common;

use std::sync::Arc;
use std::time::Duration;

use acebridge::config::ReconnectConfig;
use acebridge::monitor::StatsMonitor;
use acebridge::playback::{PlaybackSessionClient, StreamStatus};
use acebridge::reconnect::{ActiveStream, BackoffPolicy, ReconnectController};
use common::{config_for, serve_engine};

const CONTENT_ID: &str = "0123456789abcdef0123456789abcdef01234567";

async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn error_samples_drive_a_reconnect_onto_the_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let (stub, port) = serve_engine().await;
    let client = PlaybackSessionClient::new(&config_for(port, dir.path()));
    let policy = BackoffPolicy::from_config(&ReconnectConfig {
        max_attempts: 2,
        backoff_ms: vec![20],
    });
    let controller = ReconnectController::new(policy, Arc::new(client.clone()));

    // first sample fails, everything after is healthy
    stub.script_stats(&[("err", 0), ("dl", 5)]);
    let first = client.start_playback(CONTENT_ID).await.unwrap();
    controller.begin(ActiveStream {
        title: None,
        session: first.clone(),
    });
    let monitor = StatsMonitor::spawn(client.clone(), controller.clone(), Duration::from_millis(30));

    assert!(
        wait_for(|| controller
            .session()
            .is_some_and(|s| s.session.session_id != first.session_id))
        .await,
        "session was never replaced"
    );
    assert!(
        wait_for(|| monitor
            .latest()
            .is_some_and(|s| s.status == StreamStatus::Downloading))
        .await
    );

    // old session was stopped before the new one started
    let stops = stub.stop_requests.lock().unwrap().clone();
    assert_eq!(stops.len(), 1);
    assert_eq!(stub.manifest_requests.lock().unwrap().len(), 2);
    assert!(wait_for(|| controller.snapshot().attempts == 0).await);
}

#[tokio::test]
async fn polling_stops_when_the_stream_ends() {
    let dir = tempfile::tempdir().unwrap();
    let (stub, port) = serve_engine().await;
    let client = PlaybackSessionClient::new(&config_for(port, dir.path()));
    let controller =
        ReconnectController::new(BackoffPolicy::default(), Arc::new(client.clone()));

    let session = client.start_playback(CONTENT_ID).await.unwrap();
    controller.begin(ActiveStream {
        title: Some("Match".into()),
        session,
    });
    let monitor = StatsMonitor::spawn(client.clone(), controller.clone(), Duration::from_millis(20));
    assert!(wait_for(|| monitor.latest().is_some()).await);

    controller.end();
    assert!(wait_for(|| monitor.latest().is_none()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_end = stub.requests();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(stub.requests(), after_end);
}
