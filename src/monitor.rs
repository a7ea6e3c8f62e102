//! Stats polling bound to the active stream.
//!
//! While a session is present its `stat_url` is polled every interval; each
//! sample is fed to the [`ReconnectController`] and published to watchers.
//! When the session is replaced the old poller is cancelled and a new one
//! starts on the new URL; when it is cleared polling stops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::playback::{PlaybackSessionClient, StreamStats};
use crate::reconnect::ReconnectController;
use crate::task::RepeatingTask;

pub struct StatsMonitor {
    driver: JoinHandle<()>,
    latest: watch::Receiver<Option<StreamStats>>,
}

impl StatsMonitor {
    pub fn spawn(
        client: PlaybackSessionClient,
        controller: ReconnectController,
        period: Duration,
    ) -> Self {
        let (tx, latest) = watch::channel(None);
        let tx = Arc::new(tx);
        let mut sessions = controller.subscribe_session();

        let driver = tokio::spawn(async move {
            let mut poller: Option<RepeatingTask> = None;
            let mut current: Option<String> = None;

            loop {
                let stat_url = sessions
                    .borrow_and_update()
                    .as_ref()
                    .map(|s| s.session.stat_url.clone());

                if stat_url != current {
                    if let Some(old) = poller.take() {
                        old.cancel();
                    }
                    match &stat_url {
                        Some(url) => {
                            log::debug!("Polling stats at {url}");
                            poller = Some(poll_stats(
                                client.clone(),
                                controller.clone(),
                                Arc::clone(&tx),
                                url.clone(),
                                period,
                            ));
                        }
                        None => {
                            tx.send_replace(None);
                        }
                    }
                    current = stat_url;
                }

                if sessions.changed().await.is_err() {
                    break;
                }
            }
        });

        Self { driver, latest }
    }

    /// Most recent sample for the current session, if any.
    pub fn latest(&self) -> Option<StreamStats> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StreamStats>> {
        self.latest.clone()
    }
}

impl Drop for StatsMonitor {
    fn drop(&mut self) {
        // dropping the driver's poller cancels it
        self.driver.abort();
    }
}

fn poll_stats(
    client: PlaybackSessionClient,
    controller: ReconnectController,
    tx: Arc<watch::Sender<Option<StreamStats>>>,
    stat_url: String,
    period: Duration,
) -> RepeatingTask {
    RepeatingTask::spawn(period, move || {
        let client = client.clone();
        let controller = controller.clone();
        let tx = Arc::clone(&tx);
        let stat_url = stat_url.clone();
        async move {
            let stats = client.get_stats(&stat_url).await;

            let still_current = controller
                .session()
                .is_some_and(|s| s.session.stat_url == stat_url);
            if !still_current {
                return;
            }

            controller.observe(&stats);
            tx.send_replace(Some(stats));
        }
    })
}
