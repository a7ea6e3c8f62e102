//! Engine stdout/stderr as a multi-subscriber event stream.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Lines kept for slow subscribers before they start lagging.
const OUTPUT_BOUND: usize = 256;

/// One observation of the engine child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    Stdout(String),
    Stderr(String),
    Exited { code: Option<i32> },
}

/// Publisher side, cloned into every task that forwards engine output.
#[derive(Debug, Clone)]
pub struct OutputHub {
    tx: broadcast::Sender<EngineOutput>,
}

impl Default for OutputHub {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(OUTPUT_BOUND);
        Self { tx }
    }

    /// Publishing with nobody listening is fine.
    pub fn publish(&self, event: EngineOutput) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> OutputSubscription {
        OutputSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving side. Dropping it (or calling [`Self::unsubscribe`]) detaches it.
#[derive(Debug)]
pub struct OutputSubscription {
    rx: broadcast::Receiver<EngineOutput>,
}

impl OutputSubscription {
    /// Next event, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<EngineOutput> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("engine output subscriber lagged, {skipped} lines dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}
