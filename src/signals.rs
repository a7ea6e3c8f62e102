//! Polling-based shutdown signal latch (lock-free).
//!
//! The front-end loop calls [`check_signals`] on a short tick instead of
//! awaiting a signal future, so it can keep its own select loop.

use std::sync::atomic::{AtomicUsize, Ordering};

static RECEIVED_SIGNAL: AtomicUsize = AtomicUsize::new(0);

const SIGINT: usize = 2;
const SIGTERM: usize = 15;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub fn install_signal_handlers() -> anyhow::Result<()> {
            use nix::sys::signal::{self, Signal};
            extern "C" fn handler(sig: i32) {
                RECEIVED_SIGNAL.store(sig as usize, Ordering::SeqCst);
            }
            let action = signal::SigAction::new(
                signal::SigHandler::Handler(handler),
                signal::SaFlags::empty(),
                signal::SigSet::empty(),
            );
            for sig in [Signal::SIGINT, Signal::SIGTERM] {
                // SAFETY: the handler only performs an atomic store
                unsafe { signal::sigaction(sig, &action) }
                    .map_err(|e| anyhow::anyhow!("Failed to register {sig:?} handler: {e}"))?;
            }
            Ok(())
        }
    } else {
        /// Ctrl-C is latched as SIGINT. Must be called from within a Tokio runtime.
        pub fn install_signal_handlers() -> anyhow::Result<()> {
            tokio::spawn(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    RECEIVED_SIGNAL.store(SIGINT, Ordering::SeqCst);
                }
            });
            Ok(())
        }
    }
}

/// Non-blocking check; returns the signal number once.
pub fn check_signals() -> Option<i32> {
    match RECEIVED_SIGNAL.swap(0, Ordering::AcqRel) {
        0 => None,
        sig => Some(sig as i32),
    }
}

pub fn signal_name(sig: i32) -> &'static str {
    match sig as usize {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        _ => "signal",
    }
}
