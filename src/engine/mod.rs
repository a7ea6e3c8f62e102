//! Supervision of the external streaming engine process.

mod launcher;
mod locate;
mod manager;
mod output;
mod status;

pub use launcher::{EngineLauncher, LaunchSpec, LaunchedEngine, SystemLauncher};
pub use locate::{engine_args, EngineLocator};
pub use manager::{EngineProcessManager, EngineState};
pub use output::{EngineOutput, OutputHub, OutputSubscription};
pub use status::{local_client, probe, EngineStatus};
