//! Server/client lifecycle
//!
//! Builds the scenario state machine out of small pieces: readiness
//! detection on the server's stdout, time bounds with a cleanup fallback,
//! client runs, and a shutdown that tells a requested stop apart from a
//! server that died on its own.

mod child;
mod orchestrator;
mod outcome;
mod readiness;
mod server;
mod shutdown;
mod timeout;

pub use child::{collect, ChildRunner, ClientRun};
pub use orchestrator::{ClientInvocation, HarnessSettings, Orchestrator, ScenarioPlan};
pub use outcome::{ContentMarkers, FailureReason, RunState, ScenarioOutcome};
pub use readiness::{AnnouncementScanner, ReadinessDetector, ReadinessError};
pub use server::ManagedServer;
pub use shutdown::{Shutdown, ShutdownController};
pub use timeout::{TimedOut, TimeoutGuard};
