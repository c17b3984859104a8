//! Managed OS processes
//!
//! [`ProcessHandle`] launches an executable and turns its output pipes and
//! exit into a stream of [`ProcessEvent`]s. Consumers work against the
//! [`ProcessEvents`] trait so the lifecycle logic can be driven by scripted
//! processes in tests.

mod decode;
mod events;
mod handle;

#[cfg(test)]
pub(crate) mod scripted;

pub use events::{OutputStream, ProcessEvent, ProcessEvents, ProcessExit, ProcessState};
pub use handle::{CommandSpec, ProcessHandle};
