//! Common utilities shared by the CLI, the lifecycle engine and scenarios

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
