//! Bounded waits with a fallback action
//!
//! The guarded operation and the fallback both need the same mutable
//! context (typically the server being waited on). The operation borrows it
//! first; if the deadline passes, that future is dropped, which releases the
//! borrow, and the fallback runs against the same context.

use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

/// The deadline passed before the guarded operation finished
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("timed out after {after:?}")]
pub struct TimedOut {
    pub after: Duration,
}

/// Races an operation against a fixed deadline
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    duration: Duration,
}

impl TimeoutGuard {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `operation`; if it has not finished within the deadline, run
    /// `on_expire` and report [`TimedOut`]
    ///
    /// Exactly one of the two decides the outcome: `on_expire` is never
    /// invoked once the operation has produced a value.
    pub async fn run<C, T, Op, Expire>(
        &self,
        ctx: &mut C,
        operation: Op,
        on_expire: Expire,
    ) -> Result<T, TimedOut>
    where
        C: Send + ?Sized,
        Op: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, T>,
        Expire: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, ()>,
    {
        let finished = tokio::time::timeout(self.duration, operation(ctx)).await;
        match finished {
            Ok(value) => Ok(value),
            Err(_) => {
                tracing::warn!("timed out after {:?}", self.duration);
                on_expire(ctx).await;
                Err(TimedOut {
                    after: self.duration,
                })
            }
        }
    }
}
