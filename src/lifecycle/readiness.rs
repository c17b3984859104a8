//! Readiness detection from server output
//!
//! The server announces its bound port on stdout. Output arrives in
//! arbitrary fragments, so text is buffered until a full announcement has
//! been seen. Completed lines that did not match are dropped; only the
//! trailing partial line is carried into the next chunk.

use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::common::{Error, Result};
use crate::process::{OutputStream, ProcessEvent, ProcessEvents, ProcessExit};

/// Upper bound on buffered text while no newline arrives
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Quiet period after which a port at the end of stdout is taken as complete
pub const SETTLE_WINDOW: Duration = Duration::from_millis(100);

/// Why a server never became ready
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("exited before announcing readiness ({0})")]
    ExitedBeforeReady(ProcessExit),

    #[error("failed before announcing readiness: {0}")]
    ProcessFailed(String),

    #[error("announced an invalid port '{0}'")]
    InvalidPort(String),
}

/// Waits for the first port announcement on a process's stdout
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    pattern: Regex,
}

impl ReadinessDetector {
    /// Build a detector from a regular expression whose first capture
    /// group is the decimal port
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e))?;
        if regex.captures_len() < 2 {
            return Err(Error::invalid_pattern(
                pattern,
                "a capture group for the port is required",
            ));
        }
        Ok(Self { pattern: regex })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Start a fresh scan over a new output stream
    pub fn scanner(&self) -> AnnouncementScanner<'_> {
        AnnouncementScanner {
            pattern: &self.pattern,
            pending: String::new(),
            deferred: false,
        }
    }

    /// Consume stdout events until the port is announced
    ///
    /// Stops reading as soon as the announcement is found; later output
    /// stays queued on the process for whoever consumes it next. A port at
    /// the very end of the output so far is accepted once stdout stays quiet
    /// for [`SETTLE_WINDOW`] or stderr speaks instead.
    pub async fn await_ready<P>(&self, process: &mut P) -> std::result::Result<u16, ReadinessError>
    where
        P: ProcessEvents + ?Sized,
    {
        let mut scanner = self.scanner();

        loop {
            let event = if scanner.is_deferred() {
                let next = tokio::time::timeout(SETTLE_WINDOW, process.next_event()).await;
                match next {
                    Ok(event) => event,
                    Err(_) => return ready(process.label(), scanner.settle()?),
                }
            } else {
                process.next_event().await
            };

            let Some(event) = event else { break };
            match event {
                ProcessEvent::Output {
                    stream: OutputStream::Stdout,
                    chunk,
                } => {
                    if let Some(port) = scanner.feed(&chunk)? {
                        return ready(process.label(), Some(port));
                    }
                }
                ProcessEvent::Output { .. } => {
                    if scanner.is_deferred() {
                        return ready(process.label(), scanner.settle()?);
                    }
                }
                ProcessEvent::Exited(exit) => return Err(ReadinessError::ExitedBeforeReady(exit)),
                ProcessEvent::Failed(cause) => return Err(ReadinessError::ProcessFailed(cause)),
            }
        }

        Err(ReadinessError::ProcessFailed(
            "output ended without an exit status".to_string(),
        ))
    }
}

fn ready(label: &str, port: Option<u16>) -> std::result::Result<u16, ReadinessError> {
    match port {
        Some(port) => {
            tracing::info!(process = %label, port, "ready");
            Ok(port)
        }
        None => Err(ReadinessError::ProcessFailed(
            "announcement vanished while settling".to_string(),
        )),
    }
}

/// Incremental matcher over one output stream
pub struct AnnouncementScanner<'a> {
    pattern: &'a Regex,
    pending: String,
    /// A match was found but its digits touch the end of `pending`
    deferred: bool,
}

impl AnnouncementScanner<'_> {
    /// Add a chunk of output, returning the port once announced
    pub fn feed(&mut self, chunk: &str) -> std::result::Result<Option<u16>, ReadinessError> {
        self.pending.push_str(chunk);
        self.deferred = false;

        if let Some(port) = self
            .pattern
            .captures(&self.pending)
            .and_then(|caps| caps.get(1))
        {
            // Digits running up to the end of what we have may continue in
            // the next chunk
            if port.end() < self.pending.len() {
                return parse_port(port.as_str()).map(Some);
            }
            self.deferred = true;
            return Ok(None);
        }

        if let Some(newline) = self.pending.rfind('\n') {
            self.pending.drain(..=newline);
        }
        if self.pending.len() > MAX_PENDING_BYTES {
            let mut cut = self.pending.len() - MAX_PENDING_BYTES;
            while !self.pending.is_char_boundary(cut) {
                cut += 1;
            }
            self.pending.drain(..cut);
        }
        Ok(None)
    }

    /// Whether a match is waiting for proof that its port is complete
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Accept a deferred match as it stands
    pub fn settle(&mut self) -> std::result::Result<Option<u16>, ReadinessError> {
        if !self.deferred {
            return Ok(None);
        }
        self.deferred = false;
        match self
            .pattern
            .captures(&self.pending)
            .and_then(|caps| caps.get(1))
        {
            Some(port) => parse_port(port.as_str()).map(Some),
            None => Ok(None),
        }
    }
}

fn parse_port(digits: &str) -> std::result::Result<u16, ReadinessError> {
    digits
        .parse::<u16>()
        .map_err(|_| ReadinessError::InvalidPort(digits.to_string()))
}
