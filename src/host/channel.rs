//! host::channel
//!
//! The synchronous line channel back to the host.

use std::io::Write;
use std::sync::Mutex;

use thiserror::Error;

/// Errors from the host channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("host channel write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("host channel closed")]
    Closed,
}

/// A print-and-acknowledge channel to the host.
///
/// # Blocking
///
/// `print_and_await` does not return until the host has acknowledged the
/// line. It is called from inside engine progress callbacks, so the engine
/// is stalled for the whole round-trip; a slow host slows the transfer.
pub trait HostChannel {
    /// Send one line and wait for the host to acknowledge it.
    fn print_and_await(&self, line: &str) -> Result<(), ChannelError>;
}

/// Channel over the process's standard error stream.
///
/// A completed flush is the acknowledgment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioChannel;

impl HostChannel for StdioChannel {
    fn print_and_await(&self, line: &str) -> Result<(), ChannelError> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{}", line)?;
        stderr.flush()?;
        Ok(())
    }
}

/// In-memory channel that records every line.
///
/// Used by tests and by hosts embedding the library without a terminal.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    lines: Mutex<Vec<String>>,
    closed: bool,
}

impl MemoryChannel {
    /// An open channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that refuses every line.
    pub fn closed() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            closed: true,
        }
    }

    /// Lines received so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl HostChannel for MemoryChannel {
    fn print_and_await(&self, line: &str) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
        Ok(())
    }
}
