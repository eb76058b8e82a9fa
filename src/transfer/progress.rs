//! transfer::progress
//!
//! Forwards engine progress to the host, one line per event.
//!
//! Each event is formatted and sent through [`HostChannel::print_and_await`]
//! before control returns to the engine. Events are never buffered,
//! dropped or reordered.

use tracing::warn;

use crate::host::HostChannel;
use crate::vcs::{ProgressEvent, ProgressSink};

/// Format one progress event as a host line.
///
/// ```
/// use repolink::transfer::format_progress;
/// use repolink::vcs::{PackStage, ProgressEvent};
///
/// let line = format_progress(&ProgressEvent::Transfer {
///     received_objects: 3,
///     total_objects: 10,
///     received_bytes: 2048,
/// });
/// assert_eq!(line, "transfer: 3/10, 2048 bytes");
///
/// let line = format_progress(&ProgressEvent::PackBuilding {
///     stage: PackStage::AddingObjects,
///     current: 1,
///     total: 4,
/// });
/// assert_eq!(line, "pack builder (adding objects): 1/4");
/// ```
pub fn format_progress(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Transfer {
            received_objects,
            total_objects,
            received_bytes,
        } => format!(
            "transfer: {}/{}, {} bytes",
            received_objects, total_objects, received_bytes
        ),
        ProgressEvent::PackBuilding {
            stage,
            current,
            total,
        } => format!("pack builder ({}): {}/{}", stage, current, total),
    }
}

/// A [`ProgressSink`] writing to a [`HostChannel`].
pub struct ProgressReporter<'a> {
    channel: &'a dyn HostChannel,
}

impl<'a> ProgressReporter<'a> {
    /// Report through `channel`.
    pub fn new(channel: &'a dyn HostChannel) -> Self {
        Self { channel }
    }
}

impl ProgressSink for ProgressReporter<'_> {
    /// A channel failure is logged and the transfer continues.
    fn report(&self, event: ProgressEvent) -> bool {
        let line = format_progress(&event);
        match self.channel.print_and_await(&line) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "host did not acknowledge progress");
                false
            }
        }
    }
}
