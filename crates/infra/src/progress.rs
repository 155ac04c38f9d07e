//! Progress sinks
//!
//! The engine publishes progress events fire-and-forget; these adapters
//! fan them out without ever blocking a worker. `TracingProgressSink`
//! writes structured log events; `ChannelProgressSink` feeds a bounded
//! channel for a dashboard or event layer, dropping events when the
//! consumer falls behind.

use skubridge_core::ports::ProgressSink;
use skubridge_domain::ProgressEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sink emitting progress as structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn publish(&self, event: ProgressEvent) {
        info!(
            run = %event.run_id,
            phase = %event.phase,
            processed = event.processed,
            total = event.total,
            errors = event.errors,
            "Sync progress"
        );
    }
}

/// Sink forwarding events into a bounded channel.
///
/// `try_send` only: when the channel is full or the receiver is gone the
/// event is dropped, so a slow or dead consumer can never stall a run.
pub struct ChannelProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    /// Create a sink and its receiving end with the given buffer capacity
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn publish(&self, event: ProgressEvent) {
        if let Err(err) = self.tx.try_send(event) {
            debug!(error = %err, "Progress event dropped");
        }
    }
}
