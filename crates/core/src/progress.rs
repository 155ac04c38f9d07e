//! Throttled progress reporting
//!
//! Workers and the orchestrator funnel progress through one reporter per
//! run, which bounds the event frequency so a fast run cannot flood the
//! dashboard layer. Publishing never blocks: the sink contract is
//! fire-and-forget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skubridge_domain::constants::PROGRESS_MIN_INTERVAL;
use skubridge_domain::{ProgressEvent, RunPhase};
use uuid::Uuid;

use crate::ports::ProgressSink;

/// Rate-bounded progress emitter for one run
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    run_id: Uuid,
    min_interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, run_id: Uuid) -> Self {
        Self { sink, run_id, min_interval: PROGRESS_MIN_INTERVAL, last_emit: Mutex::new(None) }
    }

    /// Override the minimum interval between events
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Emit an event unless one was emitted within the minimum interval
    pub fn emit(&self, phase: RunPhase, processed: u64, total: u64, errors: u64) {
        {
            let mut last = self.last_emit.lock();
            match *last {
                Some(at) if at.elapsed() < self.min_interval => return,
                _ => *last = Some(Instant::now()),
            }
        }
        self.publish(phase, processed, total, errors);
    }

    /// Emit an event bypassing the throttle (phase changes, run end)
    pub fn emit_now(&self, phase: RunPhase, processed: u64, total: u64, errors: u64) {
        *self.last_emit.lock() = Some(Instant::now());
        self.publish(phase, processed, total, errors);
    }

    fn publish(&self, phase: RunPhase, processed: u64, total: u64, errors: u64) {
        self.sink.publish(ProgressEvent { run_id: self.run_id, phase, processed, total, errors });
    }
}
