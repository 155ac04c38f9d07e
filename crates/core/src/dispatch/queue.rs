//! Priority-partitioned task queue with per-product in-flight locks
//!
//! Workers pop up to a batch worth of approved changes at a time. Two
//! changes for the same product are never handed out concurrently: an
//! item whose product is already in flight is parked and re-admitted when
//! the holder completes.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use skubridge_domain::{Priority, ProductId, StagedChange};
use tokio::sync::Notify;

/// Result of a batch pop attempt
#[derive(Debug)]
pub enum Pop {
    /// Items handed to the worker; their products are now locked
    Items(Vec<StagedChange>),
    /// Nothing dispatchable right now, but work remains (parked or in
    /// flight); the worker should wait and retry
    Wait,
    /// Every item has been dispatched and completed
    Drained,
}

#[derive(Default)]
struct QueueState {
    /// One FIFO lane per priority, drained in priority order
    lanes: [VecDeque<StagedChange>; 3],
    /// Products currently handed to a worker
    in_flight: HashSet<ProductId>,
    /// Items deferred because their product was in flight, tagged with
    /// their lane so re-admission preserves priority
    parked: Vec<(usize, StagedChange)>,
}

impl QueueState {
    fn lane(&mut self, priority: Priority) -> &mut VecDeque<StagedChange> {
        &mut self.lanes[priority as usize]
    }

    fn queued(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum::<usize>() + self.parked.len()
    }
}

/// Shared work queue for one push run
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self { state: Mutex::new(QueueState::default()), notify: Notify::new() }
    }

    /// Enqueue a change at the given priority
    pub fn push(&self, change: StagedChange, priority: Priority) {
        self.state.lock().lane(priority).push_back(change);
        self.notify.notify_waiters();
    }

    /// Undispatched items remaining in the queue
    pub fn depth(&self) -> usize {
        self.state.lock().queued()
    }

    /// Pop up to `max` items, highest priority first, locking each popped
    /// item's product. Items whose product is busy (including by an item
    /// popped in this very call) are parked instead.
    pub fn pop_batch(&self, max: usize) -> Pop {
        let mut state = self.state.lock();
        let mut items = Vec::new();

        for lane_idx in 0..state.lanes.len() {
            while items.len() < max {
                let Some(change) = state.lanes[lane_idx].pop_front() else {
                    break;
                };
                if state.in_flight.contains(&change.product_id) {
                    state.parked.push((lane_idx, change));
                } else {
                    state.in_flight.insert(change.product_id.clone());
                    items.push(change);
                }
            }
            if items.len() >= max {
                break;
            }
        }

        if !items.is_empty() {
            return Pop::Items(items);
        }
        if state.queued() == 0 && state.in_flight.is_empty() {
            return Pop::Drained;
        }
        Pop::Wait
    }

    /// Release the product locks of a finished batch and re-admit any
    /// parked items whose product is free again.
    pub fn complete(&self, products: impl IntoIterator<Item = ProductId>) {
        let mut state = self.state.lock();
        for product in products {
            state.in_flight.remove(&product);
        }

        if !state.parked.is_empty() {
            let parked = std::mem::take(&mut state.parked);
            let (ready, still_blocked): (Vec<_>, Vec<_>) = parked
                .into_iter()
                .partition(|(_, c)| !state.in_flight.contains(&c.product_id));
            state.parked = still_blocked;
            for (lane_idx, change) in ready {
                // Re-enter the back of the original priority lane
                state.lanes[lane_idx].push_back(change);
            }
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Wait until new work may be available
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }

    /// Remove and return every undispatched item (cancellation path)
    pub fn drain_remaining(&self) -> Vec<StagedChange> {
        let mut state = self.state.lock();
        let mut remaining: Vec<StagedChange> = Vec::new();
        for lane in &mut state.lanes {
            remaining.extend(lane.drain(..));
        }
        remaining.extend(std::mem::take(&mut state.parked).into_iter().map(|(_, c)| c));
        drop(state);
        self.notify.notify_waiters();
        remaining
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
