//! Bounded work queue between the enumerator and the copy workers.
//!
//! Exposes its occupancy for the enumerator's backpressure check and a
//! put/done completion barrier for the driver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tokio::sync::{Notify, Semaphore};

use crate::config::QueueOrder;

/// One pending source key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: String,
}

impl WorkItem {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    unfinished: u64,
    put_count: u64,
    done_count: u64,
    abandoned_count: u64,
}

/// Bounded multi-producer multi-consumer queue with a completion barrier.
///
/// * `put` waits while the queue holds `capacity` items; items are never dropped.
/// * `get` waits until an item is available and returns `None` once the queue is closed.
/// * every item returned by `get` must be matched by exactly one `mark_done`;
///   [`ClaimedItem`] does this on drop.
/// * `wait_until_drained` resolves when every put item has been marked done.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    order: QueueOrder,
    capacity: usize,
    free_slots: Semaphore,
    available: Semaphore,
    drained: Notify,
}

impl WorkQueue {
    pub fn new(capacity: usize, order: QueueOrder) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState::default()),
            order,
            capacity,
            free_slots: Semaphore::new(capacity),
            available: Semaphore::new(0),
            drained: Notify::new(),
        }
    }

    /// Enqueue an item, waiting for a free slot.
    ///
    /// Fails only when the queue has been closed.
    pub async fn put(&self, item: WorkItem) -> Result<()> {
        let permit = self
            .free_slots
            .acquire()
            .await
            .map_err(|_| anyhow!("work queue has been closed."))?;
        permit.forget();

        {
            let mut state = self.state.lock().unwrap();
            state.items.push_back(item);
            state.unfinished += 1;
            state.put_count += 1;
        }

        self.available.add_permits(1);
        Ok(())
    }

    /// Dequeue the next item according to the queue order.
    ///
    /// Returns `None` after [`close`](Self::close).
    pub async fn get(self: &Arc<Self>) -> Option<ClaimedItem> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();

        let item = {
            let mut state = self.state.lock().unwrap();
            match self.order {
                QueueOrder::Fifo => state.items.pop_front(),
                QueueOrder::Lifo => state.items.pop_back(),
            }
        }?;

        self.free_slots.add_permits(1);

        Some(ClaimedItem {
            item,
            queue: Arc::clone(self),
            done: false,
        })
    }

    /// Record that a dequeued item has been fully handled.
    pub fn mark_done(&self) {
        let drained = {
            let mut state = self.state.lock().unwrap();
            state.done_count += 1;
            state.unfinished = state.unfinished.saturating_sub(1);
            state.unfinished == 0
        };

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every item put so far has been marked done (or discarded).
    pub async fn wait_until_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Stop accepting and handing out items. Pending items stay queued until
    /// [`discard_pending`](Self::discard_pending).
    pub fn close(&self) {
        self.free_slots.close();
        self.available.close();
    }

    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }

    /// Remove all items that were never claimed and return how many there were.
    pub fn discard_pending(&self) -> u64 {
        let (count, drained) = {
            let mut state = self.state.lock().unwrap();
            let count = state.items.len() as u64;
            state.items.clear();
            state.abandoned_count += count;
            state.unfinished = state.unfinished.saturating_sub(count);
            (count, state.unfinished == 0)
        };

        if drained {
            self.drained.notify_waiters();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    pub fn unfinished(&self) -> u64 {
        self.state.lock().unwrap().unfinished
    }

    pub fn put_count(&self) -> u64 {
        self.state.lock().unwrap().put_count
    }

    pub fn done_count(&self) -> u64 {
        self.state.lock().unwrap().done_count
    }

    pub fn abandoned_count(&self) -> u64 {
        self.state.lock().unwrap().abandoned_count
    }
}

/// An item taken from a [`WorkQueue`].
///
/// Dropping it marks the item done, so a failing or panicking worker can
/// never hold the completion barrier open.
#[derive(Debug)]
pub struct ClaimedItem {
    item: WorkItem,
    queue: Arc<WorkQueue>,
    done: bool,
}

impl ClaimedItem {
    pub fn key(&self) -> &str {
        &self.item.key
    }

    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    pub fn complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.queue.mark_done();
        }
    }
}

impl Drop for ClaimedItem {
    fn drop(&mut self) {
        self.finish();
    }
}
