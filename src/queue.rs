//! Generic per-key work queue: serializes reconciliation per key and gives
//! every successful pass a periodic requeue.
//!
//! Grounded in `controllers::podautoscaler::horizontal::PodAutoscaler`'s
//! `work_queue: DelayQueue<String, ...>` + `in_queue: HashSet<String>` pair:
//! a delay queue gives the periodic/backoff requeue for free, and the
//! parallel `HashSet` prevents the same key being enqueued twice while
//! already pending. Generalized here from `String` keys to any
//! `K: Eq + Hash + Clone`.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};

use futures_delay_queue::{delay_queue, DelayQueue};
use futures_intrusive::buffer::GrowingHeapBuf;
use futures_intrusive::channel::shared::GenericReceiver;
use parking_lot::RawMutex;

pub struct WorkQueue<K: Eq + Hash + Clone + Send + Sync + 'static> {
    queue: DelayQueue<K, GrowingHeapBuf<K>>,
    receiver: GenericReceiver<RawMutex, K, GrowingHeapBuf<K>>,
    in_queue: HashSet<K>,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> WorkQueue<K> {
    pub fn new() -> Self {
        let (queue, receiver) = delay_queue::<K>();
        WorkQueue {
            queue,
            receiver,
            in_queue: HashSet::new(),
        }
    }

    /// Enqueue `key` for immediate processing, unless it is already pending.
    pub fn enqueue_now(&mut self, key: K) {
        if self.in_queue.insert(key.clone()) {
            self.queue.insert_at(key, Instant::now());
        }
    }

    /// Enqueue `key` after `delay`, unless it is already pending — used for
    /// the periodic requeue every successful reconciliation schedules.
    pub fn enqueue_after(&mut self, key: K, delay: Duration) {
        if self.in_queue.insert(key.clone()) {
            self.queue.insert(key, delay);
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.in_queue.contains(key)
    }

    /// Pop the next ready key. Clears its pending flag; the caller is free
    /// to re-enqueue it (e.g. the periodic requeue) once processing starts.
    pub async fn recv(&mut self) -> Option<K> {
        let key = self.receiver.receive().await?;
        self.in_queue.remove(&key);
        Some(key)
    }
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
