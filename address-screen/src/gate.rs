//! Bounded-concurrency execution over an ordered batch
//!
//! A fixed pool of cooperative workers pulls item indices from a shared
//! queue. The pool size is the concurrency bound, and every outcome is
//! written into a pre-sized slot at its input position, so results come
//! back in input order whatever the completion order.

use futures::future::join_all;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyGate {
    max_in_flight: NonZeroUsize,
}

impl ConcurrencyGate {
    pub fn new(max_in_flight: NonZeroUsize) -> Self {
        Self { max_in_flight }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.get()
    }

    /// Apply `worker` to every item with at most `max_in_flight` invocations
    /// active at once. Output `i` is the outcome for `items[i]`.
    pub async fn run<'a, I, T, F, Fut>(&self, items: &'a [I], worker: F) -> Vec<T>
    where
        F: Fn(usize, &'a I) -> Fut,
        Fut: Future<Output = T>,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let queue = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<T>>> = Mutex::new((0..items.len()).map(|_| None).collect());
        let pool_size = self.max_in_flight.get().min(items.len());

        let queue = &queue;
        let slots = &slots;
        let worker = &worker;

        let pool = (0..pool_size).map(|worker_id| async move {
            loop {
                let index = queue.fetch_add(1, Ordering::Relaxed);
                let Some(item) = items.get(index) else {
                    break;
                };
                trace!(worker_id, index, "worker picked item");
                let outcome = worker(index, item).await;
                slots.lock()[index] = Some(outcome);
            }
        });
        join_all(pool).await;

        let results: Vec<T> = std::mem::take(&mut *slots.lock())
            .into_iter()
            .flatten()
            .collect();
        debug_assert_eq!(results.len(), items.len());
        results
    }
}
