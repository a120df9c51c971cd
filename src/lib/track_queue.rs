//! An unbounded FIFO waiting line with a blocking, time-limited pop.
//!
//! Producers never wait: [TrackQueue::push] only takes a short lock.
//! The consumer suspends in [TrackQueue::pop] until something arrives.

use std::collections::VecDeque;
use std::time::Duration;

use delegate::delegate;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Pending tracks of a voice session.
#[derive(Debug)]
pub struct TrackQueue<T> {
    #[allow(clippy::missing_docs_in_private_items)]
    items: Mutex<VecDeque<T>>,
    /// Wakes a consumer waiting in [TrackQueue::pop].
    added: Notify,
}

impl<T> Default for TrackQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            added: Notify::new(),
        }
    }
}

impl<T> TrackQueue<T> {
    /// Add to the back of the queue.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.added.notify_one();
    }

    /// Wait until the queue has an item and remove it from the front.
    pub async fn pop(&self) -> T {
        loop {
            // Created before checking so a push in between isn't missed.
            let added = self.added.notified();

            let front = self.items.lock().pop_front();
            if let Some(item) = front {
                return item;
            }

            added.await;
        }
    }

    /// Same as [TrackQueue::pop], but gives up after `wait`.
    /// Returns `None` if nothing arrived in time.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        tokio::time::timeout(wait, self.pop()).await.ok()
    }

    /// Build a snapshot of the pending items, front first.
    pub fn map_pending<R>(&self, f: impl FnMut(&T) -> R) -> Vec<R> {
        self.items.lock().iter().map(f).collect()
    }

    delegate! {
        to self.items.lock() {
            /// Drop every pending item.
            pub fn clear(&self);
            /// Whether nothing is pending.
            pub fn is_empty(&self) -> bool;
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn pops_in_insertion_order() {
        let queue = TrackQueue::default();
        for i in 0..5 {
            queue.push(i);
        }

        let mut popped = Vec::new();
        while let Some(i) = queue.pop_timeout(Duration::from_millis(10)).await {
            popped.push(i);
        }

        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_on_empty_queue() {
        let queue: TrackQueue<u8> = TrackQueue::default();
        assert_eq!(queue.pop_timeout(Duration::from_secs(900)).await, None);
    }

    #[tokio::test]
    async fn waiting_pop_wakes_on_push() {
        let queue = Arc::new(TrackQueue::default());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push("late");

        assert_eq!(consumer.await.unwrap(), "late");
    }

    #[tokio::test]
    async fn clear_leaves_popped_items_alone() {
        let queue = TrackQueue::default();
        queue.push(String::from("a"));
        queue.push(String::from("b"));
        queue.push(String::from("c"));

        let first = queue.pop().await;
        queue.clear();

        assert_eq!(first, "a");
        assert!(queue.is_empty());
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pushes_are_all_kept() {
        let queue = Arc::new(TrackQueue::default());

        let producers: Vec<_> = (0..8)
            .map(|p| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        queue.push((p, i));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        // Each producer's items keep their relative order.
        let items = queue.map_pending(|item| *item);
        assert_eq!(items.len(), 800);
        for p in 0..8 {
            let from_p: Vec<_> = items.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
            assert_eq!(from_p, (0..100).collect::<Vec<_>>());
        }
    }
}
