// =============================================================================
// FanoutHub — bounded per-subscriber queues with drop-oldest back-pressure
// =============================================================================
//
// Each subscriber owns a bounded queue. When a publish finds a queue full,
// the *oldest* buffered item is dropped (never the newest) and the drop is
// counted, per subscriber and hub-wide, so the health snapshot can surface
// slow consumers. Publishing never blocks the ingestion thread.
//
// Receivers drain asynchronously via `recv()`; `close()` wakes every
// receiver and makes `recv()` return `None` once its queue is empty.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::trace;

struct Slot<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    dropped: AtomicU64,
}

struct HubInner<T> {
    subscribers: RwLock<Vec<Arc<Slot<T>>>>,
    capacity: usize,
    dropped_total: AtomicU64,
    closed: AtomicBool,
}

pub struct FanoutHub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T: Clone> FanoutHub<T> {
    /// A hub whose subscribers each buffer at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(Vec::new()),
                capacity: capacity.max(1),
                dropped_total: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a new subscriber and return its receiving half.
    pub fn subscribe(&self) -> Subscription<T> {
        let slot = Arc::new(Slot {
            queue: Mutex::new(VecDeque::with_capacity(self.inner.capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        self.inner.subscribers.write().push(slot.clone());
        Subscription {
            slot,
            hub: self.inner.clone(),
        }
    }

    /// Deliver `item` to every subscriber, dropping each full queue's oldest
    /// entry first.
    pub fn publish(&self, item: T) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let subscribers = self.inner.subscribers.read();
        for slot in subscribers.iter() {
            let mut queue = slot.queue.lock();
            if queue.len() >= self.inner.capacity {
                queue.pop_front();
                slot.dropped.fetch_add(1, Ordering::Relaxed);
                self.inner.dropped_total.fetch_add(1, Ordering::Relaxed);
                trace!("subscriber backlog full - oldest update dropped");
            }
            queue.push_back(item.clone());
            drop(queue);
            slot.notify.notify_one();
        }
    }

    /// Wake all receivers; once their queues drain, `recv()` returns `None`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for slot in self.inner.subscribers.read().iter() {
            slot.notify.notify_one();
        }
    }

    /// Re-arm a closed hub (engine restart). Existing subscribers whose
    /// `recv()` already returned `None` must poll again to resume.
    pub fn reopen(&self) {
        self.inner.closed.store(false, Ordering::Release);
    }

    /// Updates dropped across all subscribers since construction.
    pub fn dropped_total(&self) -> u64 {
        self.inner.dropped_total.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl<T> Clone for FanoutHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Receiving half of a hub subscription.
pub struct Subscription<T> {
    slot: Arc<Slot<T>>,
    hub: Arc<HubInner<T>>,
}

impl<T> Subscription<T> {
    /// Await the next item. Returns `None` after the hub is closed and the
    /// backlog is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(item) = self.slot.queue.lock().pop_front() {
                return Some(item);
            }
            if self.hub.closed.load(Ordering::Acquire) {
                return None;
            }
            self.slot.notify.notified().await;
        }
    }

    /// Non-blocking drain of one item.
    pub fn try_recv(&mut self) -> Option<T> {
        self.slot.queue.lock().pop_front()
    }

    /// Items this subscriber lost to back-pressure.
    pub fn dropped(&self) -> u64 {
        self.slot.dropped.load(Ordering::Relaxed)
    }

    pub fn backlog(&self) -> usize {
        self.slot.queue.lock().len()
    }
}
