//! Debounced write-back of the dataset.
//!
//! Many mutations arriving in one burst (a reminder sweep touching dozens of
//! guilds) must produce one durable write, not one per mutation. `mark_dirty`
//! is idempotent while a flush is pending; the pending flag clears before
//! the write so a mutation racing the flush schedules a fresh one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::store::Store;

pub struct Persister {
    store: Arc<Store>,
    window: Duration,
    pending: AtomicBool,
}

impl Persister {
    pub fn new(store: Arc<Store>, window: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            window,
            pending: AtomicBool::new(false),
        })
    }

    /// Schedule a flush after the debounce window unless one is already
    /// pending. A flush failure is logged, not retried; the next
    /// `mark_dirty` schedules a fresh attempt and in-memory state stays
    /// authoritative either way.
    pub fn mark_dirty(self: &Arc<Self>) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.window).await;
            this.pending.store(false, Ordering::SeqCst);
            if let Err(e) = this.store.flush() {
                warn!("dataset flush failed: {e:#}");
            }
        });
    }
}
