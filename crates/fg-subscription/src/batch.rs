// SPDX-License-Identifier: MIT OR Apache-2.0
//! Coalesces concurrent fetch requests into a single `load` call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fg_model::Reference;
use fg_retry::CancellationToken;
use tokio::sync::Mutex;

struct PendingBatch {
    refs: Mutex<BTreeSet<Reference>>,
    fired: CancellationToken,
}

/// Accumulates unique fact references from concurrent fetches and fires
/// once per window, so that many near-simultaneous callers share one
/// network `load`. Only one batch is open at a time; additions that arrive
/// after a batch has fired start a new one.
pub struct LoadBatch {
    window: Duration,
    current: Arc<Mutex<Option<Arc<PendingBatch>>>>,
}

impl LoadBatch {
    /// A batch that fires `window` after its first addition, or sooner if
    /// [`Self::force`] is called.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Add `refs` to the open batch (starting one if none is open), then
    /// wait for it to fire. Returns every reference accumulated by the
    /// batch this call joined, not just the ones it contributed.
    pub async fn enqueue(&self, refs: impl IntoIterator<Item = Reference>) -> Vec<Reference> {
        let batch = self.open_or_join().await;
        batch.refs.lock().await.extend(refs);
        batch.fired.cancelled().await;
        let result = batch.refs.lock().await.iter().cloned().collect();
        result
    }

    /// Fire the currently-open batch immediately, if one is open.
    pub async fn force(&self) {
        let mut slot = self.current.lock().await;
        if let Some(batch) = slot.take() {
            drop(slot);
            batch.fired.cancel();
        }
    }

    async fn open_or_join(&self) -> Arc<PendingBatch> {
        let mut slot = self.current.lock().await;
        if let Some(existing) = slot.as_ref() {
            return existing.clone();
        }

        let fresh = Arc::new(PendingBatch {
            refs: Mutex::new(BTreeSet::new()),
            fired: CancellationToken::new(),
        });
        *slot = Some(fresh.clone());
        drop(slot);

        let current = self.current.clone();
        let window = self.window;
        let timer_batch = fresh.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut slot = current.lock().await;
            if let Some(open) = slot.as_ref() {
                if Arc::ptr_eq(open, &timer_batch) {
                    *slot = None;
                }
            }
            drop(slot);
            timer_batch.fired.cancel();
        });

        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reference(hash: &str) -> Reference {
        Reference::new("Fact", hash)
    }

    #[tokio::test]
    async fn concurrent_enqueues_within_the_window_share_one_flush() {
        let batch = Arc::new(LoadBatch::new(Duration::from_millis(50)));
        let flushes = Arc::new(AtomicUsize::new(0));

        let b1 = batch.clone();
        let f1 = flushes.clone();
        let t1 = tokio::spawn(async move {
            let merged = b1.enqueue([reference("a")]).await;
            f1.fetch_add(1, Ordering::SeqCst);
            merged
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let b2 = batch.clone();
        let f2 = flushes.clone();
        let t2 = tokio::spawn(async move {
            let merged = b2.enqueue([reference("b")]).await;
            f2.fetch_add(1, Ordering::SeqCst);
            merged
        });

        let (merged_a, merged_b) = tokio::join!(t1, t2);
        let merged_a = merged_a.unwrap();
        let merged_b = merged_b.unwrap();
        assert_eq!(merged_a, merged_b);
        assert_eq!(merged_a.len(), 2);
        assert_eq!(flushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn additions_after_a_flush_start_a_new_batch() {
        let batch = LoadBatch::new(Duration::from_millis(20));
        let first = batch.enqueue([reference("a")]).await;
        assert_eq!(first, vec![reference("a")]);

        let second = batch.enqueue([reference("b")]).await;
        assert_eq!(second, vec![reference("b")]);
    }

    #[tokio::test]
    async fn force_fires_before_the_window_elapses() {
        let batch = Arc::new(LoadBatch::new(Duration::from_secs(3600)));
        let b = batch.clone();
        let handle = tokio::spawn(async move { b.enqueue([reference("a")]).await });
        tokio::task::yield_now().await;
        batch.force().await;
        let merged = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("force should fire the batch without waiting out the window")
            .unwrap();
        assert_eq!(merged, vec![reference("a")]);
    }
}
