// SPDX-License-Identifier: MIT OR Apache-2.0
//! A single feed's streaming connection, retry policy, and observer fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fg_model::Envelope;
use fg_retry::{retry_async, CancellationToken, RetryConfig};
use fg_store::FactStore;
use futures::StreamExt;
use tokio::sync::{broadcast, oneshot, OnceCell};

use crate::batch::LoadBatch;
use crate::error::SubscriptionError;
use crate::network::{FeedChunk, Network, NetworkError};

const PERIODIC_FALLBACK: Duration = Duration::from_secs(4 * 60);
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
const OBSERVER_CHANNEL_CAPACITY: usize = 256;

/// A ref-counted, per-feed streaming subscription.
///
/// `start` resolves on the first successful exchange; the connection then
/// stays open, retrying on error with three immediate exponential backoffs
/// (1s, 2s, 4s) and falling back to a four-minute periodic retry once those
/// are exhausted. `stop` cancels the stream and any pending retry timer.
pub struct Subscriber {
    feed: String,
    ref_count: AtomicUsize,
    token: CancellationToken,
    store: Arc<dyn FactStore>,
    network: Arc<dyn Network>,
    load_batch: LoadBatch,
    observers: broadcast::Sender<Vec<Envelope>>,
    started: OnceCell<Result<(), SubscriptionError>>,
}

impl Subscriber {
    /// Construct a subscriber for `feed`, not yet started and with a
    /// reference count of zero.
    #[must_use]
    pub fn new(feed: String, store: Arc<dyn FactStore>, network: Arc<dyn Network>) -> Self {
        let (observers, _) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);
        Self {
            feed,
            ref_count: AtomicUsize::new(0),
            token: CancellationToken::new(),
            store,
            network,
            load_batch: LoadBatch::new(Duration::from_millis(100)),
            observers,
            started: OnceCell::new(),
        }
    }

    /// The feed string this subscriber serves.
    #[must_use]
    pub fn feed(&self) -> &str {
        &self.feed
    }

    /// Increment the reference count. Returns `true` on a 0→1 transition.
    pub fn add_ref(&self) -> bool {
        self.ref_count.fetch_add(1, Ordering::SeqCst) == 0
    }

    /// Decrement the reference count. Returns `true` on a 1→0 transition.
    pub fn release(&self) -> bool {
        self.ref_count.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Subscribe to saved-envelope notifications.
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<Vec<Envelope>> {
        self.observers.subscribe()
    }

    /// Begin streaming. Spawns the connection loop and waits for the first
    /// successful exchange.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::StoppedBeforeStart`] if [`Self::stop`]
    /// is called before the first exchange resolves, or whatever error
    /// exhausted both the immediate and periodic retry policies.
    pub async fn start(self: &Arc<Self>) -> Result<(), SubscriptionError> {
        self.started
            .get_or_init(|| async {
                let (tx, rx) = oneshot::channel();
                let this = self.clone();
                tokio::spawn(this.run(tx));
                rx.await.unwrap_or(Err(SubscriptionError::StoppedBeforeStart))
            })
            .await
            .clone()
    }

    /// Cancel the stream and any pending retry timer. If `start` has not
    /// yet resolved, its result becomes
    /// [`SubscriptionError::StoppedBeforeStart`].
    pub fn stop(&self) {
        self.token.cancel();
    }

    async fn run(self: Arc<Self>, started: oneshot::Sender<Result<(), SubscriptionError>>) {
        let mut started = Some(started);
        let mut bookmark = self
            .store
            .load_bookmark(&self.feed)
            .await
            .unwrap_or_default();

        loop {
            if self.token.is_cancelled() {
                if let Some(tx) = started.take() {
                    let _ = tx.send(Err(SubscriptionError::StoppedBeforeStart));
                }
                return;
            }

            match self.run_stream_once(&mut bookmark, &mut started).await {
                Ok(()) => {
                    // Stream ended cleanly (server closed). Pause for one
                    // backoff unit before reconnecting rather than hammering
                    // a server that just hung up.
                    tracing::debug!(target: "factgraph.subscription", feed = %self.feed, "stream closed, reconnecting");
                    if self.wait_or_cancelled(RECONNECT_PAUSE).await {
                        if let Some(tx) = started.take() {
                            let _ = tx.send(Err(SubscriptionError::StoppedBeforeStart));
                        }
                        return;
                    }
                }
                Err(err) => {
                    if self.token.is_cancelled() {
                        if let Some(tx) = started.take() {
                            let _ = tx.send(Err(SubscriptionError::StoppedBeforeStart));
                        }
                        return;
                    }
                    tracing::warn!(
                        target: "factgraph.subscription",
                        feed = %self.feed,
                        error = %err,
                        "stream attempt failed, entering periodic fallback"
                    );
                    if self.wait_or_cancelled(PERIODIC_FALLBACK).await {
                        if let Some(tx) = started.take() {
                            let _ = tx.send(Err(SubscriptionError::StoppedBeforeStart));
                        }
                        return;
                    }
                }
            }
        }
    }

    /// Open the feed stream (with the immediate retry policy) and consume
    /// chunks until it errors or ends.
    async fn run_stream_once(
        &self,
        bookmark: &mut String,
        started: &mut Option<oneshot::Sender<Result<(), SubscriptionError>>>,
    ) -> Result<(), NetworkError> {
        let config = RetryConfig::subscriber_immediate();
        let feed = self.feed.clone();
        let bookmark_at_open = bookmark.clone();

        let outcome = retry_async(
            &config,
            &self.token,
            || {
                let feed = feed.clone();
                let bookmark_at_open = bookmark_at_open.clone();
                async move { self.network.open_feed_stream(&feed, &bookmark_at_open).await }
            },
            |_: &NetworkError| true,
        )
        .await;

        let mut stream = match outcome {
            Ok(outcome) => outcome.value,
            Err(fg_retry::RetryError::Cancelled) => return Ok(()),
            Err(fg_retry::RetryError::RetriesExhausted(inner)) => return Err(inner),
        };

        while let Some(chunk) = stream.next().await {
            if self.token.is_cancelled() {
                return Ok(());
            }
            let chunk = chunk?;
            self.apply_chunk(chunk, bookmark)
                .await
                .map_err(|err| NetworkError::Transport(err.to_string()))?;

            if let Some(tx) = started.take() {
                let _ = tx.send(Ok(()));
            }
        }
        Ok(())
    }

    async fn apply_chunk(
        &self,
        chunk: FeedChunk,
        bookmark: &mut String,
    ) -> Result<(), SubscriptionError> {
        let existing = self.store.which_exist(&chunk.references).await?;
        let unknown: Vec<_> = chunk
            .references
            .iter()
            .filter(|r| !existing.contains(r))
            .cloned()
            .collect();

        let envelopes = if unknown.is_empty() {
            Vec::new()
        } else {
            let merged = self.load_batch.enqueue(unknown.clone()).await;
            self.network.load(&merged).await?
        };

        let saved = self.store.save(&envelopes).await?;
        // An empty bookmark means this chunk carries no cursor advance (the
        // graph-envelope half of a feed response arrives ahead of its BOOK
        // frame) — leave the previously persisted cursor alone rather than
        // clobbering it until the real bookmark follows.
        if !chunk.bookmark.is_empty() {
            self.store.save_bookmark(&self.feed, &chunk.bookmark).await?;
            *bookmark = chunk.bookmark;
        }

        if !saved.is_empty() {
            let _ = self.observers.send(saved);
        }
        Ok(())
    }

    /// Wait out `duration`, or return `true` if cancelled first.
    async fn wait_or_cancelled(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => false,
            () = self.token.cancelled() => true,
        }
    }
}
