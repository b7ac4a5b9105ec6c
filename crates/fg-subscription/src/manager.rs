// SPDX-License-Identifier: MIT OR Apache-2.0
//! Maps specifications to feeds and owns one [`Subscriber`] per feed.

use std::collections::HashMap;
use std::sync::Arc;

use fg_spec::Specification;
use fg_store::FactStore;
use tokio::sync::{broadcast, Mutex};

use crate::error::SubscriptionError;
use crate::network::Network;
use crate::subscriber::Subscriber;

/// A handle returned by [`SubscriptionManager::subscribe`]. Dropping it
/// does not release the underlying subscriber — call
/// [`SubscriptionManager::unsubscribe`] with the same feed string
/// explicitly, mirroring the reference-counted `addRef`/`release` contract
/// subscribers expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// The feed string this subscription covers.
    pub feed: String,
}

/// Decomposes a requested specification into feeds and maintains one
/// ref-counted [`Subscriber`] per feed string, so that two subscriptions
/// over overlapping feeds share a single streaming connection.
pub struct SubscriptionManager {
    store: Arc<dyn FactStore>,
    network: Arc<dyn Network>,
    subscribers: Mutex<HashMap<String, Arc<Subscriber>>>,
}

impl SubscriptionManager {
    /// Construct a manager backed by `store` and `network`.
    #[must_use]
    pub fn new(store: Arc<dyn FactStore>, network: Arc<dyn Network>) -> Self {
        Self {
            store,
            network,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Decompose `spec` into feeds, start (or join) a subscriber per feed,
    /// and return a handle per feed. Each returned feed's subscriber has
    /// already had `start` awaited, so the caller is guaranteed at least
    /// one successful exchange (or a [`SubscriptionError`]) before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns the first [`SubscriptionError`] encountered starting any of
    /// the decomposed feeds' subscribers; feeds already started remain
    /// running and ref-counted.
    pub async fn subscribe(
        &self,
        spec: &Specification,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let feeds = fg_feed::build_feeds(spec);
        let mut subscriptions = Vec::with_capacity(feeds.len());

        for feed in &feeds {
            let feed_string = feed.feed_string();
            let subscriber = self.get_or_create(&feed_string).await;
            subscriber.add_ref();
            subscriber.start().await?;
            subscriptions.push(Subscription { feed: feed_string });
        }
        Ok(subscriptions)
    }

    /// Release one reference to `subscription`'s feed. Stops and removes
    /// the subscriber on the last release.
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let mut subscribers = self.subscribers.lock().await;
        let Some(subscriber) = subscribers.get(&subscription.feed) else {
            return;
        };
        if subscriber.release() {
            subscriber.stop();
            subscribers.remove(&subscription.feed);
        }
    }

    /// Subscribe to saved-envelope notifications for `feed`, or `None` if
    /// no subscriber is currently running for it.
    pub async fn observe(&self, feed: &str) -> Option<broadcast::Receiver<Vec<fg_model::Envelope>>> {
        self.subscribers.lock().await.get(feed).map(|s| s.observe())
    }

    /// Number of distinct feeds with an active subscriber.
    pub async fn active_feed_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    async fn get_or_create(&self, feed_string: &str) -> Arc<Subscriber> {
        let mut subscribers = self.subscribers.lock().await;
        subscribers
            .entry(feed_string.to_string())
            .or_insert_with(|| {
                Arc::new(Subscriber::new(
                    feed_string.to_string(),
                    self.store.clone(),
                    self.network.clone(),
                ))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_spec::{GivenDeclaration, Projection};
    use fg_store::MemoryStore;
    use futures::stream;

    struct EmptyNetwork;

    #[async_trait::async_trait]
    impl Network for EmptyNetwork {
        async fn load(
            &self,
            _refs: &[fg_model::Reference],
        ) -> Result<Vec<fg_model::Envelope>, crate::network::NetworkError> {
            Ok(Vec::new())
        }

        async fn open_feed_stream(
            &self,
            _feed: &str,
            _bookmark: &str,
        ) -> Result<
            futures::stream::BoxStream<
                'static,
                Result<crate::network::FeedChunk, crate::network::NetworkError>,
            >,
            crate::network::NetworkError,
        > {
            let boxed: futures::stream::BoxStream<
                'static,
                Result<crate::network::FeedChunk, crate::network::NetworkError>,
            > = Box::pin(stream::empty());
            Ok(boxed)
        }
    }

    fn blog_post_spec() -> Specification {
        Specification {
            given: vec![GivenDeclaration {
                label: "b".to_string(),
                fact_type: "Blog".to_string(),
                conditions: Vec::new(),
            }],
            matches: Vec::new(),
            projection: Projection::Fact("b".to_string()),
        }
    }

    #[tokio::test]
    async fn subscribing_twice_to_the_same_feed_shares_one_subscriber() {
        let manager = SubscriptionManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EmptyNetwork) as Arc<dyn Network>,
        );
        let first = manager.subscribe(&blog_post_spec()).await.unwrap();
        let second = manager.subscribe(&blog_post_spec()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.active_feed_count().await, 1);
    }

    #[tokio::test]
    async fn unsubscribing_the_last_reference_removes_the_subscriber() {
        let manager = SubscriptionManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EmptyNetwork) as Arc<dyn Network>,
        );
        let subs = manager.subscribe(&blog_post_spec()).await.unwrap();
        manager.unsubscribe(&subs[0]).await;
        assert_eq!(manager.active_feed_count().await, 0);
    }
}
