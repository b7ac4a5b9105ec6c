// SPDX-License-Identifier: MIT OR Apache-2.0
//! The network contract a subscriber streams facts through.
//!
//! Kept separate from [`fg_store::FactStore`]: the store is local and
//! synchronous-feeling (content-addressed lookups), the network is remote
//! and stream-shaped. A production embedder backs this with the resilient
//! transport; tests back it with an in-memory fake.

use async_trait::async_trait;
use fg_error::{CatalogError, ErrorCode};
use fg_model::{Envelope, Reference};
use futures::stream::BoxStream;

/// Errors produced while talking to the network.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// The underlying connection failed or was rejected.
    #[error("network error: {0}")]
    Transport(String),
    /// A request exceeded its deadline.
    #[error("request timed out")]
    Timeout,
}

impl From<NetworkError> for CatalogError {
    fn from(err: NetworkError) -> Self {
        let code = match &err {
            NetworkError::Transport(_) => ErrorCode::NetworkError,
            NetworkError::Timeout => ErrorCode::Timeout,
        };
        CatalogError::new(code, err)
    }
}

/// One chunk of a feed stream: newly-referenced facts plus the bookmark to
/// persist once they have been saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChunk {
    /// References the server reports as new since the prior bookmark.
    pub references: Vec<Reference>,
    /// The bookmark to persist after this chunk's references are saved.
    pub bookmark: String,
}

/// Remote fact retrieval and feed streaming.
#[async_trait]
pub trait Network: Send + Sync {
    /// Fetch the full envelopes for `refs`.
    async fn load(&self, refs: &[Reference]) -> Result<Vec<Envelope>, NetworkError>;

    /// Open a streaming connection for `feed`, resuming from `bookmark`.
    /// The returned stream yields one item per chunk the server pushes; it
    /// ends (or yields an error) when the connection drops.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if the connection could not be
    /// established at all.
    async fn open_feed_stream(
        &self,
        feed: &str,
        bookmark: &str,
    ) -> Result<BoxStream<'static, Result<FeedChunk, NetworkError>>, NetworkError>;
}
