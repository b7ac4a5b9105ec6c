// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subscription error taxonomy.

use fg_error::{CatalogError, ErrorCode};
use fg_store::StoreError;

use crate::network::NetworkError;

/// Errors produced by a [`crate::Subscriber`] or [`crate::SubscriptionManager`].
///
/// A subscriber never gives up on its own: once the immediate retry budget
/// is spent it falls back to the periodic timer indefinitely. The only way
/// `start` fails is [`Self::StoppedBeforeStart`] — an explicit `stop()`
/// call racing the first successful exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriptionError {
    /// `stop()` was called before the subscriber's first successful
    /// exchange resolved.
    #[error("subscription stopped before it started")]
    StoppedBeforeStart,
    /// The local store rejected a save or bookmark operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A network fetch failed while applying a feed chunk.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<SubscriptionError> for CatalogError {
    fn from(err: SubscriptionError) -> Self {
        match &err {
            SubscriptionError::StoppedBeforeStart => {
                CatalogError::new(ErrorCode::Cancelled, err)
            }
            SubscriptionError::Store(inner) => CatalogError::from(inner.clone()),
            SubscriptionError::Network(inner) => CatalogError::from(inner.clone()),
        }
    }
}
