// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-subscription
//!
//! Per-feed subscribers: bookmark-driven streaming from a [`Network`], load
//! batching of unknown references, and observer fan-out of newly-saved
//! envelopes. A [`SubscriptionManager`] maps a caller's specification to
//! its decomposed feeds and keeps one ref-counted subscriber running per
//! feed string, so overlapping subscriptions share a connection.

pub mod batch;
pub mod error;
pub mod manager;
pub mod network;
pub mod subscriber;

pub use batch::LoadBatch;
pub use error::SubscriptionError;
pub use manager::{Subscription, SubscriptionManager};
pub use network::{FeedChunk, Network, NetworkError};
pub use subscriber::Subscriber;
