// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-retry
//!
//! Exponential-backoff retry loop, attempt metadata, and cancellation
//! tokens shared by the subscription manager and the transport — neither
//! layer rolls its own backoff math or cancellation signalling.

/// Cancellation tokens.
pub mod cancel;
/// Retry configuration, backoff computation, and attempt metadata.
pub mod config;
/// Retry error taxonomy.
pub mod error;
/// The generic retry loop.
pub mod retry;

pub use cancel::CancellationToken;
pub use config::{compute_delay, RetryAttempt, RetryConfig, RetryMetadata, RetryOutcome};
pub use error::RetryError;
pub use retry::retry_async;
