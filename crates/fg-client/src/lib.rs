// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-client
//!
//! The top-level facade: wires the canonicalizer/signer (`fg-crypto`,
//! `fg-model`), the local store (`fg-store`), the specification evaluator
//! and feed/inverse derivation (`fg-spec`, `fg-feed`, `fg-inverse`), the
//! authorization and distribution engines (`fg-authz`, `fg-distribution`),
//! and the resilient network layer (`fg-subscription`, `fg-transport`)
//! into one authoring/query/subscribe API for an embedding application.

/// The client facade and its configuration.
pub mod client;
/// Unified client error type.
pub mod error;

pub use client::{ClientConfig, Delta, FactGraphClient, Watch};
pub use error::ClientError;
