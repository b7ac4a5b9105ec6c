// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-store
//!
//! Content-addressed storage for facts and their accumulated signatures,
//! plus the small amount of client-local cache state (bookmarks, MRU
//! dates) that lets a client resume a subscription or skip redundant
//! re-evaluation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fg_model::{Envelope, Reference};

/// Errors produced by a [`FactStore`] implementation.
pub mod error;
/// The default in-memory store.
pub mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

/// Storage contract for facts, envelopes, bookmarks, and the MRU cache.
///
/// Identity is always `(type, hash)` — see [`fg_model::Reference`]. `save`
/// is the only mutating operation other than [`Self::retain_ancestors`]
/// (garbage collection); it must be observable atomically per envelope, so
/// no caller ever sees a fact with only some of its signatures applied.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Insert new envelopes; for facts the store already has, merge the
    /// incoming signatures by public key instead of inserting again.
    /// Returns only the envelopes that were newly added, not the ones that
    /// only contributed merged signatures. Idempotent.
    async fn save(&self, envelopes: &[Envelope]) -> Result<Vec<Envelope>, StoreError>;

    /// The subset of `refs` already present in the store.
    async fn which_exist(&self, refs: &[Reference]) -> Result<Vec<Reference>, StoreError>;

    /// The transitive closure of fact envelopes reachable via predecessor
    /// edges from `refs`, each included exactly once, in unspecified order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownFact`] if any reference in the closure
    /// (including a starting reference) is not present.
    async fn load(&self, refs: &[Reference]) -> Result<Vec<Envelope>, StoreError>;

    /// The references bound to `reference`'s predecessor role `role`, in
    /// stored insertion order for multi-valued roles.
    async fn get_predecessors(
        &self,
        reference: &Reference,
        role: &str,
    ) -> Result<Vec<Reference>, StoreError>;

    /// References of type `successor_type` that declare `reference` as
    /// their predecessor under role `role`, in insertion order.
    async fn get_successors(
        &self,
        reference: &Reference,
        role: &str,
        successor_type: &str,
    ) -> Result<Vec<Reference>, StoreError>;

    /// The persisted cursor for `feed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownFeed`] if no bookmark has been saved.
    async fn load_bookmark(&self, feed: &str) -> Result<String, StoreError>;

    /// Persist the cursor for `feed`, skipping the write if `bookmark`
    /// already equals the stored value. Bookmarks only advance, so a
    /// same-value write is a no-op rather than a fresh mutation.
    async fn save_bookmark(&self, feed: &str, bookmark: &str) -> Result<(), StoreError>;

    /// The cached most-recently-updated timestamp for a specification hash,
    /// or `None` if never set.
    async fn get_mru_date(&self, spec_hash: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Set the cached most-recently-updated timestamp for a specification
    /// hash.
    async fn set_mru_date(&self, spec_hash: &str, date: DateTime<Utc>) -> Result<(), StoreError>;

    /// Remove every stored fact that is not in the ancestor closure of
    /// `keep`. The primitive behind a purge command: `fg_spec::purge`
    /// evaluates a trigger specification to decide which facts to keep and
    /// passes their references here. Returns the number of facts removed.
    async fn retain_ancestors(&self, keep: &[Reference]) -> Result<usize, StoreError>;
}
