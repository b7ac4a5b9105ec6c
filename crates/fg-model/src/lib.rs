// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-model
//!
//! The fact graph data model: immutable, content-addressed facts, their
//! canonical encoding and hash, and the envelope (fact + signature set)
//! that the rest of the client passes around.

/// Canonical serialization and hashing of `(fields, predecessors)` pairs.
pub mod canon;
/// Envelopes: a fact paired with its accumulated signature set.
pub mod envelope;
/// Facts, field values, predecessor references, and fact references.
pub mod fact;

pub use envelope::{Envelope, Signature};
pub use fact::{Fact, FactError, FieldValue, PredecessorValue, Reference};
