// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-distribution
//!
//! Decides which principals may receive a requested specification's
//! results: decomposes the request into feeds, finds share rules that
//! subsume each feed, and evaluates an intersection specification joining
//! the feed with the rule's audience to decide admission.

/// Distribution error taxonomy.
pub mod error;
/// Feed subsumption and the admit/deny decision.
pub mod engine;
/// Share rules and their audience.
pub mod types;

pub use engine::DistributionEngine;
pub use error::{DenialDetail, DistributionError};
pub use types::{Admitted, ShareRule, WithSpec};
