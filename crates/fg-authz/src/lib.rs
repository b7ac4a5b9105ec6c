// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-authz
//!
//! Decides which principals may author a candidate fact. Rules map a fact
//! type to a selector: `any` permits every principal, `type(User, selector)`
//! restricts authorship to the `User` facts reachable by walking the
//! candidate's own predecessor chain.

/// Authorization error taxonomy.
pub mod error;
/// Rule registration and population computation.
pub mod engine;
/// Rules, selectors, and the computed population.
pub mod types;

pub use engine::AuthorizationEngine;
pub use error::AuthzError;
pub use types::{AuthorizationRule, Population, Selector};
