// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authorization rules and the population they compute.

use std::collections::BTreeSet;

use fg_spec::Specification;

/// Who may author a fact of a given type.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Any principal may author a fact of this type.
    Any,
    /// Only principals whose public key is returned by `selector`, walked
    /// from the candidate fact's own predecessor closure, may author it.
    Type {
        /// The selector's declared result type; must be `"User"`.
        fact_type: String,
        /// A predecessor-only specification rooted at the candidate fact.
        /// See [`crate::engine::AuthorizationEngine::add_rule`] for the
        /// shape this must take.
        selector: Specification,
    },
}

/// A single `(factType, selector)` authorization rule.
#[derive(Debug, Clone)]
pub struct AuthorizationRule {
    /// The fact type this rule governs.
    pub fact_type: String,
    /// How the authorized population is determined.
    pub selector: Selector,
}

impl AuthorizationRule {
    /// A rule permitting any principal to author `fact_type`.
    #[must_use]
    pub fn any(fact_type: impl Into<String>) -> Self {
        Self {
            fact_type: fact_type.into(),
            selector: Selector::Any,
        }
    }

    /// A rule restricting authorship of `fact_type` to the `User` facts
    /// returned by `selector`.
    #[must_use]
    pub fn restricted_to(fact_type: impl Into<String>, selector: Specification) -> Self {
        Self {
            fact_type: fact_type.into(),
            selector: Selector::Type {
                fact_type: "User".to_string(),
                selector,
            },
        }
    }
}

/// The computed set of principals allowed to author a candidate fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Population {
    /// Every principal may author this fact.
    Everyone,
    /// Only the principals whose PEM public key is in this set.
    Some(BTreeSet<String>),
    /// No applicable rule; nobody may author this fact.
    Nobody,
}

impl Population {
    /// `true` if `public_key` is permitted to author under this population.
    #[must_use]
    pub fn permits(&self, public_key: &str) -> bool {
        match self {
            Self::Everyone => true,
            Self::Some(keys) => keys.contains(public_key),
            Self::Nobody => false,
        }
    }
}
