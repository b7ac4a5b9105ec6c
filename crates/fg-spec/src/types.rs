// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `(given, matches, projection)` specification AST.
//!
//! Every sum type here uses a tagged enum rather than trait-object dispatch:
//! conditions are `{path, existential}`, projections are
//! `{fact, tuple, composite, collection}`. The AST is small and closed, so a
//! match over a handful of variants reads better than a vtable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A predecessor-role walk rooted at a bound label: `label[role1,role2,…]`.
/// An empty `role_path` resolves to the label's own reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathExpression {
    /// The label this walk starts from.
    pub label: String,
    /// Predecessor roles to walk, in order.
    pub role_path: Vec<String>,
}

impl PathExpression {
    /// A path expression referring to a label's own reference.
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            role_path: Vec::new(),
        }
    }

    /// A path expression walking `role_path` predecessor roles from `label`.
    #[must_use]
    pub fn walk(label: impl Into<String>, role_path: impl IntoIterator<Item = String>) -> Self {
        Self {
            label: label.into(),
            role_path: role_path.into_iter().collect(),
        }
    }
}

/// `labelLeft[roles…] = labelRight[roles…]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCondition {
    /// Left-hand walk.
    pub left: PathExpression,
    /// Right-hand walk.
    pub right: PathExpression,
}

/// Whether an existential condition requires a non-empty or empty nested
/// result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    /// At least one tuple must satisfy the nested matches.
    Exists,
    /// No tuple may satisfy the nested matches.
    NotExists,
}

/// A recursive `(exists|notExists, matches)` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Which existential quantifier this condition checks.
    pub kind: ConditionKind,
    /// The nested matches evaluated in the scope of the label this
    /// condition is attached to.
    pub matches: Vec<Match>,
}

/// One condition attached to a [`Match`]: either a path equation or a
/// nested existential block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MatchCondition {
    /// A path equation between two bound-label walks.
    Path(PathCondition),
    /// A nested existential block.
    Existential(Condition),
}

/// `(unknownLabel, unknownType, conditions)` — one step of match expansion.
/// Introduces `unknown` as a new label bound to a fact of `unknown_type`,
/// constrained by `conditions`. At least one [`MatchCondition::Path`] must
/// anchor `unknown` to already-bound context, since the store can only
/// traverse edges, not enumerate every fact of a type. The anchor can run
/// in either direction: a single predecessor role on `unknown`'s own side
/// pointing at bound context (resolved by successor enumeration), or a
/// (possibly multi-hop) predecessor role on the bound side reaching
/// `unknown` directly (resolved by a deterministic predecessor walk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// The label this match introduces.
    pub unknown: String,
    /// The fact type the new label is constrained to.
    pub unknown_type: String,
    /// Path and existential conditions narrowing the candidate set.
    pub conditions: Vec<MatchCondition>,
}

/// `(label, type, conditions)` — a root of the specification, bound to a
/// concrete reference by the caller of [`crate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GivenDeclaration {
    /// The label name.
    pub label: String,
    /// The fact type this label's reference must have.
    pub fact_type: String,
    /// Existential conditions evaluated before any match runs. If any
    /// fails, the whole specification yields an empty result.
    pub conditions: Vec<Condition>,
}

/// The shape of a specification's output: fact labels, tuples, named
/// composites, and nested collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Projection {
    /// Emit the `(type, hash)` of a single bound label.
    Fact(String),
    /// Emit an ordered tuple of bound labels' `(type, hash)`.
    Tuple(Vec<String>),
    /// Emit a named object, each field its own projection.
    Composite(BTreeMap<String, Projection>),
    /// Emit an ordered sequence: re-run `matches` scoped to `label`, then
    /// project each resulting tuple with `projection`.
    Collection {
        /// The label nested matches are scoped under (must already be
        /// bound at the point this projection runs).
        label: String,
        /// Matches run relative to `label`'s binding.
        matches: Vec<Match>,
        /// Projection applied to each resulting tuple.
        projection: Box<Projection>,
    },
}

/// A complete `(given, matches, projection)` specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    /// Roots bound by the caller.
    pub given: Vec<GivenDeclaration>,
    /// Ordered match-expansion steps.
    pub matches: Vec<Match>,
    /// Output shape.
    pub projection: Projection,
}

/// A fully-bound tuple of labels produced by match expansion, keyed by
/// label name.
pub type Bindings = BTreeMap<String, fg_model::Reference>;

/// The result of projecting one bound tuple — the output half of
/// [`Projection`]'s sum type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Projected {
    /// A single fact reference.
    Fact(fg_model::Reference),
    /// An ordered tuple of projected values.
    Tuple(Vec<Projected>),
    /// A named object of projected values.
    Composite(BTreeMap<String, Projected>),
    /// An ordered sequence of projected values.
    Collection(Vec<Projected>),
}
