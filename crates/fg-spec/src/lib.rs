// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-spec
//!
//! Evaluates `(given, matches, projection)` specifications against a fact
//! store: given-condition early filtering, predecessor/successor match
//! expansion, existential pruning, and recursive projection.

/// Evaluator error taxonomy.
pub mod error;
/// Core evaluation: given-conditions, match expansion, projection.
pub mod evaluator;
/// The specification AST.
pub mod types;

pub use error::EvalError;
pub use evaluator::{evaluate, purge};
pub use types::{
    Bindings, Condition, ConditionKind, GivenDeclaration, Match, MatchCondition, PathCondition,
    PathExpression, Projected, Projection, Specification,
};
