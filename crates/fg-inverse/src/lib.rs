// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-inverse
//!
//! Derives, from a specification, the set of **inverses** that let a
//! subscription dispatch a newly saved fact to only the observers it can
//! possibly affect, instead of re-evaluating every live specification on
//! every save.
//!
//! A fact is never deleted, so an inverse only ever flows in one of two
//! directions: a match under no negation contributes potential additions
//! when its type appears; a match nested under a `notExists` block
//! contributes potential *removals* of tuples that used to satisfy that
//! existential, since the newly saved fact is exactly the kind of evidence
//! that flips `notExists` from true to false.

use fg_spec::{ConditionKind, Match, MatchCondition, PathCondition, Specification};

/// Whether an inverse's trigger fact grows or shrinks the observed result
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseOperation {
    /// The trigger fact can add new projection results.
    Added,
    /// The trigger fact can retract previously emitted projection results.
    Removed,
}

/// A `(predecessor-walk, operation, specification)` triple: when a fact of
/// `fact_type` is saved, walk its predecessors along `role_path` to find
/// the label it binds to; if that label is currently subscribed, re-run
/// `specification` (re-bound at that label) to recompute the affected
/// observer's results.
#[derive(Debug, Clone)]
pub struct Inverse {
    /// The fact type whose save can trigger this inverse.
    pub fact_type: String,
    /// Predecessor roles to walk from the trigger fact to reach
    /// `anchor_label`'s binding.
    pub role_path: Vec<String>,
    /// The label (a `given` root or an earlier match) this inverse's walk
    /// resolves to.
    pub anchor_label: String,
    /// Whether the trigger fact adds or removes results.
    pub operation: InverseOperation,
    /// The specification to re-run, re-bound at `anchor_label`.
    pub specification: Specification,
}

/// Derive every inverse reachable from `spec`'s match chain, including
/// those nested inside existential sub-blocks.
#[must_use]
pub fn derive_inverses(spec: &Specification) -> Vec<Inverse> {
    let mut out = Vec::new();
    collect(spec, &spec.matches, false, &mut out);
    out
}

fn collect(spec: &Specification, matches: &[Match], under_not_exists: bool, out: &mut Vec<Inverse>) {
    for m in matches {
        if let Some((anchor_label, role_path)) = anchor_walk(m) {
            let operation = if under_not_exists {
                InverseOperation::Removed
            } else {
                InverseOperation::Added
            };
            out.push(Inverse {
                fact_type: m.unknown_type.clone(),
                role_path,
                anchor_label,
                operation,
                specification: spec.clone(),
            });
        }
        for condition in &m.conditions {
            if let MatchCondition::Existential(block) = condition {
                let nested_under_not_exists = matches!(block.kind, ConditionKind::NotExists);
                collect(spec, &block.matches, nested_under_not_exists, out);
            }
        }
    }
}

/// Find the predecessor walk from `m.unknown` to some other label, using
/// the same single-condition convention as the evaluator's anchor search:
/// the first path condition where one side is `m.unknown` and the other
/// side is a bare label reference (no role path of its own).
fn anchor_walk(m: &Match) -> Option<(String, Vec<String>)> {
    for condition in &m.conditions {
        let MatchCondition::Path(PathCondition { left, right }) = condition else {
            continue;
        };
        if left.label == m.unknown && right.role_path.is_empty() {
            return Some((right.label.clone(), left.role_path.clone()));
        }
        if right.label == m.unknown && left.role_path.is_empty() {
            return Some((left.label.clone(), right.role_path.clone()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_spec::{Condition, GivenDeclaration, PathExpression, Projection};

    fn blog_post_spec() -> Specification {
        Specification {
            given: vec![GivenDeclaration {
                label: "b".to_string(),
                fact_type: "Blog".to_string(),
                conditions: Vec::new(),
            }],
            matches: vec![Match {
                unknown: "p".to_string(),
                unknown_type: "Post".to_string(),
                conditions: vec![MatchCondition::Path(PathCondition {
                    left: PathExpression::walk("p", ["blog".to_string()]),
                    right: PathExpression::label("b"),
                })],
            }],
            projection: Projection::Fact("p".to_string()),
        }
    }

    #[test]
    fn a_plain_match_yields_one_added_inverse() {
        let inverses = derive_inverses(&blog_post_spec());
        assert_eq!(inverses.len(), 1);
        assert_eq!(inverses[0].fact_type, "Post");
        assert_eq!(inverses[0].role_path, vec!["blog".to_string()]);
        assert_eq!(inverses[0].anchor_label, "b");
        assert_eq!(inverses[0].operation, InverseOperation::Added);
    }

    #[test]
    fn a_not_exists_match_yields_a_removed_inverse() {
        let mut spec = blog_post_spec();
        spec.matches[0].conditions.push(MatchCondition::Existential(Condition {
            kind: ConditionKind::NotExists,
            matches: vec![Match {
                unknown: "d".to_string(),
                unknown_type: "Post.Deleted".to_string(),
                conditions: vec![MatchCondition::Path(PathCondition {
                    left: PathExpression::walk("d", ["post".to_string()]),
                    right: PathExpression::label("p"),
                })],
            }],
        }));

        let inverses = derive_inverses(&spec);
        assert_eq!(inverses.len(), 2);
        let deletion = inverses
            .iter()
            .find(|i| i.fact_type == "Post.Deleted")
            .expect("deletion inverse present");
        assert_eq!(deletion.operation, InverseOperation::Removed);
        assert_eq!(deletion.anchor_label, "p");
    }
}
