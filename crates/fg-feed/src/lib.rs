// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! fg-feed
//!
//! Decomposes a specification into **feeds**: linear chains of matches with
//! at most one existential branch point, joined so that the union of the
//! feeds' fact-reference sequences reproduces the original specification's
//! result. Feeds are identified by a deterministic, stable textual
//! description — the feed string a client persists a bookmark against.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use fg_spec::{ConditionKind, GivenDeclaration, Match, MatchCondition, Specification};
use sha2::{Digest, Sha512};

/// One decomposed, linear-chain feed: the given roots plus a match chain
/// with its existential sub-blocks stripped (each sub-block instead became
/// its own feed, built on an ancestor chain that includes this one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// The specification's given roots, unchanged.
    pub given: Vec<GivenDeclaration>,
    /// The linear match chain this feed pulls.
    pub matches: Vec<Match>,
}

impl Feed {
    /// The feed's stable textual description: one line per given root
    /// (sorted by label), one line per match in chain order, with each
    /// match's path conditions sorted lexicographically beneath it. Two
    /// feeds derived from equivalent specifications produce byte-identical
    /// descriptions.
    #[must_use]
    pub fn description(&self) -> String {
        let mut lines = Vec::new();

        let mut given_lines: Vec<String> = self
            .given
            .iter()
            .map(|g| format!("given {}:{}", g.label, g.fact_type))
            .collect();
        given_lines.sort();
        lines.extend(given_lines);

        for m in &self.matches {
            lines.push(format!("match {}:{}", m.unknown, m.unknown_type));
            let mut path_lines: Vec<String> = m
                .conditions
                .iter()
                .filter_map(|c| match c {
                    MatchCondition::Path(p) => Some(format!(
                        "  {}[{}]={}[{}]",
                        p.left.label,
                        p.left.role_path.join("."),
                        p.right.label,
                        p.right.role_path.join(".")
                    )),
                    MatchCondition::Existential(_) => None,
                })
                .collect();
            path_lines.sort();
            lines.extend(path_lines);
        }

        lines.join("\n")
    }

    /// The feed string used as bookmark/cache key: base64 SHA-512 of
    /// [`Self::description`], stable across processes.
    #[must_use]
    pub fn feed_string(&self) -> String {
        let digest = Sha512::digest(self.description().as_bytes());
        BASE64.encode(digest)
    }
}

/// Strip a match's existential conditions, keeping only its path
/// conditions — the shape a linear-chain feed carries inline.
fn strip_existentials(m: &Match) -> Match {
    Match {
        unknown: m.unknown.clone(),
        unknown_type: m.unknown_type.clone(),
        conditions: m
            .conditions
            .iter()
            .filter(|c| matches!(c, MatchCondition::Path(_)))
            .cloned()
            .collect(),
    }
}

/// Decompose `spec` into its feeds: one feed for the top-level match chain,
/// plus one recursively-decomposed feed per existential sub-block
/// encountered at any nesting level.
#[must_use]
pub fn build_feeds(spec: &Specification) -> Vec<Feed> {
    let mut out = Vec::new();
    collect_feeds(&spec.given, &[], &spec.matches, &mut out);
    out
}

fn collect_feeds(
    given: &[GivenDeclaration],
    ancestor: &[Match],
    remaining: &[Match],
    out: &mut Vec<Feed>,
) {
    let mut chain = ancestor.to_vec();
    for m in remaining {
        chain.push(strip_existentials(m));
        for condition in &m.conditions {
            if let MatchCondition::Existential(block) = condition {
                debug_assert!(matches!(block.kind, ConditionKind::Exists | ConditionKind::NotExists));
                collect_feeds(given, &chain, &block.matches, out);
            }
        }
    }
    out.push(Feed {
        given: given.to_vec(),
        matches: chain,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_spec::{PathCondition, PathExpression};

    fn blog_given() -> GivenDeclaration {
        GivenDeclaration {
            label: "b".to_string(),
            fact_type: "Blog".to_string(),
            conditions: Vec::new(),
        }
    }

    fn post_match() -> Match {
        Match {
            unknown: "p".to_string(),
            unknown_type: "Post".to_string(),
            conditions: vec![MatchCondition::Path(PathCondition {
                left: PathExpression::walk("p", ["blog".to_string()]),
                right: PathExpression::label("b"),
            })],
        }
    }

    #[test]
    fn a_specification_with_no_existentials_yields_one_feed() {
        let spec = Specification {
            given: vec![blog_given()],
            matches: vec![post_match()],
            projection: fg_spec::Projection::Fact("p".to_string()),
        };
        let feeds = build_feeds(&spec);
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].matches.len(), 1);
    }

    #[test]
    fn an_existential_sub_block_spawns_a_second_feed() {
        let mut with_deletion_check = post_match();
        with_deletion_check.conditions.push(MatchCondition::Existential(
            fg_spec::Condition {
                kind: ConditionKind::NotExists,
                matches: vec![Match {
                    unknown: "d".to_string(),
                    unknown_type: "Post.Deleted".to_string(),
                    conditions: vec![MatchCondition::Path(PathCondition {
                        left: PathExpression::walk("d", ["post".to_string()]),
                        right: PathExpression::label("p"),
                    })],
                }],
            },
        ));
        let spec = Specification {
            given: vec![blog_given()],
            matches: vec![with_deletion_check],
            projection: fg_spec::Projection::Fact("p".to_string()),
        };
        let feeds = build_feeds(&spec);
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].matches.len(), 1); // the main chain, existential stripped
        assert_eq!(feeds[1].matches.len(), 2); // ancestor chain + deletion match
    }

    #[test]
    fn feed_strings_are_deterministic_for_equivalent_specifications() {
        let spec_a = Specification {
            given: vec![blog_given()],
            matches: vec![post_match()],
            projection: fg_spec::Projection::Fact("p".to_string()),
        };
        let spec_b = spec_a.clone();
        let feed_a = &build_feeds(&spec_a)[0];
        let feed_b = &build_feeds(&spec_b)[0];
        assert_eq!(feed_a.feed_string(), feed_b.feed_string());
    }
}
