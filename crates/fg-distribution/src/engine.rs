// SPDX-License-Identifier: MIT OR Apache-2.0
//! Feed subsumption, intersection-specification synthesis, and the
//! admit/deny decision.

use std::collections::BTreeMap;

use fg_model::Reference;
use fg_spec::{
    evaluate, GivenDeclaration, MatchCondition, PathCondition, PathExpression, Projected,
    Projection, Specification,
};
use fg_store::FactStore;

use crate::error::{DenialDetail, DistributionError};
use crate::types::{Admitted, ShareRule, WithSpec};

/// Holds the registered share rules and decides whether a requesting
/// principal may receive a requested specification's results.
#[derive(Debug, Clone)]
pub struct DistributionEngine {
    rules: Vec<ShareRule>,
    test_mode: bool,
}

impl DistributionEngine {
    /// A distribution engine with no rules. `test_mode` controls whether
    /// denial details include expected/presented principal hashes.
    #[must_use]
    pub fn new(test_mode: bool) -> Self {
        Self {
            rules: Vec::new(),
            test_mode,
        }
    }

    /// Register a share rule.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::DistributionDenied`]-shaped construction
    /// error — reused as [`fg_error::ErrorCode::DistributionDenied`] has no
    /// dedicated "invalid rule" code in the catalog — if a [`WithSpec::Users`]
    /// rule's `with` specification has no matches, or its last match does
    /// not resolve to a `User`.
    pub fn add_rule(&mut self, rule: ShareRule) -> Result<(), DistributionError> {
        if let WithSpec::Users(with_spec) = &rule.with {
            let Some(last) = with_spec.matches.last() else {
                return Err(DistributionError::DistributionDenied(DenialDetail {
                    reason: "a Users share rule's with-specification must have at least one match"
                        .to_string(),
                    expected_hashes: None,
                    user_hash: None,
                }));
            };
            if last.unknown_type != "User" {
                return Err(DistributionError::DistributionDenied(DenialDetail {
                    reason: format!(
                        "a Users share rule's with-specification must end in a User match, found {}",
                        last.unknown_type
                    ),
                    expected_hashes: None,
                    user_hash: None,
                }));
            }
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Decide whether `user` may receive `requested`'s results, given the
    /// concrete references bound to its `given` roots.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::DistributionDenied`] if any feed of
    /// `requested` has no subsuming share rule, or no share rule's
    /// intersection specification yields a non-empty result for `user`.
    #[tracing::instrument(level = "debug", skip(self, requested, given, store))]
    pub async fn check(
        &self,
        requested: &Specification,
        given: &BTreeMap<String, Reference>,
        user: &Reference,
        store: &dyn FactStore,
    ) -> Result<Admitted, DistributionError> {
        let feeds = fg_feed::build_feeds(requested);
        tracing::debug!(target: "factgraph.distribution", feed_count = feeds.len(), "decomposed requested specification");

        for feed in &feeds {
            let Some(rule) = self.rules.iter().find(|rule| subsumes(rule, feed)) else {
                return Err(DistributionError::DistributionDenied(DenialDetail {
                    reason: "no share rule subsumes this feed".to_string(),
                    expected_hashes: None,
                    user_hash: None,
                }));
            };

            let WithSpec::Users(with_spec) = &rule.with else {
                continue;
            };

            let user_label = with_spec
                .matches
                .last()
                .expect("validated in add_rule")
                .unknown
                .clone();

            let intersection = build_intersection(feed, with_spec, &user_label);
            let mut bindings = given.clone();
            bindings.insert("distributionUser".to_string(), user.clone());

            let results = evaluate(&bindings, &intersection, store).await?;
            if results.is_empty() {
                let (expected_hashes, user_hash) = if self.test_mode {
                    let expected = evaluate(given, with_spec, store)
                        .await
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|p| match p {
                            Projected::Fact(reference) => Some(reference.hash),
                            _ => None,
                        })
                        .collect();
                    (Some(expected), Some(user.hash.clone()))
                } else {
                    (None, None)
                };
                return Err(DistributionError::DistributionDenied(DenialDetail {
                    reason: "presented principal is not in the shared audience".to_string(),
                    expected_hashes,
                    user_hash,
                }));
            }
        }

        Ok(Admitted)
    }
}

fn subsumes(rule: &ShareRule, feed: &fg_feed::Feed) -> bool {
    fg_feed::build_feeds(&rule.share)
        .iter()
        .any(|shared_feed| shared_feed.feed_string() == feed.feed_string())
}

/// Join `feed`'s match chain with `with_spec`'s, adding a synthesized
/// `distributionUser` given and an equality condition pinning
/// `with_spec`'s final `User` match to it.
fn build_intersection(
    feed: &fg_feed::Feed,
    with_spec: &Specification,
    user_label: &str,
) -> Specification {
    let mut given = feed.given.clone();
    given.push(GivenDeclaration {
        label: "distributionUser".to_string(),
        fact_type: "User".to_string(),
        conditions: Vec::new(),
    });

    let mut matches = feed.matches.clone();
    let mut with_matches = with_spec.matches.clone();
    if let Some(last) = with_matches.last_mut() {
        last.conditions.push(MatchCondition::Path(PathCondition {
            left: PathExpression::label(user_label),
            right: PathExpression::label("distributionUser"),
        }));
    }
    matches.extend(with_matches);

    Specification {
        given,
        matches,
        projection: Projection::Fact(user_label.to_string()),
    }
}
