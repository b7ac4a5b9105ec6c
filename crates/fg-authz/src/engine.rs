// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rule registration and authorized-population computation.

use std::collections::BTreeSet;

use fg_model::{Fact, Reference};
use fg_spec::{MatchCondition, Projection, Specification};
use fg_store::FactStore;

use crate::error::AuthzError;
use crate::types::{AuthorizationRule, Population, Selector};

/// Holds the registered authorization rules and computes the authorized
/// population for a candidate fact.
///
/// Unlike the general specification evaluator, a selector here is resolved
/// by direct predecessor lookup, never by successor enumeration: a write's
/// authorized population must be decidable from the candidate fact's own
/// transitive predecessor closure, without searching the rest of the store
/// for facts that might point back at it.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationEngine {
    rules: Vec<AuthorizationRule>,
}

impl AuthorizationEngine {
    /// An authorization engine with no rules; every fact type defaults to
    /// [`Population::Nobody`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidAuthorizationRule`] if `rule`'s selector
    /// is not predecessor-only: it must declare exactly one `given` root,
    /// every match must carry exactly one path condition (no existentials),
    /// each path condition must walk from already-bound context via a
    /// non-empty predecessor role to the new label (never the reverse, which
    /// would require enumerating successors), and the final projection must
    /// be a single fact label.
    pub fn add_rule(&mut self, rule: AuthorizationRule) -> Result<(), AuthzError> {
        if let Selector::Type { selector, .. } = &rule.selector {
            validate_predecessor_only(selector)?;
        }
        tracing::debug!(
            target: "factgraph.authz",
            fact_type = %rule.fact_type,
            "registered authorization rule"
        );
        self.rules.push(rule);
        Ok(())
    }

    /// Compute the authorized population for a fact of `candidate_type`
    /// identified by `candidate`.
    #[tracing::instrument(level = "debug", skip(self, store), fields(fact_type = %candidate_type))]
    pub async fn authorized_population(
        &self,
        candidate_type: &str,
        candidate: &Reference,
        store: &dyn FactStore,
    ) -> Result<Population, AuthzError> {
        let applicable: Vec<&AuthorizationRule> = self
            .rules
            .iter()
            .filter(|rule| rule.fact_type == candidate_type)
            .collect();

        if applicable.is_empty() {
            return Ok(Population::Nobody);
        }
        if applicable
            .iter()
            .any(|rule| matches!(rule.selector, Selector::Any))
        {
            return Ok(Population::Everyone);
        }

        let mut keys = BTreeSet::new();
        for rule in applicable {
            let Selector::Type { selector, .. } = &rule.selector else {
                continue;
            };
            keys.extend(resolve_selector(selector, candidate, store).await?);
        }
        Ok(Population::Some(keys))
    }

    /// Whether `signer_public_key` may author a fact under `population`.
    #[must_use]
    pub fn may_author(population: &Population, signer_public_key: &str) -> bool {
        population.permits(signer_public_key)
    }

    /// Number of registered rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn validate_predecessor_only(selector: &Specification) -> Result<(), AuthzError> {
    if selector.given.len() != 1 {
        return Err(AuthzError::InvalidAuthorizationRule(
            "selector must declare exactly one given root".to_string(),
        ));
    }
    let root = &selector.given[0].label;
    let mut known: BTreeSet<String> = BTreeSet::new();
    known.insert(root.clone());

    for m in &selector.matches {
        let [condition] = m.conditions.as_slice() else {
            return Err(AuthzError::InvalidAuthorizationRule(format!(
                "match for label '{}' must carry exactly one predecessor path condition, no existentials",
                m.unknown
            )));
        };
        let MatchCondition::Path(path) = condition else {
            return Err(AuthzError::InvalidAuthorizationRule(format!(
                "match for label '{}' must not use an existential condition",
                m.unknown
            )));
        };
        let (bound, unknown) = if path.left.label == m.unknown {
            (&path.right, &path.left)
        } else if path.right.label == m.unknown {
            (&path.left, &path.right)
        } else {
            return Err(AuthzError::InvalidAuthorizationRule(format!(
                "match for label '{}' does not reference its own unknown",
                m.unknown
            )));
        };
        if !unknown.role_path.is_empty() {
            return Err(AuthzError::InvalidAuthorizationRule(format!(
                "match for label '{}' expects a successor step; selectors must be predecessor-only",
                m.unknown
            )));
        }
        if bound.role_path.is_empty() {
            return Err(AuthzError::InvalidAuthorizationRule(format!(
                "match for label '{}' must begin with a predecessor step",
                m.unknown
            )));
        }
        if !known.contains(&bound.label) {
            return Err(AuthzError::InvalidAuthorizationRule(format!(
                "match for label '{}' walks from unbound label '{}'",
                m.unknown, bound.label
            )));
        }
        known.insert(m.unknown.clone());
    }

    match &selector.projection {
        Projection::Fact(label) if known.contains(label) => Ok(()),
        _ => Err(AuthzError::InvalidAuthorizationRule(
            "selector projection must be a single fact label reachable from the given root".to_string(),
        )),
    }
}

/// Walk `selector`'s predecessor chain from `candidate`, returning the
/// public keys of every reachable `User` fact.
async fn resolve_selector(
    selector: &Specification,
    candidate: &Reference,
    store: &dyn FactStore,
) -> Result<BTreeSet<String>, AuthzError> {
    let root = selector.given[0].label.clone();
    let mut bindings: Vec<(String, Vec<Reference>)> = vec![(root, vec![candidate.clone()])];

    for m in &selector.matches {
        let MatchCondition::Path(path) = &m.conditions[0] else {
            unreachable!("validated by add_rule")
        };
        let bound = if path.left.label == m.unknown {
            &path.right
        } else {
            &path.left
        };
        let current = bindings
            .iter()
            .find(|(label, _)| *label == bound.label)
            .map(|(_, refs)| refs.clone())
            .unwrap_or_default();

        let mut next = Vec::new();
        for reference in current {
            next.extend(walk_role_path(&reference, &bound.role_path, store).await?);
        }
        bindings.push((m.unknown.clone(), next));
    }

    let Projection::Fact(final_label) = &selector.projection else {
        unreachable!("validated by add_rule")
    };
    let refs = bindings
        .iter()
        .find(|(label, _)| label == final_label)
        .map(|(_, refs)| refs.clone())
        .unwrap_or_default();

    let mut keys = BTreeSet::new();
    for reference in refs {
        if reference.fact_type != "User" {
            continue;
        }
        if let Some(key) = load_public_key(&reference, store).await? {
            keys.insert(key);
        }
    }
    Ok(keys)
}

async fn walk_role_path(
    start: &Reference,
    role_path: &[String],
    store: &dyn FactStore,
) -> Result<Vec<Reference>, AuthzError> {
    let mut frontier = vec![start.clone()];
    for role in role_path {
        let mut expanded = Vec::new();
        for reference in &frontier {
            expanded.extend(store.get_predecessors(reference, role).await?);
        }
        frontier = expanded;
    }
    Ok(frontier)
}

async fn load_public_key(
    reference: &Reference,
    store: &dyn FactStore,
) -> Result<Option<String>, AuthzError> {
    let envelopes = store.load(std::slice::from_ref(reference)).await?;
    Ok(envelopes
        .into_iter()
        .find(|e| e.fact.reference() == *reference)
        .and_then(|e| public_key_field(&e.fact)))
}

fn public_key_field(fact: &Fact) -> Option<String> {
    match fact.fields().get("publicKey") {
        Some(fg_model::FieldValue::String(key)) => Some(key.clone()),
        _ => None,
    }
}
