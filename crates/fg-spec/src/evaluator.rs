// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluates a [`Specification`] against a [`FactStore`].

use std::collections::{BTreeMap, HashSet};

use fg_model::Reference;
use fg_store::FactStore;

use crate::error::EvalError;
use crate::types::{
    Bindings, Condition, ConditionKind, GivenDeclaration, Match, MatchCondition, PathCondition,
    PathExpression, Projected, Projection, Specification,
};

/// Evaluate `spec` with `given` bound to concrete references, returning the
/// deduplicated, ordered list of projected results.
///
/// # Errors
///
/// Returns [`EvalError::TypeMismatch`] if a given binding's type disagrees
/// with its declaration, [`EvalError::InvalidSpecification`] if a condition
/// or match is malformed, [`EvalError::UndefinedLabel`] if a path condition
/// or projection names an unbound label, or [`EvalError::Store`] if a walk
/// crosses a reference the store does not have.
#[tracing::instrument(level = "debug", skip(spec, store), fields(matches = spec.matches.len()))]
pub async fn evaluate(
    given: &BTreeMap<String, Reference>,
    spec: &Specification,
    store: &dyn FactStore,
) -> Result<Vec<Projected>, EvalError> {
    let mut bindings: Bindings = BTreeMap::new();
    for declaration in &spec.given {
        let reference = given
            .get(&declaration.label)
            .ok_or_else(|| EvalError::UndefinedLabel(declaration.label.clone()))?;
        if reference.fact_type != declaration.fact_type {
            return Err(EvalError::TypeMismatch(format!(
                "given label '{}' expected type {} but got {}",
                declaration.label, declaration.fact_type, reference.fact_type
            )));
        }
        bindings.insert(declaration.label.clone(), reference.clone());
    }

    for declaration in &spec.given {
        if !check_given_conditions(declaration, &bindings, store).await? {
            tracing::debug!(
                target: "factgraph.spec",
                label = %declaration.label,
                "given condition failed; early-filtering to empty result"
            );
            return Ok(Vec::new());
        }
    }

    let tuples = expand_matches(&spec.matches, vec![bindings], store).await?;

    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(tuples.len());
    for tuple in &tuples {
        let projected = project(tuple, &spec.projection, store).await?;
        if seen.insert(projected.clone()) {
            results.push(projected);
        }
    }
    Ok(results)
}

/// Evaluate `trigger_spec` against `store`, then remove every fact that is
/// not an ancestor of a surviving (triggering) fact — the trigger facts
/// themselves and their ancestors are preserved, and every other successor
/// is dropped. Returns the number of facts removed.
///
/// # Errors
///
/// Returns any [`EvalError`] [`evaluate`] can produce for `trigger_spec`,
/// or [`EvalError::Store`] if the store fails while computing the ancestor
/// closure.
#[tracing::instrument(level = "debug", skip(given, trigger_spec, store))]
pub async fn purge(
    given: &BTreeMap<String, Reference>,
    trigger_spec: &Specification,
    store: &dyn FactStore,
) -> Result<usize, EvalError> {
    let survivors = evaluate(given, trigger_spec, store).await?;
    let mut keep = Vec::new();
    for projected in &survivors {
        collect_references(projected, &mut keep);
    }
    Ok(store.retain_ancestors(&keep).await?)
}

fn collect_references(projected: &Projected, out: &mut Vec<Reference>) {
    match projected {
        Projected::Fact(reference) => out.push(reference.clone()),
        Projected::Tuple(values) | Projected::Collection(values) => {
            for value in values {
                collect_references(value, out);
            }
        }
        Projected::Composite(map) => {
            for value in map.values() {
                collect_references(value, out);
            }
        }
    }
}

async fn check_given_conditions(
    declaration: &GivenDeclaration,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<bool, EvalError> {
    for condition in &declaration.conditions {
        if !check_condition(condition, bindings, store).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn check_condition(
    condition: &Condition,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<bool, EvalError> {
    let tuples = expand_matches(&condition.matches, vec![bindings.clone()], store).await?;
    Ok(match condition.kind {
        ConditionKind::Exists => !tuples.is_empty(),
        ConditionKind::NotExists => tuples.is_empty(),
    })
}

/// Walk `matches` in order, expanding one partial-bindings tuple into many
/// as each match introduces its label. Cartesian expansion preserves
/// match-discovery order: ties are broken by the order candidates were
/// returned from the store, which for [`fg_store::MemoryStore`] is
/// insertion order.
async fn expand_matches(
    matches: &[Match],
    mut tuples: Vec<Bindings>,
    store: &dyn FactStore,
) -> Result<Vec<Bindings>, EvalError> {
    for m in matches {
        let mut next = Vec::new();
        for bindings in &tuples {
            next.extend(evaluate_match(m, bindings, store).await?);
        }
        tuples = next;
        if tuples.is_empty() {
            break;
        }
    }
    Ok(tuples)
}

/// How a match's unknown label was anchored to already-bound context.
enum Anchor {
    /// `unknown[role] = bound` — the unknown's own predecessor field points
    /// at already-bound context; candidates are enumerated via
    /// [`FactStore::get_successors`] since the store cannot scan by type.
    Successor(Reference, String),
    /// `bound[roles…] = unknown` — the unknown is itself a predecessor
    /// reachable from already-bound context; the walk already produced the
    /// single concrete reference, no enumeration needed.
    Predecessor(Reference),
}

async fn evaluate_match(
    m: &Match,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<Vec<Bindings>, EvalError> {
    let anchor = find_anchor(m, bindings, store).await?;
    let candidates = match anchor {
        Anchor::Successor(anchor_ref, role) => {
            store.get_successors(&anchor_ref, &role, &m.unknown_type).await?
        }
        Anchor::Predecessor(reference) => {
            if reference.fact_type != m.unknown_type {
                return Err(EvalError::TypeMismatch(format!(
                    "predecessor walk for label '{}' resolved to type {} but match expects {}",
                    m.unknown, reference.fact_type, m.unknown_type
                )));
            }
            vec![reference]
        }
    };

    let mut results = Vec::new();
    for candidate in candidates {
        let mut extended = bindings.clone();
        extended.insert(m.unknown.clone(), candidate);

        if !check_path_conditions(m, &extended, store).await? {
            continue;
        }
        if !check_existential_conditions(m, &extended, store).await? {
            continue;
        }
        results.push(extended);
    }
    Ok(results)
}

async fn find_anchor(m: &Match, bindings: &Bindings, store: &dyn FactStore) -> Result<Anchor, EvalError> {
    for condition in &m.conditions {
        let MatchCondition::Path(path) = condition else {
            continue;
        };
        if let Some(anchor) = successor_anchor(m, path, bindings, store).await? {
            return Ok(anchor);
        }
    }
    for condition in &m.conditions {
        let MatchCondition::Path(path) = condition else {
            continue;
        };
        if let Some(anchor) = predecessor_anchor(m, path, bindings, store).await? {
            return Ok(anchor);
        }
    }
    Err(EvalError::InvalidSpecification(format!(
        "match for label '{}' has no path condition anchoring it to already-bound context",
        m.unknown
    )))
}

async fn successor_anchor(
    m: &Match,
    path: &PathCondition,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<Option<Anchor>, EvalError> {
    for (unknown_side, bound_side) in [(&path.left, &path.right), (&path.right, &path.left)] {
        if unknown_side.label == m.unknown && unknown_side.role_path.len() == 1 {
            if let Ok(anchor_ref) = resolve_path(bound_side, bindings, store).await {
                return Ok(Some(Anchor::Successor(anchor_ref, unknown_side.role_path[0].clone())));
            }
        }
    }
    Ok(None)
}

/// The reverse direction: the unknown is reached by walking predecessor
/// roles *from* already-bound context, e.g. `owner = b.owner`. No
/// enumeration is possible or needed — `resolve_path` already performs
/// direct predecessor lookups.
async fn predecessor_anchor(
    m: &Match,
    path: &PathCondition,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<Option<Anchor>, EvalError> {
    for (unknown_side, bound_side) in [(&path.left, &path.right), (&path.right, &path.left)] {
        if unknown_side.label == m.unknown
            && unknown_side.role_path.is_empty()
            && !bound_side.role_path.is_empty()
        {
            if let Ok(resolved) = resolve_path(bound_side, bindings, store).await {
                return Ok(Some(Anchor::Predecessor(resolved)));
            }
        }
    }
    Ok(None)
}

async fn check_path_conditions(
    m: &Match,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<bool, EvalError> {
    for condition in &m.conditions {
        if let MatchCondition::Path(path) = condition {
            let left = resolve_path(&path.left, bindings, store).await?;
            let right = resolve_path(&path.right, bindings, store).await?;
            if left != right {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

async fn check_existential_conditions(
    m: &Match,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<bool, EvalError> {
    for condition in &m.conditions {
        if let MatchCondition::Existential(nested) = condition {
            if !Box::pin(check_condition(nested, bindings, store)).await? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Resolve a [`PathExpression`] to a concrete reference by walking
/// single-valued predecessor roles from a bound label.
async fn resolve_path(
    expr: &PathExpression,
    bindings: &Bindings,
    store: &dyn FactStore,
) -> Result<Reference, EvalError> {
    let mut current = bindings
        .get(&expr.label)
        .ok_or_else(|| EvalError::UndefinedLabel(expr.label.clone()))?
        .clone();
    for role in &expr.role_path {
        let predecessors = store.get_predecessors(&current, role).await?;
        current = match predecessors.as_slice() {
            [single] => single.clone(),
            _ => {
                return Err(EvalError::TypeMismatch(format!(
                    "role '{role}' in a path condition must be single-valued, found {} predecessors",
                    predecessors.len()
                )))
            }
        };
    }
    Ok(current)
}

fn project<'a>(
    bindings: &'a Bindings,
    projection: &'a Projection,
    store: &'a dyn FactStore,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Projected, EvalError>> + Send + 'a>> {
    Box::pin(async move {
        match projection {
            Projection::Fact(label) => {
                let reference = bindings
                    .get(label)
                    .ok_or_else(|| EvalError::UndefinedLabel(label.clone()))?;
                Ok(Projected::Fact(reference.clone()))
            }
            Projection::Tuple(labels) => {
                let mut values = Vec::with_capacity(labels.len());
                for label in labels {
                    let reference = bindings
                        .get(label)
                        .ok_or_else(|| EvalError::UndefinedLabel(label.clone()))?;
                    values.push(Projected::Fact(reference.clone()));
                }
                Ok(Projected::Tuple(values))
            }
            Projection::Composite(fields) => {
                let mut map = BTreeMap::new();
                for (name, inner) in fields {
                    map.insert(name.clone(), project(bindings, inner, store).await?);
                }
                Ok(Projected::Composite(map))
            }
            Projection::Collection {
                label,
                matches,
                projection: inner,
            } => {
                if !bindings.contains_key(label) {
                    return Err(EvalError::UndefinedLabel(label.clone()));
                }
                let tuples = expand_matches(matches, vec![bindings.clone()], store).await?;
                let mut items = Vec::with_capacity(tuples.len());
                for tuple in &tuples {
                    items.push(project(tuple, inner, store).await?);
                }
                Ok(Projected::Collection(items))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_model::{Envelope, Fact, FieldValue, PredecessorValue};
    use fg_store::MemoryStore;
    use std::collections::BTreeMap as Map;

    fn leaf(fact_type: &str) -> Fact {
        Fact::new(fact_type, Map::<String, FieldValue>::new(), Map::new()).unwrap()
    }

    fn single_pred(role: &str, reference: Reference) -> Map<String, PredecessorValue> {
        let mut preds = Map::new();
        preds.insert(role.to_string(), PredecessorValue::Single(reference));
        preds
    }

    #[tokio::test]
    async fn matches_posts_of_a_given_blog() {
        let store = MemoryStore::new();
        let blog = leaf("Blog");
        let post1 = Fact::new("Post", Map::new(), single_pred("blog", blog.reference())).unwrap();
        let post2 = Fact::new("Post", Map::new(), single_pred("blog", blog.reference())).unwrap();
        store
            .save(&[
                Envelope::unsigned(blog.clone()),
                Envelope::unsigned(post1.clone()),
                Envelope::unsigned(post2.clone()),
            ])
            .await
            .unwrap();

        let spec = Specification {
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
        };

        let mut given = Map::new();
        given.insert("b".to_string(), blog.reference());
        let results = evaluate(&given, &spec, &store).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.contains(&Projected::Fact(post1.reference())));
        assert!(results.contains(&Projected::Fact(post2.reference())));
    }

    #[tokio::test]
    async fn not_exists_condition_excludes_deleted_posts() {
        let store = MemoryStore::new();
        let blog = leaf("Blog");
        let post = Fact::new("Post", Map::new(), single_pred("blog", blog.reference())).unwrap();
        let deletion = Fact::new("Post.Deleted", Map::new(), single_pred("post", post.reference())).unwrap();
        store
            .save(&[
                Envelope::unsigned(blog.clone()),
                Envelope::unsigned(post.clone()),
                Envelope::unsigned(deletion),
            ])
            .await
            .unwrap();

        let not_deleted = Match {
            unknown: "p".to_string(),
            unknown_type: "Post".to_string(),
            conditions: vec![
                MatchCondition::Path(PathCondition {
                    left: PathExpression::walk("p", ["blog".to_string()]),
                    right: PathExpression::label("b"),
                }),
                MatchCondition::Existential(Condition {
                    kind: ConditionKind::NotExists,
                    matches: vec![Match {
                        unknown: "d".to_string(),
                        unknown_type: "Post.Deleted".to_string(),
                        conditions: vec![MatchCondition::Path(PathCondition {
                            left: PathExpression::walk("d", ["post".to_string()]),
                            right: PathExpression::label("p"),
                        })],
                    }],
                }),
            ],
        };

        let spec = Specification {
            given: vec![GivenDeclaration {
                label: "b".to_string(),
                fact_type: "Blog".to_string(),
                conditions: Vec::new(),
            }],
            matches: vec![not_deleted],
            projection: Projection::Fact("p".to_string()),
        };

        let mut given = Map::new();
        given.insert("b".to_string(), blog.reference());
        let results = evaluate(&given, &spec, &store).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn a_match_with_no_anchor_is_rejected() {
        let store = MemoryStore::new();
        let blog = leaf("Blog");
        store.save(&[Envelope::unsigned(blog.clone())]).await.unwrap();

        let spec = Specification {
            given: vec![GivenDeclaration {
                label: "b".to_string(),
                fact_type: "Blog".to_string(),
                conditions: Vec::new(),
            }],
            matches: vec![Match {
                unknown: "p".to_string(),
                unknown_type: "Post".to_string(),
                conditions: Vec::new(),
            }],
            projection: Projection::Fact("p".to_string()),
        };

        let mut given = Map::new();
        given.insert("b".to_string(), blog.reference());
        let err = evaluate(&given, &spec, &store).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidSpecification(_)));
    }

    #[tokio::test]
    async fn a_match_anchors_via_a_predecessor_walk() {
        let store = MemoryStore::new();
        let owner = leaf("User");
        let blog = Fact::new("Blog", Map::new(), single_pred("owner", owner.reference())).unwrap();
        store
            .save(&[Envelope::unsigned(owner.clone()), Envelope::unsigned(blog.clone())])
            .await
            .unwrap();

        let spec = Specification {
            given: vec![GivenDeclaration {
                label: "b".to_string(),
                fact_type: "Blog".to_string(),
                conditions: Vec::new(),
            }],
            matches: vec![Match {
                unknown: "owner".to_string(),
                unknown_type: "User".to_string(),
                conditions: vec![MatchCondition::Path(PathCondition {
                    left: PathExpression::walk("b", ["owner".to_string()]),
                    right: PathExpression::label("owner"),
                })],
            }],
            projection: Projection::Fact("owner".to_string()),
        };

        let mut given = Map::new();
        given.insert("b".to_string(), blog.reference());
        let results = evaluate(&given, &spec, &store).await.unwrap();
        assert_eq!(results, vec![Projected::Fact(owner.reference())]);
    }

    #[tokio::test]
    async fn composite_projection_emits_both_labels() {
        let store = MemoryStore::new();
        let blog = leaf("Blog");
        let post = Fact::new("Post", Map::new(), single_pred("blog", blog.reference())).unwrap();
        store
            .save(&[Envelope::unsigned(blog.clone()), Envelope::unsigned(post.clone())])
            .await
            .unwrap();

        let spec = Specification {
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
            projection: Projection::Composite(BTreeMap::from([
                ("blog".to_string(), Projection::Fact("b".to_string())),
                ("post".to_string(), Projection::Fact("p".to_string())),
            ])),
        };

        let mut given = Map::new();
        given.insert("b".to_string(), blog.reference());
        let results = evaluate(&given, &spec, &store).await.unwrap();
        assert_eq!(results.len(), 1);
        match &results[0] {
            Projected::Composite(map) => {
                assert_eq!(map["blog"], Projected::Fact(blog.reference()));
                assert_eq!(map["post"], Projected::Fact(post.reference()));
            }
            other => panic!("expected composite, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn purge_keeps_the_trigger_fact_and_removes_its_successors() {
        let store = MemoryStore::new();
        let blog = leaf("Blog");
        let post = Fact::new("Post", Map::new(), single_pred("blog", blog.reference())).unwrap();
        store
            .save(&[Envelope::unsigned(blog.clone()), Envelope::unsigned(post.clone())])
            .await
            .unwrap();

        let trigger_spec = Specification {
            given: vec![GivenDeclaration {
                label: "b".to_string(),
                fact_type: "Blog".to_string(),
                conditions: Vec::new(),
            }],
            matches: Vec::new(),
            projection: Projection::Fact("b".to_string()),
        };
        let mut given = Map::new();
        given.insert("b".to_string(), blog.reference());

        let removed = purge(&given, &trigger_spec, &store).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(&[blog.reference()]).await.is_ok());
        assert!(matches!(
            store.load(&[post.reference()]).await,
            Err(fg_store::StoreError::UnknownFact(_))
        ));
    }
}
