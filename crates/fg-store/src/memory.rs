// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory [`FactStore`] implementation.
//!
//! Facts never get deleted except by [`MemoryStore::retain_ancestors`], so a
//! `BTreeMap` keyed by reference plus a secondary index from
//! `(predecessor, role)` to its successors (in insertion order) is enough to
//! serve every operation without re-scanning the whole store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fg_model::{Envelope, Reference};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::FactStore;

#[derive(Debug, Default)]
struct Inner {
    facts: BTreeMap<Reference, Envelope>,
    successors: BTreeMap<(Reference, String), Vec<Reference>>,
    bookmarks: BTreeMap<String, String>,
    mru_dates: BTreeMap<String, DateTime<Utc>>,
}

/// Thread-safe in-memory fact store. The default store for a freshly
/// started client; a persistent store would implement the same
/// [`FactStore`] trait backed by disk or a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FactStore for MemoryStore {
    #[tracing::instrument(level = "debug", skip(self, envelopes), fields(count = envelopes.len()))]
    async fn save(&self, envelopes: &[Envelope]) -> Result<Vec<Envelope>, StoreError> {
        let mut inner = self.inner.write().await;
        let mut added = Vec::new();

        for envelope in envelopes {
            let reference = envelope.fact.reference();
            if let Some(existing) = inner.facts.get_mut(&reference) {
                existing.merge(envelope);
                continue;
            }

            for (role, value) in envelope.fact.predecessors() {
                for predecessor in value.references() {
                    inner
                        .successors
                        .entry((predecessor.clone(), role.clone()))
                        .or_default()
                        .push(reference.clone());
                }
            }
            inner.facts.insert(reference.clone(), envelope.clone());
            added.push(envelope.clone());
        }

        tracing::debug!(target: "factgraph.store", added = added.len(), "save complete");
        Ok(added)
    }

    async fn which_exist(&self, refs: &[Reference]) -> Result<Vec<Reference>, StoreError> {
        let inner = self.inner.read().await;
        Ok(refs
            .iter()
            .filter(|r| inner.facts.contains_key(*r))
            .cloned()
            .collect())
    }

    #[tracing::instrument(level = "debug", skip(self, refs))]
    async fn load(&self, refs: &[Reference]) -> Result<Vec<Envelope>, StoreError> {
        let inner = self.inner.read().await;
        let mut seen: BTreeSet<Reference> = BTreeSet::new();
        let mut closure = Vec::new();
        let mut frontier: Vec<Reference> = refs.to_vec();

        while let Some(reference) = frontier.pop() {
            if !seen.insert(reference.clone()) {
                continue;
            }
            let envelope = inner
                .facts
                .get(&reference)
                .ok_or_else(|| StoreError::UnknownFact(reference.clone()))?;
            closure.push(envelope.clone());
            for predecessor in envelope.fact.predecessor_references() {
                if !seen.contains(predecessor) {
                    frontier.push(predecessor.clone());
                }
            }
        }

        Ok(closure)
    }

    async fn get_predecessors(
        &self,
        reference: &Reference,
        role: &str,
    ) -> Result<Vec<Reference>, StoreError> {
        let inner = self.inner.read().await;
        let envelope = inner
            .facts
            .get(reference)
            .ok_or_else(|| StoreError::UnknownFact(reference.clone()))?;
        Ok(match envelope.fact.predecessors().get(role) {
            Some(value) => value.references().into_iter().cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn get_successors(
        &self,
        reference: &Reference,
        role: &str,
        successor_type: &str,
    ) -> Result<Vec<Reference>, StoreError> {
        let inner = self.inner.read().await;
        let key = (reference.clone(), role.to_string());
        Ok(inner
            .successors
            .get(&key)
            .into_iter()
            .flatten()
            .filter(|r| r.fact_type == successor_type)
            .cloned()
            .collect())
    }

    async fn load_bookmark(&self, feed: &str) -> Result<String, StoreError> {
        let inner = self.inner.read().await;
        inner
            .bookmarks
            .get(feed)
            .cloned()
            .ok_or_else(|| StoreError::UnknownFeed(feed.to_string()))
    }

    async fn save_bookmark(&self, feed: &str, bookmark: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.bookmarks.get(feed).map(String::as_str) == Some(bookmark) {
            return Ok(());
        }
        inner.bookmarks.insert(feed.to_string(), bookmark.to_string());
        Ok(())
    }

    async fn get_mru_date(&self, spec_hash: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.mru_dates.get(spec_hash).copied())
    }

    async fn set_mru_date(&self, spec_hash: &str, date: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.mru_dates.insert(spec_hash.to_string(), date);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, keep))]
    async fn retain_ancestors(&self, keep: &[Reference]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let mut seen: BTreeSet<Reference> = BTreeSet::new();
        let mut frontier: Vec<Reference> = keep.to_vec();

        while let Some(reference) = frontier.pop() {
            if !seen.insert(reference.clone()) {
                continue;
            }
            if let Some(envelope) = inner.facts.get(&reference) {
                for predecessor in envelope.fact.predecessor_references() {
                    frontier.push(predecessor.clone());
                }
            }
        }

        let before = inner.facts.len();
        inner.facts.retain(|reference, _| seen.contains(reference));
        inner
            .successors
            .retain(|(predecessor, _), successors| {
                successors.retain(|s| seen.contains(s));
                seen.contains(predecessor) && !successors.is_empty()
            });
        let removed = before - inner.facts.len();
        tracing::debug!(target: "factgraph.store", removed, "purge complete");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_model::{Fact, FieldValue, PredecessorValue};
    use std::collections::BTreeMap as Map;

    fn leaf(fact_type: &str, text: &str) -> Fact {
        let mut fields = Map::new();
        fields.insert("text".to_string(), FieldValue::String(text.to_string()));
        Fact::new(fact_type, fields, Map::new()).unwrap()
    }

    #[tokio::test]
    async fn save_is_idempotent_and_merges_signatures() {
        let store = MemoryStore::new();
        let fact = leaf("Msg", "hi");
        let e1 = Envelope::new(fact.clone(), [fg_model::Signature::new("k1", "s1")]);
        let e2 = Envelope::new(fact.clone(), [fg_model::Signature::new("k2", "s2")]);

        let added1 = store.save(&[e1]).await.unwrap();
        assert_eq!(added1.len(), 1);

        let added2 = store.save(&[e2]).await.unwrap();
        assert!(added2.is_empty());

        let loaded = store.load(&[fact.reference()]).await.unwrap();
        assert_eq!(loaded[0].signatures.len(), 2);
    }

    #[tokio::test]
    async fn load_returns_transitive_closure_without_duplicates() {
        let store = MemoryStore::new();
        let grandparent = leaf("A", "g");
        let mut parent_preds = Map::new();
        parent_preds.insert(
            "parent".to_string(),
            PredecessorValue::Single(grandparent.reference()),
        );
        let parent = Fact::new("B", Map::new(), parent_preds).unwrap();
        let mut child_preds = Map::new();
        child_preds.insert("parent".to_string(), PredecessorValue::Single(parent.reference()));
        let child = Fact::new("C", Map::new(), child_preds).unwrap();

        store
            .save(&[
                Envelope::unsigned(grandparent.clone()),
                Envelope::unsigned(parent.clone()),
                Envelope::unsigned(child.clone()),
            ])
            .await
            .unwrap();

        let closure = store.load(&[child.reference()]).await.unwrap();
        assert_eq!(closure.len(), 3);
    }

    #[tokio::test]
    async fn load_of_unknown_reference_fails() {
        let store = MemoryStore::new();
        let err = store
            .load(&[Reference::new("Missing", "nope")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownFact(_)));
    }

    #[tokio::test]
    async fn get_successors_filters_by_role_and_type() {
        let store = MemoryStore::new();
        let blog = leaf("Blog", "b");
        let mut post_preds = Map::new();
        post_preds.insert("blog".to_string(), PredecessorValue::Single(blog.reference()));
        let post = Fact::new("Post", Map::new(), post_preds).unwrap();

        store
            .save(&[Envelope::unsigned(blog.clone()), Envelope::unsigned(post.clone())])
            .await
            .unwrap();

        let successors = store
            .get_successors(&blog.reference(), "blog", "Post")
            .await
            .unwrap();
        assert_eq!(successors, vec![post.reference()]);

        let none = store
            .get_successors(&blog.reference(), "blog", "Comment")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn retain_ancestors_removes_unreachable_facts() {
        let store = MemoryStore::new();
        let kept = leaf("A", "kept");
        let mut successor_preds = Map::new();
        successor_preds.insert("a".to_string(), PredecessorValue::Single(kept.reference()));
        let to_purge = Fact::new("B", Map::new(), successor_preds).unwrap();

        store
            .save(&[Envelope::unsigned(kept.clone()), Envelope::unsigned(to_purge.clone())])
            .await
            .unwrap();

        let removed = store.retain_ancestors(&[kept.reference()]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.which_exist(&[to_purge.reference()]).await.unwrap().is_empty());
        assert_eq!(store.which_exist(&[kept.reference()]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bookmark_round_trips() {
        let store = MemoryStore::new();
        let err = store.load_bookmark("feed-1").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownFeed(_)));

        store.save_bookmark("feed-1", "bm1").await.unwrap();
        assert_eq!(store.load_bookmark("feed-1").await.unwrap(), "bm1");
    }
}
