// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fact, field values, predecessor references, and fact references.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canon::hash_of;

/// A primitive field value. Facts restrict fields to JSON primitives —
/// arrays and nested objects are not representable, since the canonical
/// encoding (and therefore the hash) is only defined over this set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number, preserved in integer or floating form as given.
    Number(serde_json::Number),
    /// JSON string.
    String(String),
}

/// Identity of a fact: its declared type and content-addressed hash.
///
/// Two references are equal iff both fields are equal; this is a purely
/// structural comparison, independent of whether either side's fact is
/// actually loaded anywhere.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Application-defined kind, e.g. `"Blog.Post"`.
    #[serde(rename = "type")]
    pub fact_type: String,
    /// Base64 SHA-512 of the canonical encoding of the referenced fact.
    pub hash: String,
}

impl Reference {
    /// Construct a reference directly from its parts.
    pub fn new(fact_type: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            fact_type: fact_type.into(),
            hash: hash.into(),
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.fact_type, self.hash)
    }
}

/// The value bound to a predecessor role: either a single fact reference or
/// an ordered, insertion-preserving sequence of references. Each role's
/// arity is fixed per fact type by the application, not by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredecessorValue {
    /// A single-valued role.
    Single(Reference),
    /// A multi-valued role; order is significant and part of the hash.
    Many(Vec<Reference>),
}

impl PredecessorValue {
    /// All references carried by this value, in order.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Self::Single(r) => vec![r],
            Self::Many(rs) => rs.iter().collect(),
        }
    }
}

/// Error produced while constructing a [`Fact`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum FactError {
    /// `type` was empty.
    #[error("fact type must not be empty")]
    EmptyType,
}

/// An immutable, content-addressed record.
///
/// A `Fact`'s `hash` is a pure function of its `fields` and `predecessors`
/// (see [`crate::canon`]); it is computed once at construction and never
/// recomputed implicitly, so that `(fact_type, hash)` is stable for the
/// lifetime of the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(rename = "type")]
    fact_type: String,
    fields: BTreeMap<String, FieldValue>,
    predecessors: BTreeMap<String, PredecessorValue>,
    hash: String,
}

impl Fact {
    /// Construct a new fact, computing its canonical hash.
    ///
    /// # Errors
    ///
    /// Returns [`FactError::EmptyType`] if `fact_type` is empty.
    pub fn new(
        fact_type: impl Into<String>,
        fields: BTreeMap<String, FieldValue>,
        predecessors: BTreeMap<String, PredecessorValue>,
    ) -> Result<Self, FactError> {
        let fact_type = fact_type.into();
        if fact_type.is_empty() {
            return Err(FactError::EmptyType);
        }
        let hash = hash_of(&fields, &predecessors);
        Ok(Self {
            fact_type,
            fields,
            predecessors,
            hash,
        })
    }

    /// Reconstruct a fact from parts whose hash is already known — used by
    /// the graph decoder, which recomputes and verifies the hash itself
    /// rather than trusting this constructor.
    pub fn from_parts(
        fact_type: impl Into<String>,
        fields: BTreeMap<String, FieldValue>,
        predecessors: BTreeMap<String, PredecessorValue>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            fact_type: fact_type.into(),
            fields,
            predecessors,
            hash: hash.into(),
        }
    }

    /// The fact's declared type.
    #[must_use]
    pub fn fact_type(&self) -> &str {
        &self.fact_type
    }

    /// The fact's fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// The fact's predecessors.
    #[must_use]
    pub fn predecessors(&self) -> &BTreeMap<String, PredecessorValue> {
        &self.predecessors
    }

    /// The fact's content hash.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// This fact's identity as a [`Reference`].
    #[must_use]
    pub fn reference(&self) -> Reference {
        Reference::new(self.fact_type.clone(), self.hash.clone())
    }

    /// Recompute the canonical hash from `fields`/`predecessors` and compare
    /// it against the declared [`Self::hash`].
    #[must_use]
    pub fn hash_is_valid(&self) -> bool {
        hash_of(&self.fields, &self.predecessors) == self.hash
    }

    /// All predecessor references across every role, in role-sorted,
    /// then sequence order (the order `predecessors` iterates in, since it
    /// is a `BTreeMap`).
    pub fn predecessor_references(&self) -> Vec<&Reference> {
        self.predecessors
            .values()
            .flat_map(PredecessorValue::references)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn empty_type_is_rejected() {
        let err = Fact::new("", BTreeMap::new(), BTreeMap::new()).unwrap_err();
        assert!(matches!(err, FactError::EmptyType));
    }

    #[test]
    fn hash_is_pure_function_of_fields_and_predecessors() {
        let f1 = Fact::new(
            "Msg",
            fields(&[("text", FieldValue::String("hi".into()))]),
            BTreeMap::new(),
        )
        .unwrap();
        let f2 = Fact::new(
            "Msg",
            fields(&[("text", FieldValue::String("hi".into()))]),
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(f1.hash(), f2.hash());

        let f3 = Fact::new(
            "Msg",
            fields(&[("text", FieldValue::String("bye".into()))]),
            BTreeMap::new(),
        )
        .unwrap();
        assert_ne!(f1.hash(), f3.hash());
    }

    #[test]
    fn hash_is_independent_of_insertion_order() {
        let a = fields(&[
            ("a", FieldValue::Number(1.into())),
            ("b", FieldValue::Number(2.into())),
        ]);
        let b = fields(&[
            ("b", FieldValue::Number(2.into())),
            ("a", FieldValue::Number(1.into())),
        ]);
        let f1 = Fact::new("T", a, BTreeMap::new()).unwrap();
        let f2 = Fact::new("T", b, BTreeMap::new()).unwrap();
        assert_eq!(f1.hash(), f2.hash());
    }

    #[test]
    fn multi_valued_role_order_affects_hash() {
        let r1 = Reference::new("A", "h1");
        let r2 = Reference::new("A", "h2");
        let mut p1 = BTreeMap::new();
        p1.insert(
            "items".to_string(),
            PredecessorValue::Many(vec![r1.clone(), r2.clone()]),
        );
        let mut p2 = BTreeMap::new();
        p2.insert("items".to_string(), PredecessorValue::Many(vec![r2, r1]));

        let f1 = Fact::new("T", BTreeMap::new(), p1).unwrap();
        let f2 = Fact::new("T", BTreeMap::new(), p2).unwrap();
        assert_ne!(f1.hash(), f2.hash());
    }

    #[test]
    fn hash_is_valid_detects_tampering() {
        let f = Fact::new(
            "Msg",
            fields(&[("text", FieldValue::String("hi".into()))]),
            BTreeMap::new(),
        )
        .unwrap();
        assert!(f.hash_is_valid());

        let tampered = Fact::from_parts(
            f.fact_type().to_string(),
            f.fields().clone(),
            f.predecessors().clone(),
            "not-the-real-hash",
        );
        assert!(!tampered.hash_is_valid());
    }
}
