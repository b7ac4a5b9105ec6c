// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical serialization and hashing of `(fields, predecessors)` pairs.
//!
//! The canonical form is deterministic: sorted keys, stable numeric and
//! string encoding, and insertion-preserving order for multi-valued
//! predecessor roles. `serde_json`'s default `Map` is a `BTreeMap`, so
//! building a [`serde_json::Value::Object`] and serializing it already
//! produces sorted keys without any extra bookkeeping here.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};

use crate::fact::{FieldValue, PredecessorValue, Reference};

/// Separator between the canonical fields block and the canonical
/// predecessors block. Fixed for this project; any stable separator would
/// do, but it must never change once facts have been hashed with it.
pub const SEPARATOR: &str = "|";

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Number(n) => Value::Number(n.clone()),
        FieldValue::String(s) => Value::String(s.clone()),
    }
}

fn reference_to_json(reference: &Reference) -> Value {
    let mut object = Map::new();
    object.insert("hash".to_string(), Value::String(reference.hash.clone()));
    object.insert(
        "type".to_string(),
        Value::String(reference.fact_type.clone()),
    );
    Value::Object(object)
}

/// Canonical JSON encoding of a fields map: `{ "name": <value>, … }` with
/// lexicographically sorted keys.
///
/// # Examples
///
/// ```
/// use fg_model::canon::canonicalize_fields;
/// use fg_model::FieldValue;
/// use std::collections::BTreeMap;
///
/// let mut fields = BTreeMap::new();
/// fields.insert("text".to_string(), FieldValue::String("hi".to_string()));
/// assert_eq!(canonicalize_fields(&fields), r#"{"text":"hi"}"#);
/// ```
#[must_use]
pub fn canonicalize_fields(fields: &BTreeMap<String, FieldValue>) -> String {
    let mut object = Map::new();
    for (name, value) in fields {
        object.insert(name.clone(), field_value_to_json(value));
    }
    serde_json::to_string(&Value::Object(object)).expect("json values always serialize")
}

/// Canonical JSON encoding of a predecessors map: each role sorted
/// lexicographically, each value either a single reference object or a
/// JSON array of reference objects in the given order.
///
/// # Examples
///
/// ```
/// use fg_model::canon::canonicalize_predecessors;
/// use fg_model::{PredecessorValue, Reference};
/// use std::collections::BTreeMap;
///
/// let mut preds = BTreeMap::new();
/// preds.insert(
///     "blog".to_string(),
///     PredecessorValue::Single(Reference::new("Blog", "abc")),
/// );
/// assert_eq!(
///     canonicalize_predecessors(&preds),
///     r#"{"blog":{"hash":"abc","type":"Blog"}}"#
/// );
/// ```
#[must_use]
pub fn canonicalize_predecessors(predecessors: &BTreeMap<String, PredecessorValue>) -> String {
    let mut object = Map::new();
    for (role, value) in predecessors {
        let encoded = match value {
            PredecessorValue::Single(r) => reference_to_json(r),
            PredecessorValue::Many(rs) => Value::Array(rs.iter().map(reference_to_json).collect()),
        };
        object.insert(role.clone(), encoded);
    }
    serde_json::to_string(&Value::Object(object)).expect("json values always serialize")
}

/// Full canonical encoding: `canonicalize(fields) || "|" || canonicalize(predecessors)`.
#[must_use]
pub fn canonicalize(
    fields: &BTreeMap<String, FieldValue>,
    predecessors: &BTreeMap<String, PredecessorValue>,
) -> String {
    format!(
        "{}{}{}",
        canonicalize_fields(fields),
        SEPARATOR,
        canonicalize_predecessors(predecessors)
    )
}

/// Base64 SHA-512 of the canonical encoding — the fact hash.
///
/// # Examples
///
/// ```
/// use fg_model::canon::hash_of;
/// use std::collections::BTreeMap;
///
/// let h1 = hash_of(&BTreeMap::new(), &BTreeMap::new());
/// let h2 = hash_of(&BTreeMap::new(), &BTreeMap::new());
/// assert_eq!(h1, h2);
/// ```
#[must_use]
pub fn hash_of(
    fields: &BTreeMap<String, FieldValue>,
    predecessors: &BTreeMap<String, PredecessorValue>,
) -> String {
    let canonical = canonicalize(fields, predecessors);
    let digest = Sha512::digest(canonical.as_bytes());
    BASE64.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_does_not_affect_output() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), FieldValue::Number(2.into()));
        a.insert("a".to_string(), FieldValue::Number(1.into()));
        assert_eq!(canonicalize_fields(&a), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn integers_have_no_trailing_zeros() {
        let mut fields = BTreeMap::new();
        fields.insert("n".to_string(), FieldValue::Number(42.into()));
        assert_eq!(canonicalize_fields(&fields), r#"{"n":42}"#);
    }

    #[test]
    fn null_is_preserved() {
        let mut fields = BTreeMap::new();
        fields.insert("n".to_string(), FieldValue::Null);
        assert_eq!(canonicalize_fields(&fields), r#"{"n":null}"#);
    }

    #[test]
    fn many_predecessor_preserves_given_order() {
        let mut preds = BTreeMap::new();
        preds.insert(
            "items".to_string(),
            PredecessorValue::Many(vec![
                Reference::new("A", "h2"),
                Reference::new("A", "h1"),
            ]),
        );
        assert_eq!(
            canonicalize_predecessors(&preds),
            r#"{"items":[{"hash":"h2","type":"A"},{"hash":"h1","type":"A"}]}"#
        );
    }

    #[test]
    fn hash_is_base64_of_sha512_of_canonical_bytes() {
        let fields = BTreeMap::new();
        let preds = BTreeMap::new();
        let canonical = canonicalize(&fields, &preds);
        let expected = {
            let digest = Sha512::digest(canonical.as_bytes());
            BASE64.encode(digest)
        };
        assert_eq!(hash_of(&fields, &preds), expected);
    }
}
