// SPDX-License-Identifier: MIT OR Apache-2.0
//! Envelopes: a fact paired with its accumulated set of signatures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fact::Fact;

/// A single signature over a fact's canonical digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// PEM-encoded RSA public key of the signing principal.
    pub public_key: String,
    /// Base64 RSA-SHA-512 signature over the fact's canonical digest.
    pub signature: String,
}

impl Signature {
    /// Construct a signature from its parts.
    pub fn new(public_key: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            signature: signature.into(),
        }
    }
}

/// A fact plus the set of signatures known for it, keyed by public key so
/// that merging two envelopes for the same fact deduplicates signatures
/// from the same signer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The fact itself.
    pub fact: Fact,
    /// Signatures over `fact`'s digest, keyed by public key.
    #[serde(
        serialize_with = "serialize_signatures",
        deserialize_with = "deserialize_signatures"
    )]
    pub signatures: BTreeMap<String, Signature>,
}

impl Envelope {
    /// Construct an envelope for a fact with no signatures yet.
    #[must_use]
    pub fn unsigned(fact: Fact) -> Self {
        Self {
            fact,
            signatures: BTreeMap::new(),
        }
    }

    /// Construct an envelope from a fact and a list of signatures,
    /// deduplicating by public key (last write wins for a given key).
    #[must_use]
    pub fn new(fact: Fact, signatures: impl IntoIterator<Item = Signature>) -> Self {
        let mut map = BTreeMap::new();
        for sig in signatures {
            map.insert(sig.public_key.clone(), sig);
        }
        Self {
            fact,
            signatures: map,
        }
    }

    /// Add a signature, replacing any prior signature from the same key.
    /// New signatures are additive at the store level — see
    /// [`Self::merge`] for how two envelopes for the *same* fact combine.
    pub fn add_signature(&mut self, signature: Signature) {
        self.signatures
            .insert(signature.public_key.clone(), signature);
    }

    /// Merge another envelope's signatures into this one. Both envelopes
    /// must describe the same fact (same `(type, hash)`); the caller is
    /// responsible for that invariant — the fact store enforces it.
    ///
    /// Returns the number of *new* signing keys contributed by `other`.
    pub fn merge(&mut self, other: &Envelope) -> usize {
        let before = self.signatures.len();
        for sig in other.signatures.values() {
            self.signatures
                .entry(sig.public_key.clone())
                .or_insert_with(|| sig.clone());
        }
        self.signatures.len() - before
    }

    /// Signatures as an ordered list (by public key).
    #[must_use]
    pub fn signature_list(&self) -> Vec<&Signature> {
        self.signatures.values().collect()
    }
}

fn serialize_signatures<S>(
    signatures: &BTreeMap<String, Signature>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let list: Vec<&Signature> = signatures.values().collect();
    list.serialize(serializer)
}

fn deserialize_signatures<'de, D>(deserializer: D) -> Result<BTreeMap<String, Signature>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let list = Vec::<Signature>::deserialize(deserializer)?;
    let mut map = BTreeMap::new();
    for sig in list {
        map.insert(sig.public_key.clone(), sig);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn sample_fact() -> Fact {
        Fact::new("Msg", Map::new(), Map::new()).unwrap()
    }

    #[test]
    fn merge_deduplicates_by_public_key() {
        let mut e1 = Envelope::new(sample_fact(), [Signature::new("k1", "sig1")]);
        let e2 = Envelope::new(sample_fact(), [Signature::new("k2", "sig2")]);

        let added = e1.merge(&e2);
        assert_eq!(added, 1);
        assert_eq!(e1.signatures.len(), 2);
    }

    #[test]
    fn merge_is_idempotent_for_same_key() {
        let mut e1 = Envelope::new(sample_fact(), [Signature::new("k1", "sig1")]);
        let e2 = Envelope::new(sample_fact(), [Signature::new("k1", "sig1")]);

        let added = e1.merge(&e2);
        assert_eq!(added, 0);
        assert_eq!(e1.signatures.len(), 1);
    }

    #[test]
    fn json_round_trips_signature_set() {
        let env = Envelope::new(
            sample_fact(),
            [Signature::new("k1", "sig1"), Signature::new("k2", "sig2")],
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.signatures.len(), 2);
    }
}
