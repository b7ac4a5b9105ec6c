// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-framed graph stream codec.
//!
//! The wire format interns two tables as the stream progresses: `P`, public
//! keys seen so far, and `F`, facts seen so far (both indexed from zero in
//! first-use order). A frame is one of:
//!
//! - a **key introduction**: `PK<i>` / JSON-encoded PEM string / blank line,
//!   only ever emitted the first time key `i` is used;
//! - a **fact**: JSON-encoded type / JSON object of role → predecessor
//!   index (or array of indices) / JSON-encoded fields object / zero or
//!   more `PK<j>` + JSON-encoded signature line pairs / blank line.
//!
//! A fact already present in `F` is never re-emitted — referencing it by
//! index is enough, and an encoder/decoder pair that have processed the
//! same prefix of the stream always agree on what index means what.
//!
//! [`GraphEncoder`] and [`GraphDecoder`] are stateful across calls, which is
//! what makes the back-reference compression possible over a long-lived
//! connection: call them again with the next batch and they keep extending
//! the same `P`/`F` tables rather than starting over.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use fg_model::{Envelope, Fact, FieldValue, PredecessorValue, Reference, Signature};

use crate::error::CodecError;
use crate::toposort::topo_sort;

fn field_value_from_json(value: Value) -> Result<FieldValue, CodecError> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(b) => Ok(FieldValue::Bool(b)),
        Value::Number(n) => Ok(FieldValue::Number(n)),
        Value::String(s) => Ok(FieldValue::String(s)),
        other => Err(CodecError::MalformedFrame(format!(
            "field value must be a JSON primitive, got {other}"
        ))),
    }
}

fn fields_from_json(value: Value) -> Result<BTreeMap<String, FieldValue>, CodecError> {
    let Value::Object(object) = value else {
        return Err(CodecError::MalformedFrame("fields line must be an object".into()));
    };
    object
        .into_iter()
        .map(|(k, v)| Ok((k, field_value_from_json(v)?)))
        .collect()
}

/// Default number of decoded envelopes the decoder accumulates before
/// invoking its flush callback in [`GraphDecoder::decode_with_batches`].
pub const DEFAULT_FLUSH_THRESHOLD: usize = 20;

/// Encodes envelopes into the line-framed graph format, interning public
/// keys and facts so repeated references become small integers.
#[derive(Debug, Default)]
pub struct GraphEncoder {
    known_keys: BTreeMap<String, usize>,
    known_facts: BTreeMap<Reference, usize>,
}

impl GraphEncoder {
    /// A fresh encoder with empty `P`/`F` tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a batch of envelopes, topologically ordering them first so
    /// every predecessor is interned before its dependent references it.
    ///
    /// Envelopes whose fact is already known (from this or a prior call on
    /// the same encoder) are silently skipped — the receiver already has
    /// them. New signatures on an already-known fact are not transmitted by
    /// this call; merging additional signatures onto a fact already shared
    /// is a store-level concern, not a codec concern.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Cycle`] if the envelope set's predecessor
    /// edges are not a DAG.
    pub fn encode(&mut self, envelopes: &[Envelope]) -> Result<String, CodecError> {
        let ordered = topo_sort(envelopes)?;
        let mut out = String::new();
        for envelope in &ordered {
            self.encode_envelope(&mut out, envelope);
        }
        Ok(out)
    }

    fn encode_envelope(&mut self, out: &mut String, envelope: &Envelope) {
        let reference = envelope.fact.reference();
        if self.known_facts.contains_key(&reference) {
            return;
        }

        for signature in envelope.signature_list() {
            self.intern_key_if_new(out, &signature.public_key);
        }

        out.push_str(&serde_json::to_string(envelope.fact.fact_type()).expect("string always serializes"));
        out.push('\n');
        out.push_str(&self.encode_predecessors(&envelope.fact));
        out.push('\n');
        out.push_str(&fg_model::canon::canonicalize_fields(envelope.fact.fields()));
        out.push('\n');
        for signature in envelope.signature_list() {
            let key_index = self.known_keys[&signature.public_key];
            out.push_str(&format!("PK{key_index}\n"));
            out.push_str(&serde_json::to_string(&signature.signature).expect("string always serializes"));
            out.push('\n');
        }
        out.push('\n');

        let index = self.known_facts.len();
        self.known_facts.insert(reference, index);
    }

    fn intern_key_if_new(&mut self, out: &mut String, public_key: &str) {
        if self.known_keys.contains_key(public_key) {
            return;
        }
        let index = self.known_keys.len();
        self.known_keys.insert(public_key.to_string(), index);
        out.push_str(&format!("PK{index}\n"));
        out.push_str(&serde_json::to_string(public_key).expect("string always serializes"));
        out.push_str("\n\n");
    }

    fn encode_predecessors(&self, fact: &Fact) -> String {
        let mut object = Map::new();
        for (role, value) in fact.predecessors() {
            let encoded = match value {
                PredecessorValue::Single(r) => Value::Number(self.known_facts[r].into()),
                PredecessorValue::Many(rs) => {
                    Value::Array(rs.iter().map(|r| Value::Number(self.known_facts[r].into())).collect())
                }
            };
            object.insert(role.clone(), encoded);
        }
        serde_json::to_string(&Value::Object(object)).expect("json values always serialize")
    }
}

/// Decodes the line-framed graph format, rebuilding `P`/`F` in lockstep
/// with whichever encoder produced the stream.
#[derive(Debug, Default)]
pub struct GraphDecoder {
    known_keys: Vec<String>,
    known_facts: Vec<Reference>,
}

enum Frame {
    KeyIntroduction,
    Fact(Envelope),
}

impl GraphDecoder {
    /// A fresh decoder with empty `P`/`F` tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a complete, self-contained chunk of whole frames (no partial
    /// trailing frame) into the envelopes it describes, in stream order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OutOfRangeReference`] if a predecessor or key
    /// index has not yet been introduced, [`CodecError::MalformedFrame`] if
    /// a line fails to parse in the position a frame requires, or
    /// [`CodecError::UnexpectedEndOfStream`] if the text ends mid-frame.
    pub fn decode(&mut self, text: &str) -> Result<Vec<Envelope>, CodecError> {
        let mut envelopes = Vec::new();
        self.decode_with_batches(text, usize::MAX, |batch| envelopes.extend_from_slice(batch))?;
        Ok(envelopes)
    }

    /// Decode a chunk of whole frames, invoking `on_batch` every time
    /// `threshold` envelopes have accumulated, and once more at the end for
    /// any remainder. Key-introduction frames do not count toward the
    /// threshold since they produce no envelope.
    ///
    /// # Errors
    ///
    /// Same as [`Self::decode`].
    pub fn decode_with_batches(
        &mut self,
        text: &str,
        threshold: usize,
        mut on_batch: impl FnMut(&[Envelope]),
    ) -> Result<usize, CodecError> {
        let mut lines = text.lines();
        let mut batch = Vec::new();
        let mut total = 0usize;

        loop {
            let Some(first) = lines.next() else { break };
            match self.decode_frame(first, &mut lines)? {
                Frame::KeyIntroduction => {}
                Frame::Fact(envelope) => {
                    batch.push(envelope);
                    total += 1;
                    if batch.len() >= threshold {
                        on_batch(&batch);
                        batch.clear();
                    }
                }
            }
        }

        if !batch.is_empty() {
            on_batch(&batch);
        }
        Ok(total)
    }

    fn decode_frame<'a>(
        &mut self,
        first_line: &str,
        lines: &mut impl Iterator<Item = &'a str>,
    ) -> Result<Frame, CodecError> {
        if let Some(rest) = first_line.strip_prefix("PK") {
            let index: usize = rest
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedFrame(format!("bad PK index: {first_line}")))?;
            if index != self.known_keys.len() {
                return Err(CodecError::OutOfRangeReference(index));
            }
            let pem_line = lines.next().ok_or(CodecError::UnexpectedEndOfStream)?;
            let pem: String = serde_json::from_str(pem_line)
                .map_err(|e| CodecError::MalformedFrame(e.to_string()))?;
            let blank = lines.next().ok_or(CodecError::UnexpectedEndOfStream)?;
            if !blank.is_empty() {
                return Err(CodecError::MalformedFrame(
                    "key introduction must be followed by a blank line".into(),
                ));
            }
            self.known_keys.push(pem);
            return Ok(Frame::KeyIntroduction);
        }

        let fact_type: String =
            serde_json::from_str(first_line).map_err(|e| CodecError::MalformedFrame(e.to_string()))?;

        let predecessors_line = lines.next().ok_or(CodecError::UnexpectedEndOfStream)?;
        let predecessors_json: Value = serde_json::from_str(predecessors_line)
            .map_err(|e| CodecError::MalformedFrame(e.to_string()))?;
        let predecessors = self.resolve_predecessors(predecessors_json)?;

        let fields_line = lines.next().ok_or(CodecError::UnexpectedEndOfStream)?;
        let fields_json: Value =
            serde_json::from_str(fields_line).map_err(|e| CodecError::MalformedFrame(e.to_string()))?;
        let fields = fields_from_json(fields_json)?;

        let hash = fg_model::canon::hash_of(&fields, &predecessors);
        let fact = Fact::from_parts(fact_type, fields, predecessors, hash);

        let mut signatures = Vec::new();
        loop {
            let line = lines.next().ok_or(CodecError::UnexpectedEndOfStream)?;
            if line.is_empty() {
                break;
            }
            let rest = line
                .strip_prefix("PK")
                .ok_or_else(|| CodecError::MalformedFrame(format!("expected PK line or blank, got {line}")))?;
            let key_index: usize = rest
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedFrame(format!("bad PK index: {line}")))?;
            let public_key = self
                .known_keys
                .get(key_index)
                .ok_or(CodecError::OutOfRangeReference(key_index))?
                .clone();
            let sig_line = lines.next().ok_or(CodecError::UnexpectedEndOfStream)?;
            let signature: String =
                serde_json::from_str(sig_line).map_err(|e| CodecError::MalformedFrame(e.to_string()))?;
            signatures.push(Signature::new(public_key, signature));
        }

        self.known_facts.push(fact.reference());
        Ok(Frame::Fact(Envelope::new(fact, signatures)))
    }

    fn resolve_predecessors(
        &self,
        value: Value,
    ) -> Result<BTreeMap<String, PredecessorValue>, CodecError> {
        let Value::Object(object) = value else {
            return Err(CodecError::MalformedFrame("predecessors line must be an object".into()));
        };
        object
            .into_iter()
            .map(|(role, v)| Ok((role, self.resolve_predecessor_value(v)?)))
            .collect()
    }

    fn resolve_predecessor_value(&self, value: Value) -> Result<PredecessorValue, CodecError> {
        match value {
            Value::Number(n) => Ok(PredecessorValue::Single(self.resolve_index(&n)?)),
            Value::Array(items) => {
                let refs = items
                    .iter()
                    .map(|v| match v {
                        Value::Number(n) => self.resolve_index(n),
                        other => Err(CodecError::MalformedFrame(format!(
                            "predecessor index must be a number, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PredecessorValue::Many(refs))
            }
            other => Err(CodecError::MalformedFrame(format!(
                "predecessor value must be a number or array of numbers, got {other}"
            ))),
        }
    }

    fn resolve_index(&self, n: &serde_json::Number) -> Result<Reference, CodecError> {
        let index = n
            .as_u64()
            .ok_or_else(|| CodecError::MalformedFrame(format!("predecessor index must be a non-negative integer, got {n}")))?
            as usize;
        self.known_facts
            .get(index)
            .cloned()
            .ok_or(CodecError::OutOfRangeReference(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn leaf_fact(text: &str) -> Fact {
        let mut fields = Map::new();
        fields.insert("text".to_string(), FieldValue::String(text.to_string()));
        Fact::new("Msg", fields, Map::new()).unwrap()
    }

    #[test]
    fn round_trips_a_single_unsigned_fact() {
        let fact = leaf_fact("hi");
        let envelope = Envelope::unsigned(fact.clone());

        let mut encoder = GraphEncoder::new();
        let text = encoder.encode(&[envelope]).unwrap();

        let mut decoder = GraphDecoder::new();
        let decoded = decoder.decode(&text).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].fact, fact);
    }

    #[test]
    fn round_trips_a_parent_child_chain_with_shared_signer() {
        let parent = leaf_fact("parent");
        let mut child_preds = Map::new();
        child_preds.insert(
            "parent".to_string(),
            PredecessorValue::Single(parent.reference()),
        );
        let child = Fact::new("Reply", Map::new(), child_preds).unwrap();

        let sig = Signature::new("pem-key-1", "sig-a");
        let parent_env = Envelope::new(parent.clone(), [sig.clone()]);
        let child_env = Envelope::new(child.clone(), [sig]);

        let mut encoder = GraphEncoder::new();
        let text = encoder.encode(&[parent_env, child_env]).unwrap();
        // The shared key's PEM is only transmitted once, at first use.
        assert_eq!(text.matches("pem-key-1").count(), 1);

        let mut decoder = GraphDecoder::new();
        let decoded = decoder.decode(&text).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].fact, parent);
        assert_eq!(decoded[1].fact, child);
        assert_eq!(decoded[1].fact.predecessor_references(), vec![&parent.reference()]);
        assert_eq!(decoded[0].signature_list()[0].public_key, "pem-key-1");
        assert_eq!(decoded[1].signature_list()[0].public_key, "pem-key-1");
    }

    #[test]
    fn an_already_known_fact_is_suppressed_on_re_encode() {
        let fact = leaf_fact("dup");
        let mut encoder = GraphEncoder::new();
        let first = encoder.encode(&[Envelope::unsigned(fact.clone())]).unwrap();
        let second = encoder.encode(&[Envelope::unsigned(fact)]).unwrap();
        assert!(!first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn decoder_rejects_an_out_of_range_predecessor_index() {
        let text = "\"Reply\"\n{\"parent\":7}\n{}\n\n";
        let mut decoder = GraphDecoder::new();
        let err = decoder.decode(text).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRangeReference(7)));
    }

    #[test]
    fn batches_flush_at_the_configured_threshold() {
        let facts: Vec<Envelope> = (0..5).map(|i| Envelope::unsigned(leaf_fact(&i.to_string()))).collect();
        let mut encoder = GraphEncoder::new();
        let text = encoder.encode(&facts).unwrap();

        let mut decoder = GraphDecoder::new();
        let mut batch_sizes = Vec::new();
        decoder
            .decode_with_batches(&text, 2, |batch| batch_sizes.push(batch.len()))
            .unwrap();
        assert_eq!(batch_sizes, vec![2, 2, 1]);
    }

    #[test]
    fn decoder_reports_unexpected_end_of_stream() {
        let text = "\"Msg\"\n{}\n";
        let mut decoder = GraphDecoder::new();
        let err = decoder.decode(text).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEndOfStream));
    }
}
