// SPDX-License-Identifier: MIT OR Apache-2.0
//! Orders envelopes so every predecessor appears before its dependents —
//! the order the graph encoder requires to assign back-reference indices.

use std::collections::{BTreeMap, VecDeque};

use fg_model::{Envelope, Reference};

use crate::error::CodecError;

/// Stable topological sort (Kahn's algorithm) over an envelope set's
/// predecessor edges. Envelopes whose predecessors are not present in the
/// input slice are treated as roots — the caller is responsible for
/// supplying a closed ancestor set when completeness matters.
///
/// Ties are broken by input order, so sorting an already-sorted slice is a
/// no-op, and the result is deterministic for a given input order.
pub fn topo_sort(envelopes: &[Envelope]) -> Result<Vec<Envelope>, CodecError> {
    let index_of: BTreeMap<Reference, usize> = envelopes
        .iter()
        .enumerate()
        .map(|(i, e)| (e.fact.reference(), i))
        .collect();

    let mut in_degree = vec![0usize; envelopes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); envelopes.len()];

    for (i, envelope) in envelopes.iter().enumerate() {
        for predecessor in envelope.fact.predecessor_references() {
            if let Some(&p) = index_of.get(predecessor) {
                dependents[p].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..envelopes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(envelopes.len());

    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.push_back(d);
            }
        }
    }

    if order.len() != envelopes.len() {
        return Err(CodecError::Cycle);
    }

    Ok(order.into_iter().map(|i| envelopes[i].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_model::{Fact, FieldValue, PredecessorValue};
    use std::collections::BTreeMap;

    fn fact_with(fact_type: &str, preds: BTreeMap<String, PredecessorValue>) -> Fact {
        Fact::new(fact_type, BTreeMap::<String, FieldValue>::new(), preds).unwrap()
    }

    #[test]
    fn orders_child_after_parent_even_when_given_reversed() {
        let parent = fact_with("Parent", BTreeMap::new());
        let mut child_preds = BTreeMap::new();
        child_preds.insert(
            "parent".to_string(),
            PredecessorValue::Single(parent.reference()),
        );
        let child = fact_with("Child", child_preds);

        let input = vec![Envelope::unsigned(child.clone()), Envelope::unsigned(parent.clone())];
        let sorted = topo_sort(&input).unwrap();
        assert_eq!(sorted[0].fact.reference(), parent.reference());
        assert_eq!(sorted[1].fact.reference(), child.reference());
    }

    #[test]
    fn detects_a_cycle() {
        // Two facts whose declared predecessors point at each other's
        // reference despite the hash not actually supporting it — a
        // synthetic cycle for exercising the guard.
        let a_ref = fg_model::Reference::new("A", "hash-a");
        let b_ref = fg_model::Reference::new("B", "hash-b");

        let mut a_preds = BTreeMap::new();
        a_preds.insert("b".to_string(), PredecessorValue::Single(b_ref.clone()));
        let a = Fact::from_parts("A", BTreeMap::new(), a_preds, "hash-a");

        let mut b_preds = BTreeMap::new();
        b_preds.insert("a".to_string(), PredecessorValue::Single(a_ref));
        let b = Fact::from_parts("B", BTreeMap::new(), b_preds, "hash-b");

        let input = vec![Envelope::unsigned(a), Envelope::unsigned(b)];
        let err = topo_sort(&input).unwrap_err();
        assert!(matches!(err, CodecError::Cycle));
    }
}
