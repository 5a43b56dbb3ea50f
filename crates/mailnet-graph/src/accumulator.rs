//! Pairwise edge accumulation.
//!
//! One [`PairAccumulator`] collects the edges of a single relationship type
//! during one build pass. Every source (thread co-participation, forwarded
//! headers, the direct tally) feeds identity pairs into it; the accumulator
//! owns ordering, self-pair rejection, principal exclusion and the
//! weight/time-range merge.

use std::collections::{BTreeMap, BTreeSet};

use crate::participants::DateRange;
use crate::schema::{RelationshipEdge, RelationshipType};

/// Unordered identity pair stored as `(min, max)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub a: String,
    pub b: String,
}

impl PairKey {
    /// Order two identities. Returns `None` for a self-pair.
    pub fn new(x: &str, y: &str) -> Option<Self> {
        match x.cmp(y) {
            std::cmp::Ordering::Less => Some(Self {
                a: x.to_string(),
                b: y.to_string(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                a: y.to_string(),
                b: x.to_string(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Running totals for one pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairAggregate {
    pub weight: i64,
    pub range: DateRange,
    /// First thread observed for the pair. Never overwritten.
    pub sample_doc_id: Option<String>,
}

impl PairAggregate {
    pub fn merge(&mut self, weight: i64, range: &DateRange, doc_id: Option<&str>) {
        self.weight += weight;
        self.note_evidence(range, doc_id);
    }

    /// Widen the time range and set the sample thread if none is set yet,
    /// without touching the weight.
    pub fn note_evidence(&mut self, range: &DateRange, doc_id: Option<&str>) {
        self.range.merge(range);
        if self.sample_doc_id.is_none() {
            self.sample_doc_id = doc_id.filter(|d| !d.is_empty()).map(str::to_string);
        }
    }
}

/// Accumulates one relationship type's edges for one build pass.
pub struct PairAccumulator<'a> {
    relationship_type: RelationshipType,
    principals: &'a BTreeSet<String>,
    pairs: BTreeMap<PairKey, PairAggregate>,
    principal_pairs_skipped: usize,
}

impl<'a> PairAccumulator<'a> {
    pub fn new(relationship_type: RelationshipType, principals: &'a BTreeSet<String>) -> Self {
        Self {
            relationship_type,
            principals,
            pairs: BTreeMap::new(),
            principal_pairs_skipped: 0,
        }
    }

    /// Record `weight` occurrences of the pair `{x, y}`.
    ///
    /// Returns the pair key when the pair was accepted; self-pairs and
    /// principal-principal pairs are rejected.
    pub fn add(
        &mut self,
        x: &str,
        y: &str,
        weight: i64,
        range: &DateRange,
        doc_id: Option<&str>,
    ) -> Option<PairKey> {
        let key = PairKey::new(x, y)?;
        if self.principals.contains(&key.a) && self.principals.contains(&key.b) {
            self.principal_pairs_skipped += 1;
            return None;
        }
        self.pairs
            .entry(key.clone())
            .or_default()
            .merge(weight, range, doc_id);
        Some(key)
    }

    /// Record one occurrence of every unordered pair in a participant set.
    /// Each pair's range spans both participants' ranges.
    pub fn add_set(&mut self, participants: &BTreeMap<String, DateRange>, doc_id: &str) -> usize {
        let entries: Vec<(&String, &DateRange)> = participants.iter().collect();
        let mut recorded = 0;
        for (i, (x, x_range)) in entries.iter().enumerate() {
            for (y, y_range) in &entries[i + 1..] {
                let range = DateRange::span(x_range, y_range);
                if self.add(x, y, 1, &range, Some(doc_id)).is_some() {
                    recorded += 1;
                }
            }
        }
        recorded
    }

    /// Record one occurrence of every unordered pair in `identities`, all
    /// observed at the same instant.
    pub fn add_uniform(
        &mut self,
        identities: &BTreeSet<String>,
        timestamp: Option<&str>,
        doc_id: &str,
    ) -> usize {
        let participants: BTreeMap<String, DateRange> = identities
            .iter()
            .map(|id| (id.clone(), DateRange::at(timestamp)))
            .collect();
        self.add_set(&participants, doc_id)
    }

    /// Attach time-range and sample evidence to an already accepted pair.
    pub fn note_evidence(&mut self, key: &PairKey, range: &DateRange, doc_id: Option<&str>) {
        if let Some(aggregate) = self.pairs.get_mut(key) {
            aggregate.note_evidence(range, doc_id);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &PairKey> {
        self.pairs.keys()
    }

    pub fn get(&self, key: &PairKey) -> Option<&PairAggregate> {
        self.pairs.get(key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn principal_pairs_skipped(&self) -> usize {
        self.principal_pairs_skipped
    }

    /// Finish the pass. Edges come out ordered by pair key.
    pub fn into_edges(self) -> Vec<RelationshipEdge> {
        let relationship_type = self.relationship_type;
        self.pairs
            .into_iter()
            .map(|(key, aggregate)| RelationshipEdge {
                entity_a: key.a,
                entity_b: key.b,
                relationship_type,
                weight: aggregate.weight,
                first_seen: aggregate.range.first,
                last_seen: aggregate.range.last,
                sample_doc_id: aggregate.sample_doc_id,
                context: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principals(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[(&str, &str)]) -> BTreeMap<String, DateRange> {
        items
            .iter()
            .map(|(id, ts)| (id.to_string(), DateRange::at(Some(ts))))
            .collect()
    }

    #[test]
    fn test_pair_key_orders_and_rejects_self() {
        let key = PairKey::new("bob", "alice").unwrap();
        assert_eq!(key.a, "alice");
        assert_eq!(key.b, "bob");
        assert!(PairKey::new("alice", "alice").is_none());
    }

    #[test]
    fn test_weight_accumulation_across_threads() {
        let none = principals(&[]);
        let mut acc = PairAccumulator::new(RelationshipType::CoParticipant, &none);
        acc.add_set(
            &set(&[("alice", "2024-01-01"), ("bob", "2024-01-01"), ("carol", "2024-01-01")]),
            "T1",
        );
        acc.add_set(&set(&[("alice", "2024-02-01"), ("bob", "2024-02-01")]), "T2");

        let edges = acc.into_edges();
        assert_eq!(edges.len(), 3);

        let ab = &edges[0];
        assert_eq!((ab.entity_a.as_str(), ab.entity_b.as_str()), ("alice", "bob"));
        assert_eq!(ab.weight, 2);
        assert_eq!(ab.first_seen.as_deref(), Some("2024-01-01"));
        assert_eq!(ab.last_seen.as_deref(), Some("2024-02-01"));
        assert_eq!(ab.sample_doc_id.as_deref(), Some("T1"));

        let ac = &edges[1];
        assert_eq!((ac.entity_a.as_str(), ac.entity_b.as_str()), ("alice", "carol"));
        assert_eq!(ac.weight, 1);
        let bc = &edges[2];
        assert_eq!((bc.entity_a.as_str(), bc.entity_b.as_str()), ("bob", "carol"));
        assert_eq!(bc.weight, 1);
    }

    #[test]
    fn test_principal_pairs_are_skipped() {
        let p = principals(&["boss@x.com", "boss@y.com"]);
        let mut acc = PairAccumulator::new(RelationshipType::Forwarded, &p);
        let ids: BTreeSet<String> = ["boss@x.com", "boss@y.com", "aide@x.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let recorded = acc.add_uniform(&ids, Some("2024-03-01"), "T9");
        assert_eq!(recorded, 2);
        assert_eq!(acc.principal_pairs_skipped(), 1);

        for edge in acc.into_edges() {
            assert!(!(p.contains(&edge.entity_a) && p.contains(&edge.entity_b)));
            assert_eq!(edge.relationship_type, RelationshipType::Forwarded);
        }
    }

    #[test]
    fn test_sample_set_once_and_undated_ranges() {
        let none = principals(&[]);
        let mut acc = PairAccumulator::new(RelationshipType::DirectEmail, &none);
        let key = acc.add("b", "a", 5, &DateRange::default(), None).unwrap();
        acc.add("a", "b", 2, &DateRange::default(), None);
        acc.note_evidence(&key, &DateRange::at(Some("2023-05-05")), Some("D1"));
        acc.note_evidence(&key, &DateRange::at(Some("2023-01-01")), Some("D2"));

        let aggregate = acc.get(&key).unwrap();
        assert_eq!(aggregate.weight, 7);
        assert_eq!(aggregate.sample_doc_id.as_deref(), Some("D1"));
        assert_eq!(aggregate.range.first.as_deref(), Some("2023-01-01"));
        assert_eq!(aggregate.range.last.as_deref(), Some("2023-05-05"));
    }

    #[test]
    fn test_mixed_dates_keep_first_before_last() {
        let none = principals(&[]);
        let mut acc = PairAccumulator::new(RelationshipType::CoParticipant, &none);
        let mut participants = set(&[("x", "2024-06-01")]);
        participants.insert("y".to_string(), DateRange::default());
        acc.add_set(&participants, "T1");
        acc.add_set(&set(&[("x", "2024-01-01"), ("y", "2024-09-09")]), "T2");

        for edge in acc.into_edges() {
            if let (Some(first), Some(last)) = (&edge.first_seen, &edge.last_seen) {
                assert!(first <= last);
            }
        }
    }
}
