//! Thread participant aggregation.
//!
//! Groups raw sender/recipient records by thread, folds every address onto
//! its canonical identity and keeps, per identity, the earliest and latest
//! usable timestamp seen in that thread.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::identity::IdentityResolver;
use crate::schema::Participation;

/// Returns the trimmed timestamp if it starts with a valid `YYYY-MM-DD`
/// date. Empty and malformed values are excluded from every min/max.
pub fn usable_timestamp(raw: Option<&str>) -> Option<&str> {
    let trimmed = raw?.trim();
    let date = trimmed.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(trimmed)
}

/// Earliest and latest usable timestamp. Either side may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub first: Option<String>,
    pub last: Option<String>,
}

impl DateRange {
    /// A range covering a single instant.
    pub fn at(timestamp: Option<&str>) -> Self {
        let ts = usable_timestamp(timestamp).map(str::to_string);
        Self {
            first: ts.clone(),
            last: ts,
        }
    }

    /// Widen the range to cover `timestamp`.
    pub fn observe(&mut self, timestamp: Option<&str>) {
        self.merge(&Self::at(timestamp));
    }

    /// Widen the range to cover `other`. Unknown sides never win a
    /// comparison; a missing side is simply taken from the other range.
    pub fn merge(&mut self, other: &DateRange) {
        if let Some(first) = &other.first {
            if self.first.as_ref().map_or(true, |current| first < current) {
                self.first = Some(first.clone());
            }
        }
        if let Some(last) = &other.last {
            if self.last.as_ref().map_or(true, |current| last > current) {
                self.last = Some(last.clone());
            }
        }
    }

    /// Smallest range covering both `a` and `b`.
    pub fn span(a: &DateRange, b: &DateRange) -> DateRange {
        let mut range = a.clone();
        range.merge(b);
        range
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.last.is_none()
    }
}

/// Canonical participants of one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadParticipants {
    pub doc_id: String,
    pub participants: BTreeMap<String, DateRange>,
}

impl ThreadParticipants {
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// Result of folding raw participation records.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Threads with at least two canonical participants, ordered by id.
    pub threads: Vec<ThreadParticipants>,
    /// Distinct threads present in the input.
    pub threads_seen: usize,
}

/// Builds per-thread canonical participant sets.
pub struct ParticipantAggregator<'a> {
    resolver: &'a IdentityResolver,
}

impl<'a> ParticipantAggregator<'a> {
    pub fn new(resolver: &'a IdentityResolver) -> Self {
        Self { resolver }
    }

    pub fn aggregate<'r>(&self, records: impl IntoIterator<Item = &'r Participation>) -> Aggregation {
        let mut by_thread: BTreeMap<&'r str, BTreeMap<String, DateRange>> = BTreeMap::new();

        for record in records {
            let participants = by_thread.entry(record.doc_id.as_str()).or_default();
            if record.address.trim().is_empty() {
                continue;
            }
            let canonical = self.resolver.resolve(&record.address);
            participants
                .entry(canonical)
                .or_default()
                .observe(record.sent_at.as_deref());
        }

        let threads_seen = by_thread.len();
        let threads = by_thread
            .into_iter()
            .filter(|(_, participants)| participants.len() >= 2)
            .map(|(doc_id, participants)| ThreadParticipants {
                doc_id: doc_id.to_string(),
                participants,
            })
            .collect();

        Aggregation {
            threads,
            threads_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::CuratedTables;
    use crate::schema::ParticipantRole;

    fn resolver(aliases: &[(&str, &str)]) -> IdentityResolver {
        IdentityResolver::new(&CuratedTables {
            aliases: aliases
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_usable_timestamp() {
        assert_eq!(usable_timestamp(Some("2024-01-01")), Some("2024-01-01"));
        assert_eq!(
            usable_timestamp(Some(" 2024-01-01T10:00:00Z ")),
            Some("2024-01-01T10:00:00Z")
        );
        assert_eq!(usable_timestamp(Some("")), None);
        assert_eq!(usable_timestamp(Some("yesterday")), None);
        assert_eq!(usable_timestamp(Some("2024-13-45")), None);
        assert_eq!(usable_timestamp(None), None);
    }

    #[test]
    fn test_date_range_merge_ignores_missing() {
        let mut range = DateRange::at(Some(""));
        assert!(range.is_empty());

        range.observe(Some("2024-02-01"));
        range.observe(Some("garbage"));
        range.observe(Some("2024-01-01"));
        assert_eq!(range.first.as_deref(), Some("2024-01-01"));
        assert_eq!(range.last.as_deref(), Some("2024-02-01"));

        let one_sided = DateRange {
            first: None,
            last: Some("2024-03-01".to_string()),
        };
        range.merge(&one_sided);
        assert_eq!(range.first.as_deref(), Some("2024-01-01"));
        assert_eq!(range.last.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_aggregate_folds_aliases_and_drops_small_threads() {
        let resolver = resolver(&[("alice.alt@x.com", "alice@x.com")]);
        let records = vec![
            Participation::new("t1", "alice@x.com", ParticipantRole::Sender, Some("2024-01-05")),
            Participation::new("t1", "bob@x.com", ParticipantRole::To, Some("2024-01-05")),
            Participation::new("t1", "alice.alt@x.com", ParticipantRole::Sender, Some("2024-01-02")),
            // Only one identity after folding.
            Participation::new("t2", "alice@x.com", ParticipantRole::Sender, Some("2024-02-01")),
            Participation::new("t2", "alice.alt@x.com", ParticipantRole::To, Some("2024-02-01")),
            Participation::new("t3", "", ParticipantRole::Cc, None),
        ];

        let aggregation = ParticipantAggregator::new(&resolver).aggregate(&records);
        assert_eq!(aggregation.threads_seen, 3);
        assert_eq!(aggregation.threads.len(), 1);

        let t1 = &aggregation.threads[0];
        assert_eq!(t1.doc_id, "t1");
        assert_eq!(t1.len(), 2);
        let alice = &t1.participants["alice@x.com"];
        assert_eq!(alice.first.as_deref(), Some("2024-01-02"));
        assert_eq!(alice.last.as_deref(), Some("2024-01-05"));
    }

    #[test]
    fn test_aggregate_keeps_undated_participants() {
        let resolver = resolver(&[]);
        let records = vec![
            Participation::new("t1", "a@x.com", ParticipantRole::Sender, None),
            Participation::new("t1", "b@x.com", ParticipantRole::Bcc, Some("not a date")),
        ];
        let aggregation = ParticipantAggregator::new(&resolver).aggregate(&records);
        assert_eq!(aggregation.threads.len(), 1);
        assert!(aggregation.threads[0].participants["a@x.com"].is_empty());
    }
}
