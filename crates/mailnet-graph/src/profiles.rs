//! Entity profile construction.
//!
//! Folds every raw entity record onto its canonical identity and computes
//! the per-identity statistics: names, emails, message and thread counts,
//! activity window and distinct relationship partners.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::curation::CuratedTables;
use crate::identity::IdentityResolver;
use crate::participants::DateRange;
use crate::schema::{EntityProfile, Participation, RawEntity, RelationshipEdge};

/// Threads and timestamps per raw address, as sender or recipient.
#[derive(Debug, Default)]
pub struct ActivityIndex {
    by_address: HashMap<String, AddressActivity>,
}

#[derive(Debug, Default)]
struct AddressActivity {
    threads: BTreeSet<String>,
    range: DateRange,
}

impl ActivityIndex {
    pub fn from_participations<'r>(records: impl IntoIterator<Item = &'r Participation>) -> Self {
        let mut by_address: HashMap<String, AddressActivity> = HashMap::new();
        for record in records {
            if record.address.is_empty() {
                continue;
            }
            let activity = by_address.entry(record.address.clone()).or_default();
            activity.threads.insert(record.doc_id.clone());
            activity.range.observe(record.sent_at.as_deref());
        }
        Self { by_address }
    }

    /// Distinct threads touched by any of `addresses`.
    pub fn thread_count<'a>(&self, addresses: impl IntoIterator<Item = &'a String>) -> i64 {
        let mut threads: BTreeSet<&str> = BTreeSet::new();
        for address in addresses {
            if let Some(activity) = self.by_address.get(address) {
                threads.extend(activity.threads.iter().map(String::as_str));
            }
        }
        threads.len() as i64
    }

    /// Union of the activity windows of `addresses`.
    pub fn window<'a>(&self, addresses: impl IntoIterator<Item = &'a String>) -> DateRange {
        let mut range = DateRange::default();
        for address in addresses {
            if let Some(activity) = self.by_address.get(address) {
                range.merge(&activity.range);
            }
        }
        range
    }
}

/// Distinct partners per identity across every edge of every type.
pub fn connection_counts(edges: &[RelationshipEdge]) -> HashMap<String, i64> {
    let mut partners: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for edge in edges {
        partners
            .entry(edge.entity_a.as_str())
            .or_default()
            .insert(edge.entity_b.as_str());
        partners
            .entry(edge.entity_b.as_str())
            .or_default()
            .insert(edge.entity_a.as_str());
    }
    partners
        .into_iter()
        .map(|(address, set)| (address.to_string(), set.len() as i64))
        .collect()
}

#[derive(Default)]
struct ProfileAccumulator {
    names: BTreeSet<String>,
    emails: BTreeSet<String>,
    total_messages: i64,
    principal: bool,
}

pub struct ProfileBuilder<'a> {
    tables: &'a CuratedTables,
    resolver: &'a IdentityResolver,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(tables: &'a CuratedTables, resolver: &'a IdentityResolver) -> Self {
        Self { tables, resolver }
    }

    /// Build one profile per canonical identity present in `entities`,
    /// ordered by address.
    pub fn build(
        &self,
        entities: &[RawEntity],
        activity: &ActivityIndex,
        connections: &HashMap<String, i64>,
    ) -> Vec<EntityProfile> {
        let mut grouped: BTreeMap<String, ProfileAccumulator> = BTreeMap::new();

        for entity in entities {
            let canonical = self.resolver.resolve(&entity.address);
            let acc = grouped.entry(canonical).or_default();

            let name = entity.name.trim();
            if !name.is_empty() {
                acc.names.insert(name.to_string());
            }
            // A label without '@' is a name spelling folded in by the aliases.
            if !entity.address.contains('@') && !entity.address.trim().is_empty() {
                acc.names.insert(entity.address.clone());
            }
            acc.emails.insert(entity.address.clone());
            acc.total_messages += entity.message_count;
            acc.principal |= entity.principal;
        }

        grouped
            .into_iter()
            .map(|(address, acc)| {
                let window = activity.window(&acc.emails);
                EntityProfile {
                    canonical_name: self.display_name(&address, &acc.names),
                    role: self.tables.role(&address).to_string(),
                    first_active: window.first,
                    last_active: window.last,
                    total_messages: acc.total_messages,
                    total_threads: activity.thread_count(&acc.emails),
                    total_connections: connections.get(&address).copied().unwrap_or(0),
                    principal: acc.principal || self.resolver.principals().contains(&address),
                    names: acc.names.into_iter().collect(),
                    emails: acc.emails.into_iter().collect(),
                    address,
                }
            })
            .collect()
    }

    /// Curated name, else the longest observed name, else the address.
    fn display_name(&self, address: &str, names: &BTreeSet<String>) -> String {
        if let Some(curated) = self.tables.canonical_name(address) {
            return curated.to_string();
        }
        // Ties go to the lexicographically smallest name.
        names
            .iter()
            .fold(None::<&String>, |best, name| match best {
                Some(b) if b.chars().count() >= name.chars().count() => Some(b),
                _ => Some(name),
            })
            .cloned()
            .unwrap_or_else(|| address.to_string())
    }
}
