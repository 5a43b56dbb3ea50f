//! Batch graph construction.
//!
//! A build drops and recreates the graph tables, then runs five steps in
//! dependency order, each reading its inputs fully, aggregating in memory
//! and writing once:
//!
//! 1. alias table
//! 2. thread co-participation edges
//! 3. forwarded header mentions and edges
//! 4. direct tally edges
//! 5. entity profiles
//!
//! A build must not run concurrently with itself or with graph queries on
//! the same store. A failed build leaves the graph incomplete; rerun it.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::accumulator::PairAccumulator;
use crate::corpus::CorpusReader;
use crate::curation::CuratedTables;
use crate::extractors::extract_candidates;
use crate::identity::IdentityResolver;
use crate::participants::{usable_timestamp, DateRange, ParticipantAggregator};
use crate::profiles::{connection_counts, ActivityIndex, ProfileBuilder};
use crate::schema::{
    AddressPairTally, AliasRecord, EntityProfile, Mention, MentionType, MessageBody,
    Participation, RawEntity, RelationshipEdge, RelationshipType,
};
use crate::storage::GraphStore;

/// Configuration for graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Threads with more canonical participants than this are flagged
    /// (default: 250). They are still processed.
    pub max_thread_participants: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_thread_participants: 250,
        }
    }
}

/// Per-step counters of one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub aliases_inserted: usize,
    pub threads_seen: usize,
    pub threads_processed: usize,
    pub oversized_threads: usize,
    pub co_participant_edges: usize,
    pub messages_with_forwarded_headers: usize,
    pub mentions_extracted: usize,
    pub forwarded_edges: usize,
    pub direct_edges: usize,
    pub profiles_built: usize,
    /// Canonical identities that absorbed more than one raw address.
    pub merged_identities: usize,
    /// Raw addresses folded into those identities.
    pub folded_addresses: usize,
    pub duration_ms: u64,
}

/// Output of the co-participation step.
#[derive(Debug, Default)]
pub struct CoParticipation {
    pub edges: Vec<RelationshipEdge>,
    pub threads_seen: usize,
    pub threads_processed: usize,
    pub oversized_threads: usize,
}

/// Output of the forwarded header step.
#[derive(Debug, Default)]
pub struct ForwardedHarvest {
    pub edges: Vec<RelationshipEdge>,
    pub mentions: Vec<Mention>,
    pub messages_with_headers: usize,
}

/// Builds the relationship graph from a corpus.
pub struct GraphBuilder<'a> {
    tables: &'a CuratedTables,
    resolver: IdentityResolver,
    config: PipelineConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(tables: &'a CuratedTables) -> Self {
        Self::with_config(tables, PipelineConfig::default())
    }

    pub fn with_config(tables: &'a CuratedTables, config: PipelineConfig) -> Self {
        Self {
            tables,
            resolver: IdentityResolver::new(tables),
            config,
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Run every step against `store`, replacing its graph tables.
    #[instrument(skip_all)]
    pub async fn build(&self, corpus: &dyn CorpusReader, store: &GraphStore) -> Result<BuildReport> {
        let started = Instant::now();
        let mut report = BuildReport::default();

        GraphStore::reset_schema(store.pool())
            .await
            .context("Failed to reset graph tables")?;

        // Step 1
        let entities = corpus
            .raw_entities()
            .await
            .context("Failed to read raw entities")?;
        let aliases = self.alias_records(&entities);
        report.aliases_inserted = store.replace_aliases(&aliases).await?;
        info!("Inserted {} alias mappings", report.aliases_inserted);

        // Step 2
        let participations = corpus
            .participations()
            .await
            .context("Failed to read thread participants")?;
        let co = self.co_participation(&participations);
        report.threads_seen = co.threads_seen;
        report.threads_processed = co.threads_processed;
        report.oversized_threads = co.oversized_threads;
        report.co_participant_edges = store.insert_relationships(&co.edges).await?;
        info!(
            "Extracted {} co-participant edges from {} threads ({} seen)",
            report.co_participant_edges, report.threads_processed, report.threads_seen
        );

        // Step 3
        let bodies = corpus
            .message_bodies()
            .await
            .context("Failed to read message bodies")?;
        let harvest = self.forwarded(&bodies);
        report.messages_with_forwarded_headers = harvest.messages_with_headers;
        report.mentions_extracted = store.insert_mentions(&harvest.mentions).await?;
        report.forwarded_edges = store.insert_relationships(&harvest.edges).await?;
        info!(
            "Messages with forwarded headers: {}, mentions: {}, forwarded edges: {}",
            report.messages_with_forwarded_headers, report.mentions_extracted, report.forwarded_edges
        );

        // Step 4
        let tally = corpus
            .address_pair_tally()
            .await
            .context("Failed to read address pair tally")?;
        let direct = self.direct_edges(&tally, corpus).await?;
        report.direct_edges = store.insert_relationships(&direct).await?;
        info!("Migrated {} direct email edges", report.direct_edges);

        // Step 5
        let mut all_edges = co.edges;
        all_edges.extend(harvest.edges);
        all_edges.extend(direct);
        let activity = ActivityIndex::from_participations(&participations);
        let profiles = self.profiles(&entities, &activity, &all_edges);
        report.profiles_built = store.insert_profiles(&profiles).await?;
        report.merged_identities = profiles.iter().filter(|p| p.emails.len() > 1).count();
        report.folded_addresses = profiles
            .iter()
            .filter(|p| p.emails.len() > 1)
            .map(|p| p.emails.len())
            .sum();
        info!(
            "Built {} entity profiles ({} addresses folded into {} identities)",
            report.profiles_built, report.folded_addresses, report.merged_identities
        );

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!("Graph build complete in {}ms", report.duration_ms);
        Ok(report)
    }

    /// One row per curated alias key, resolved through the full chain.
    pub fn alias_records(&self, entities: &[RawEntity]) -> Vec<AliasRecord> {
        let observed: BTreeMap<&str, &str> = entities
            .iter()
            .map(|e| (e.address.as_str(), e.name.as_str()))
            .collect();

        self.resolver
            .resolved_aliases()
            .into_iter()
            .map(|(alias, canonical)| {
                let alias_name = observed.get(alias.as_str()).copied().unwrap_or("").to_string();
                let canonical_name = self
                    .tables
                    .canonical_name(&canonical)
                    .or_else(|| observed.get(canonical.as_str()).copied())
                    .unwrap_or("")
                    .to_string();
                AliasRecord {
                    alias_address: alias,
                    canonical_address: canonical,
                    alias_name,
                    canonical_name,
                }
            })
            .collect()
    }

    /// Co-participant edges from thread membership.
    pub fn co_participation(&self, participations: &[Participation]) -> CoParticipation {
        let aggregation = ParticipantAggregator::new(&self.resolver).aggregate(participations);
        let mut acc = PairAccumulator::new(RelationshipType::CoParticipant, self.resolver.principals());
        let mut oversized_threads = 0;

        for thread in &aggregation.threads {
            if thread.len() > self.config.max_thread_participants {
                oversized_threads += 1;
                warn!(
                    "Thread {} has {} participants (ceiling {}), pair generation is quadratic",
                    thread.doc_id,
                    thread.len(),
                    self.config.max_thread_participants
                );
            }
            acc.add_set(&thread.participants, &thread.doc_id);
        }
        debug!(
            "Skipped {} principal-principal pairs",
            acc.principal_pairs_skipped()
        );

        CoParticipation {
            edges: acc.into_edges(),
            threads_seen: aggregation.threads_seen,
            threads_processed: aggregation.threads.len(),
            oversized_threads,
        }
    }

    /// Mentions and forwarded edges from header blocks inside bodies.
    pub fn forwarded(&self, bodies: &[MessageBody]) -> ForwardedHarvest {
        let mut acc = PairAccumulator::new(RelationshipType::Forwarded, self.resolver.principals());
        let mut mentions = Vec::new();
        let mut messages_with_headers = 0;

        for message in bodies {
            let Some(body) = message.body.as_deref() else {
                continue;
            };
            let candidates = extract_candidates(body);
            if candidates.is_empty() {
                continue;
            }
            messages_with_headers += 1;

            let sender = message.sender_address.trim();
            let sender = (!sender.is_empty()).then(|| self.resolver.resolve(sender));
            let instant = DateRange::at(message.sent_at.as_deref());
            let mut named: BTreeSet<String> = BTreeSet::new();

            // Sender against every candidate occurrence
            for candidate in &candidates {
                let canonical = self.resolver.resolve(&candidate.address);
                mentions.push(Mention {
                    entity_address: canonical.clone(),
                    message_id: message.id.clone(),
                    mention_type: MentionType::ForwardedHeader,
                    context: format!("Extracted from forwarded header in {}", message.doc_id),
                });
                if let Some(sender) = &sender {
                    acc.add(sender, &canonical, 1, &instant, Some(&message.doc_id));
                }
                named.insert(canonical);
            }

            // Distinct candidates against each other
            acc.add_uniform(&named, message.sent_at.as_deref(), &message.doc_id);
        }

        ForwardedHarvest {
            edges: acc.into_edges(),
            mentions,
            messages_with_headers,
        }
    }

    /// Collapse the raw directed tally into canonical undirected edges, then
    /// look up each pair's time range and sample thread in the corpus.
    pub async fn direct_edges(
        &self,
        tally: &[AddressPairTally],
        corpus: &dyn CorpusReader,
    ) -> Result<Vec<RelationshipEdge>> {
        let mut acc = PairAccumulator::new(RelationshipType::DirectEmail, self.resolver.principals());
        for entry in tally {
            // Stored edges carry weight >= 1
            if entry.weight < 1 {
                debug!(
                    "Skipping tally entry {} -> {} with weight {}",
                    entry.source, entry.target, entry.weight
                );
                continue;
            }
            let source = self.resolver.resolve(&entry.source);
            let target = self.resolver.resolve(&entry.target);
            // Self-pairs after folding are rejected by the accumulator.
            acc.add(&source, &target, entry.weight, &DateRange::default(), None);
        }

        let alias_sets = self.alias_sets();
        let keys: Vec<_> = acc.keys().cloned().collect();
        for key in &keys {
            let left = alias_set_for(&alias_sets, &key.a);
            let right = alias_set_for(&alias_sets, &key.b);
            let exchanges = corpus
                .exchanges_between(&left, &right)
                .await
                .with_context(|| format!("Failed to look up exchanges for {} - {}", key.a, key.b))?;

            let mut range = DateRange::default();
            let mut earliest: Option<(&str, &str)> = None;
            for exchange in &exchanges {
                let Some(ts) = usable_timestamp(exchange.sent_at.as_deref()) else {
                    continue;
                };
                range.observe(Some(ts));
                if earliest.map_or(true, |(best, _)| ts < best) {
                    earliest = Some((ts, exchange.doc_id.as_str()));
                }
            }
            let sample = earliest
                .map(|(_, doc)| doc)
                .or_else(|| exchanges.first().map(|e| e.doc_id.as_str()));
            acc.note_evidence(key, &range, sample);
        }

        Ok(acc.into_edges())
    }

    pub fn profiles(
        &self,
        entities: &[RawEntity],
        activity: &ActivityIndex,
        edges: &[RelationshipEdge],
    ) -> Vec<EntityProfile> {
        let connections = connection_counts(edges);
        ProfileBuilder::new(self.tables, &self.resolver).build(entities, activity, &connections)
    }

    /// Curated aliases grouped by their resolved identity.
    fn alias_sets(&self) -> BTreeMap<String, Vec<String>> {
        let mut sets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (alias, canonical) in self.resolver.resolved_aliases() {
            sets.entry(canonical).or_default().push(alias);
        }
        sets
    }
}

fn alias_set_for(sets: &BTreeMap<String, Vec<String>>, canonical: &str) -> Vec<String> {
    let mut set: BTreeSet<String> = sets.get(canonical).cloned().unwrap_or_default().into_iter().collect();
    set.insert(canonical.to_string());
    set.into_iter().collect()
}
