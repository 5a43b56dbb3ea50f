//! Graph Query Engine.
//!
//! Read-only views over a built graph: bounded ego networks, the
//! weight-filtered edge listing, top relationships, person and pair views
//! and the extraction summary. Queries never mutate the store and must not
//! run while a build is in progress.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::curation::DEFAULT_ROLE;
use crate::participants::DateRange;
use crate::schema::{EntityProfile, GraphLink, GraphNode, GraphView, RelationshipEdge, RelationshipType};
use crate::storage::{GraphStore, TypeStats};

/// Partners listed per person view.
pub const PERSON_RELATIONSHIP_LIMIT: usize = 100;
/// Mutual connections listed per pair view.
pub const MUTUAL_CONNECTION_LIMIT: usize = 20;
/// Profiles listed in the summary.
pub const SUMMARY_TOP_CONNECTED: i64 = 15;

/// Configuration for graph queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Minimum per-edge weight for the edge listing (default: 3)
    pub default_min_weight: i64,
    /// Maximum nodes in the edge listing (default: 150)
    pub node_cap: usize,
    /// Default row count for top relationships (default: 50)
    pub top_limit: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_min_weight: 3,
            node_cap: 150,
            top_limit: 50,
        }
    }
}

/// One typed edge with both endpoints' names and roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopRelationship {
    #[serde(flatten)]
    pub edge: RelationshipEdge,
    pub name_a: String,
    pub name_b: String,
    pub role_a: String,
    pub role_b: String,
}

/// An edge seen from one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerEdge {
    #[serde(flatten)]
    pub edge: RelationshipEdge,
    pub partner: String,
    pub partner_name: String,
}

/// All edge types to one partner, folded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub address: String,
    pub name: String,
    pub types: BTreeMap<RelationshipType, i64>,
    pub total_weight: i64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonView {
    pub profile: EntityProfile,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSide {
    pub address: String,
    pub profile: Option<EntityProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutualConnection {
    pub address: String,
    pub canonical_name: String,
    pub total_connections: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairView {
    pub entity_a: PairSide,
    pub entity_b: PairSide,
    pub relationships: Vec<RelationshipEdge>,
    pub mutual_connections: Vec<MutualConnection>,
}

/// Post-build overview of the graph tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub by_type: Vec<TypeStats>,
    pub total_relationships: i64,
    pub total_profiles: i64,
    pub total_aliases: i64,
    pub total_mentions: i64,
    /// Most connected non-principal profiles.
    pub top_connected: Vec<EntityProfile>,
}

/// Read-side engine over a [`GraphStore`].
pub struct GraphQueryEngine {
    store: GraphStore,
    config: QueryConfig,
}

impl GraphQueryEngine {
    pub fn new(store: GraphStore) -> Self {
        Self::with_config(store, QueryConfig::default())
    }

    pub fn with_config(store: GraphStore, config: QueryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Breadth-first expansion from `start` for `depth` rounds.
    ///
    /// Each pair appears once in the result whatever its number of typed
    /// edges; the kept edge is the first in `(entity_a, entity_b, type)`
    /// order. Only nodes with a profile are returned.
    #[instrument(skip(self))]
    pub async fn ego_network(&self, start: &str, depth: u32) -> Result<GraphView> {
        let canonical = self.store.resolve_alias(start).await?;
        let mut visited: BTreeSet<String> = BTreeSet::from([canonical.clone()]);
        let mut frontier: Vec<String> = vec![canonical];
        let mut pairs: BTreeMap<(String, String), RelationshipEdge> = BTreeMap::new();

        for round in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let edges = self.store.edges_touching(&frontier).await?;
            let mut next: BTreeSet<String> = BTreeSet::new();
            for edge in edges {
                for address in [&edge.entity_a, &edge.entity_b] {
                    if visited.insert(address.clone()) {
                        next.insert(address.clone());
                    }
                }
                pairs
                    .entry((edge.entity_a.clone(), edge.entity_b.clone()))
                    .or_insert(edge);
            }
            debug!("Ego round {}: {} new nodes", round + 1, next.len());
            frontier = next.into_iter().collect();
        }

        let addresses: Vec<String> = visited.into_iter().collect();
        let links = pairs.into_values().map(|edge| GraphLink {
            source: edge.entity_a,
            target: edge.entity_b,
            weight: edge.weight,
            relationship_type: edge.relationship_type,
        });
        self.view(&addresses, links).await
    }

    /// Weight-filtered edge listing with deterministic node truncation.
    ///
    /// Typed edges at or above `min_weight` are grouped by pair with their
    /// weights summed; the reported type is the heaviest contributing edge's.
    /// When more than `node_cap` nodes remain, the `node_cap` nodes with the
    /// largest summed incident weight are kept (ties by address) and links
    /// are re-filtered to that set. Unknown type filters are ignored.
    #[instrument(skip(self))]
    pub async fn edge_listing(
        &self,
        min_weight: Option<i64>,
        node_cap: Option<usize>,
        type_filter: Option<&str>,
    ) -> Result<GraphView> {
        let min_weight = min_weight.unwrap_or(self.config.default_min_weight);
        let node_cap = node_cap.unwrap_or(self.config.node_cap);
        let relationship_type = RelationshipType::parse_filter(type_filter);

        let edges = self.store.edges_min_weight(min_weight, relationship_type).await?;
        let mut links = group_by_pair(edges);

        let mut nodes: BTreeSet<String> = links
            .iter()
            .flat_map(|l| [l.source.clone(), l.target.clone()])
            .collect();

        if nodes.len() > node_cap {
            nodes = densest_nodes(&links, node_cap);
            links.retain(|l| nodes.contains(&l.source) && nodes.contains(&l.target));
            debug!("Truncated edge listing to {} nodes", nodes.len());
        }

        let addresses: Vec<String> = nodes.into_iter().collect();
        self.view(&addresses, links).await
    }

    /// Heaviest individual typed edges with endpoint names and roles.
    pub async fn top_relationships(
        &self,
        limit: Option<i64>,
        type_filter: Option<&str>,
        exclude_principal: bool,
    ) -> Result<Vec<TopRelationship>> {
        let limit = limit.unwrap_or(self.config.top_limit);
        let relationship_type = RelationshipType::parse_filter(type_filter);
        let edges = self
            .store
            .top_edges(limit, relationship_type, exclude_principal)
            .await?;

        let addresses: Vec<String> = edges
            .iter()
            .flat_map(|e| [e.entity_a.clone(), e.entity_b.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.profile_map(&addresses).await?;

        Ok(edges
            .into_iter()
            .map(|edge| {
                let (name_a, role_a) = name_and_role(&profiles, &edge.entity_a);
                let (name_b, role_b) = name_and_role(&profiles, &edge.entity_b);
                TopRelationship {
                    edge,
                    name_a,
                    name_b,
                    role_a,
                    role_b,
                }
            })
            .collect())
    }

    /// Profile of the identity `address` resolves to, if any.
    pub async fn profile(&self, address: &str) -> Result<Option<EntityProfile>> {
        let canonical = self.store.resolve_alias(address).await?;
        self.store.get_profile(&canonical).await
    }

    /// Typed edges touching the resolved identity, heaviest first.
    pub async fn relationships_for(&self, address: &str, limit: usize) -> Result<Vec<PartnerEdge>> {
        let canonical = self.store.resolve_alias(address).await?;
        let mut edges = self.store.edges_touching(&[canonical.clone()]).await?;
        // Stable: ties keep the (a, b, type) order.
        edges.sort_by(|x, y| y.weight.cmp(&x.weight));
        edges.truncate(limit);

        let partners: Vec<String> = edges
            .iter()
            .filter_map(|e| e.partner_of(&canonical).map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.profile_map(&partners).await?;

        Ok(edges
            .into_iter()
            .filter_map(|edge| {
                let partner = edge.partner_of(&canonical)?.to_string();
                let (partner_name, _) = name_and_role(&profiles, &partner);
                Some(PartnerEdge {
                    edge,
                    partner,
                    partner_name,
                })
            })
            .collect())
    }

    /// Profile plus every partner with per-type weights folded together.
    pub async fn person(&self, address: &str) -> Result<Option<PersonView>> {
        let Some(profile) = self.profile(address).await? else {
            return Ok(None);
        };

        let mut connections: Vec<Connection> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for partner_edge in self
            .relationships_for(&profile.address, PERSON_RELATIONSHIP_LIMIT)
            .await?
        {
            let slot = *index.entry(partner_edge.partner.clone()).or_insert_with(|| {
                connections.push(Connection {
                    address: partner_edge.partner.clone(),
                    name: partner_edge.partner_name.clone(),
                    types: BTreeMap::new(),
                    total_weight: 0,
                    first_seen: None,
                    last_seen: None,
                });
                connections.len() - 1
            });
            let connection = &mut connections[slot];
            let edge = &partner_edge.edge;
            *connection.types.entry(edge.relationship_type).or_insert(0) += edge.weight;
            connection.total_weight += edge.weight;

            let mut range = DateRange {
                first: connection.first_seen.take(),
                last: connection.last_seen.take(),
            };
            range.merge(&DateRange {
                first: edge.first_seen.clone(),
                last: edge.last_seen.clone(),
            });
            connection.first_seen = range.first;
            connection.last_seen = range.last;
        }
        connections.sort_by(|x, y| {
            y.total_weight
                .cmp(&x.total_weight)
                .then_with(|| x.address.cmp(&y.address))
        });

        Ok(Some(PersonView {
            profile,
            connections,
        }))
    }

    /// Every typed edge between two identities plus their mutual partners.
    pub async fn pair(&self, x: &str, y: &str) -> Result<PairView> {
        let a = self.store.resolve_alias(x).await?;
        let b = self.store.resolve_alias(y).await?;

        let relationships = self.store.edges_between(&a, &b).await?;

        let partners_a = self.partners(&a).await?;
        let partners_b = self.partners(&b).await?;
        let mutual: Vec<String> = partners_a
            .intersection(&partners_b)
            .filter(|p| **p != a && **p != b)
            .cloned()
            .collect();

        let mut mutual_connections: Vec<MutualConnection> = self
            .store
            .profiles_by_addresses(&mutual)
            .await?
            .into_iter()
            .map(|p| MutualConnection {
                address: p.address,
                canonical_name: p.canonical_name,
                total_connections: p.total_connections,
            })
            .collect();
        mutual_connections.sort_by(|m, n| {
            n.total_connections
                .cmp(&m.total_connections)
                .then_with(|| m.address.cmp(&n.address))
        });
        mutual_connections.truncate(MUTUAL_CONNECTION_LIMIT);

        Ok(PairView {
            entity_a: PairSide {
                profile: self.store.get_profile(&a).await?,
                address: a,
            },
            entity_b: PairSide {
                profile: self.store.get_profile(&b).await?,
                address: b,
            },
            relationships,
            mutual_connections,
        })
    }

    /// Counts per type and table, and the most connected non-principals.
    pub async fn summary(&self) -> Result<GraphSummary> {
        Ok(GraphSummary {
            by_type: self.store.type_stats().await?,
            total_relationships: self.store.relationship_count().await?,
            total_profiles: self.store.profile_count().await?,
            total_aliases: self.store.alias_count().await?,
            total_mentions: self.store.mention_count().await?,
            top_connected: self
                .store
                .top_connected_profiles(SUMMARY_TOP_CONNECTED, true)
                .await?,
        })
    }

    async fn partners(&self, canonical: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .edges_touching(&[canonical.to_string()])
            .await?
            .iter()
            .filter_map(|e| e.partner_of(canonical).map(str::to_string))
            .collect())
    }

    async fn profile_map(&self, addresses: &[String]) -> Result<HashMap<String, EntityProfile>> {
        Ok(self
            .store
            .profiles_by_addresses(addresses)
            .await?
            .into_iter()
            .map(|p| (p.address.clone(), p))
            .collect())
    }

    /// Nodes for the profiled subset of `addresses`, and the links whose
    /// endpoints are both profiled.
    async fn view(
        &self,
        addresses: &[String],
        links: impl IntoIterator<Item = GraphLink>,
    ) -> Result<GraphView> {
        let profiles = self.store.profiles_by_addresses(addresses).await?;
        let known: BTreeSet<&str> = profiles.iter().map(|p| p.address.as_str()).collect();
        let links = links
            .into_iter()
            .filter(|l| known.contains(l.source.as_str()) && known.contains(l.target.as_str()))
            .collect();
        let nodes = profiles.iter().map(GraphNode::from).collect();
        Ok(GraphView { nodes, links })
    }
}

/// Sum typed edges per pair. Links come out heaviest first, ties by pair.
fn group_by_pair(edges: Vec<RelationshipEdge>) -> Vec<GraphLink> {
    // (summed weight, heaviest single edge weight, its type)
    let mut grouped: BTreeMap<(String, String), (i64, i64, RelationshipType)> = BTreeMap::new();
    for edge in edges {
        let slot = grouped
            .entry((edge.entity_a, edge.entity_b))
            .or_insert((0, i64::MIN, edge.relationship_type));
        slot.0 += edge.weight;
        if edge.weight > slot.1 || (edge.weight == slot.1 && edge.relationship_type < slot.2) {
            slot.1 = edge.weight;
            slot.2 = edge.relationship_type;
        }
    }

    let mut links: Vec<GraphLink> = grouped
        .into_iter()
        .map(|((source, target), (weight, _, relationship_type))| GraphLink {
            source,
            target,
            weight,
            relationship_type,
        })
        .collect();
    // Stable sort keeps pair order among equal weights.
    links.sort_by(|x, y| y.weight.cmp(&x.weight));
    links
}

/// The `cap` nodes with the largest summed incident weight, ties broken by
/// address.
fn densest_nodes(links: &[GraphLink], cap: usize) -> BTreeSet<String> {
    let mut incident: BTreeMap<&str, i64> = BTreeMap::new();
    for link in links {
        *incident.entry(link.source.as_str()).or_insert(0) += link.weight;
        *incident.entry(link.target.as_str()).or_insert(0) += link.weight;
    }
    let mut ranked: Vec<(&str, i64)> = incident.into_iter().collect();
    ranked.sort_by(|(a, wa), (b, wb)| wb.cmp(wa).then_with(|| a.cmp(b)));
    ranked
        .into_iter()
        .take(cap)
        .map(|(address, _)| address.to_string())
        .collect()
}

fn name_and_role(profiles: &HashMap<String, EntityProfile>, address: &str) -> (String, String) {
    match profiles.get(address) {
        Some(p) => (p.canonical_name.clone(), p.role.clone()),
        None => (address.to_string(), DEFAULT_ROLE.to_string()),
    }
}
