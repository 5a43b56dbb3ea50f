//! Graph storage operations for SQLite.
//!
//! This module provides the `GraphStore` struct for persisting and querying
//! the alias table, relationship edges, mentions and entity profiles.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::schema::{AliasRecord, EntityProfile, Mention, RelationshipEdge, RelationshipType};

/// Identifiers bound per `IN (...)` query.
const BIND_CHUNK: usize = 250;

type EdgeRow = (
    i64,
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

type ProfileRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
    i64,
    bool,
);

const EDGE_COLUMNS: &str =
    "id, entity_a, entity_b, relationship_type, weight, first_seen, last_seen, sample_doc_id, context";

const PROFILE_COLUMNS: &str = "address, canonical_name, all_names, all_emails, role, first_active, \
     last_active, total_messages, total_threads, total_connections, principal";

/// Edge count and summed weight for one relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub relationship_type: RelationshipType,
    pub edge_count: i64,
    pub total_weight: i64,
}

/// Graph storage backed by SQLite.
#[derive(Clone)]
pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    /// Create a new GraphStore with an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the graph schema (called during DB setup).
    #[instrument(skip_all)]
    pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
        // Alias resolution
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entity_aliases (
                alias_address TEXT PRIMARY KEY,
                canonical_address TEXT NOT NULL,
                alias_name TEXT,
                canonical_name TEXT
            )",
        )
        .execute(pool)
        .await?;

        // Typed, weighted edges
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_a TEXT NOT NULL,
                entity_b TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                weight INTEGER NOT NULL DEFAULT 1,
                first_seen TEXT,
                last_seen TEXT,
                sample_doc_id TEXT,
                context TEXT,
                CHECK (entity_a < entity_b)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entity_mentions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_address TEXT NOT NULL,
                message_id TEXT NOT NULL,
                mention_type TEXT NOT NULL,
                context TEXT
            )",
        )
        .execute(pool)
        .await?;

        // Profiles; names and emails are JSON arrays
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entity_profiles (
                address TEXT PRIMARY KEY,
                canonical_name TEXT NOT NULL,
                all_names JSON NOT NULL DEFAULT '[]',
                all_emails JSON NOT NULL DEFAULT '[]',
                role TEXT NOT NULL DEFAULT 'unknown',
                first_active TEXT,
                last_active TEXT,
                total_messages INTEGER NOT NULL DEFAULT 0,
                total_threads INTEGER NOT NULL DEFAULT 0,
                total_connections INTEGER NOT NULL DEFAULT 0,
                principal INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(pool)
        .await?;

        // Indexes for traversal and lookups
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rel_a ON relationships(entity_a)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rel_b ON relationships(entity_b)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rel_type ON relationships(relationship_type)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_mentions_entity ON entity_mentions(entity_address)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_mentions_msg ON entity_mentions(message_id)")
            .execute(pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_aliases_canonical ON entity_aliases(canonical_address)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Drop and recreate the graph tables. Input tables are untouched.
    #[instrument(skip_all)]
    pub async fn reset_schema(pool: &SqlitePool) -> Result<()> {
        for table in ["entity_aliases", "relationships", "entity_mentions", "entity_profiles"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(pool)
                .await
                .with_context(|| format!("Failed to drop {}", table))?;
        }
        Self::init_schema(pool).await
    }

    /// Insert alias rows in one transaction, replacing existing keys.
    #[instrument(skip_all, fields(count = aliases.len()))]
    pub async fn replace_aliases(&self, aliases: &[AliasRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for alias in aliases {
            sqlx::query(
                "INSERT OR REPLACE INTO entity_aliases (alias_address, canonical_address, alias_name, canonical_name)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&alias.alias_address)
            .bind(&alias.canonical_address)
            .bind(&alias.alias_name)
            .bind(&alias.canonical_name)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(aliases.len())
    }

    /// Insert one construction pass's edges in one transaction.
    #[instrument(skip_all, fields(count = edges.len()))]
    pub async fn insert_relationships(&self, edges: &[RelationshipEdge]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for edge in edges {
            sqlx::query(
                "INSERT INTO relationships (entity_a, entity_b, relationship_type, weight, first_seen, last_seen, sample_doc_id, context)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&edge.entity_a)
            .bind(&edge.entity_b)
            .bind(edge.relationship_type.as_str())
            .bind(edge.weight)
            .bind(&edge.first_seen)
            .bind(&edge.last_seen)
            .bind(&edge.sample_doc_id)
            .bind(&edge.context)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert edge {} - {}", edge.entity_a, edge.entity_b))?;
        }
        tx.commit().await?;
        Ok(edges.len())
    }

    #[instrument(skip_all, fields(count = mentions.len()))]
    pub async fn insert_mentions(&self, mentions: &[Mention]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for mention in mentions {
            sqlx::query(
                "INSERT INTO entity_mentions (entity_address, message_id, mention_type, context)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&mention.entity_address)
            .bind(&mention.message_id)
            .bind(mention.mention_type.as_str())
            .bind(&mention.context)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(mentions.len())
    }

    #[instrument(skip_all, fields(count = profiles.len()))]
    pub async fn insert_profiles(&self, profiles: &[EntityProfile]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for profile in profiles {
            sqlx::query(
                "INSERT OR REPLACE INTO entity_profiles
                    (address, canonical_name, all_names, all_emails, role, first_active, last_active,
                     total_messages, total_threads, total_connections, principal)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .bind(&profile.address)
            .bind(&profile.canonical_name)
            .bind(serde_json::to_string(&profile.names)?)
            .bind(serde_json::to_string(&profile.emails)?)
            .bind(&profile.role)
            .bind(&profile.first_active)
            .bind(&profile.last_active)
            .bind(profile.total_messages)
            .bind(profile.total_threads)
            .bind(profile.total_connections)
            .bind(profile.principal)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(profiles.len())
    }

    /// Resolve through the stored alias table. Unknown addresses resolve to
    /// themselves.
    pub async fn resolve_alias(&self, address: &str) -> Result<String> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT canonical_address FROM entity_aliases WHERE alias_address = ?1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(canonical,)| canonical).unwrap_or_else(|| address.to_string()))
    }

    /// Every stored alias of `canonical`, plus `canonical` itself.
    pub async fn alias_set(&self, canonical: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT alias_address FROM entity_aliases WHERE canonical_address = ?1
             UNION SELECT ?1
             ORDER BY 1",
        )
        .bind(canonical)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(alias,)| alias).collect())
    }

    /// All edges with either endpoint in `addresses`, ordered by
    /// `(entity_a, entity_b, relationship_type)`.
    pub async fn edges_touching(&self, addresses: &[String]) -> Result<Vec<RelationshipEdge>> {
        let mut by_id: BTreeMap<i64, RelationshipEdge> = BTreeMap::new();

        for chunk in addresses.chunks(BIND_CHUNK) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!(
                "SELECT {} FROM relationships WHERE entity_a IN ({}) OR entity_b IN ({})",
                EDGE_COLUMNS, placeholders, placeholders
            );
            let mut q = sqlx::query_as::<_, EdgeRow>(&query);
            for address in chunk.iter().chain(chunk.iter()) {
                q = q.bind(address);
            }
            for row in q.fetch_all(&self.pool).await? {
                let id = row.0;
                if let Some(edge) = edge_from_row(row) {
                    by_id.insert(id, edge);
                }
            }
        }

        let mut edges: Vec<RelationshipEdge> = by_id.into_values().collect();
        edges.sort_by(|x, y| {
            (&x.entity_a, &x.entity_b, x.relationship_type)
                .cmp(&(&y.entity_a, &y.entity_b, y.relationship_type))
        });
        Ok(edges)
    }

    /// Every typed edge between two identities.
    pub async fn edges_between(&self, x: &str, y: &str) -> Result<Vec<RelationshipEdge>> {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        let query = format!(
            "SELECT {} FROM relationships WHERE entity_a = ?1 AND entity_b = ?2
             ORDER BY weight DESC, relationship_type",
            EDGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, EdgeRow>(&query)
            .bind(a)
            .bind(b)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().filter_map(edge_from_row).collect())
    }

    /// Edges with `weight >= min_weight`, optionally of one type, heaviest
    /// first.
    pub async fn edges_min_weight(
        &self,
        min_weight: i64,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<RelationshipEdge>> {
        let query = format!(
            "SELECT {} FROM relationships
             WHERE weight >= ?1 AND (?2 IS NULL OR relationship_type = ?2)
             ORDER BY weight DESC, entity_a, entity_b, relationship_type",
            EDGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, EdgeRow>(&query)
            .bind(min_weight)
            .bind(relationship_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().filter_map(edge_from_row).collect())
    }

    /// Heaviest individual edges. With `exclude_principal`, edges touching a
    /// principal profile are skipped before the limit applies.
    pub async fn top_edges(
        &self,
        limit: i64,
        relationship_type: Option<RelationshipType>,
        exclude_principal: bool,
    ) -> Result<Vec<RelationshipEdge>> {
        let query = "SELECT r.id, r.entity_a, r.entity_b, r.relationship_type, r.weight,
                    r.first_seen, r.last_seen, r.sample_doc_id, r.context
             FROM relationships r
             LEFT JOIN entity_profiles pa ON pa.address = r.entity_a
             LEFT JOIN entity_profiles pb ON pb.address = r.entity_b
             WHERE (?1 IS NULL OR r.relationship_type = ?1)
               AND (?2 = 0 OR (COALESCE(pa.principal, 0) = 0 AND COALESCE(pb.principal, 0) = 0))
             ORDER BY r.weight DESC, r.entity_a, r.entity_b, r.relationship_type
             LIMIT ?3";
        let rows = sqlx::query_as::<_, EdgeRow>(query)
            .bind(relationship_type.map(|t| t.as_str()))
            .bind(exclude_principal)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().filter_map(edge_from_row).collect())
    }

    /// Get a profile by canonical address.
    pub async fn get_profile(&self, address: &str) -> Result<Option<EntityProfile>> {
        let query = format!("SELECT {} FROM entity_profiles WHERE address = ?1", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(profile_from_row))
    }

    /// Profiles for the given addresses, ordered by address. Addresses
    /// without a profile are absent from the result.
    pub async fn profiles_by_addresses(&self, addresses: &[String]) -> Result<Vec<EntityProfile>> {
        let mut profiles = Vec::new();
        for chunk in addresses.chunks(BIND_CHUNK) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!(
                "SELECT {} FROM entity_profiles WHERE address IN ({})",
                PROFILE_COLUMNS, placeholders
            );
            let mut q = sqlx::query_as::<_, ProfileRow>(&query);
            for address in chunk {
                q = q.bind(address);
            }
            profiles.extend(q.fetch_all(&self.pool).await?.into_iter().map(profile_from_row));
        }
        profiles.sort_by(|x, y| x.address.cmp(&y.address));
        profiles.dedup_by(|x, y| x.address == y.address);
        Ok(profiles)
    }

    /// Most connected profiles, optionally skipping principals.
    pub async fn top_connected_profiles(
        &self,
        limit: i64,
        exclude_principal: bool,
    ) -> Result<Vec<EntityProfile>> {
        let query = format!(
            "SELECT {} FROM entity_profiles
             WHERE (?1 = 0 OR principal = 0)
             ORDER BY total_connections DESC, address
             LIMIT ?2",
            PROFILE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(exclude_principal)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(profile_from_row).collect())
    }

    /// Edge count and total weight per relationship type, most edges first.
    pub async fn type_stats(&self) -> Result<Vec<TypeStats>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT relationship_type, COUNT(*) as cnt, COALESCE(SUM(weight), 0)
             FROM relationships GROUP BY relationship_type ORDER BY cnt DESC, relationship_type",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(ty, edge_count, total_weight)| {
                Some(TypeStats {
                    relationship_type: RelationshipType::parse(&ty)?,
                    edge_count,
                    total_weight,
                })
            })
            .collect())
    }

    pub async fn relationship_count(&self) -> Result<i64> {
        self.count("relationships").await
    }

    pub async fn profile_count(&self) -> Result<i64> {
        self.count("entity_profiles").await
    }

    pub async fn alias_count(&self) -> Result<i64> {
        self.count("entity_aliases").await
    }

    pub async fn mention_count(&self) -> Result<i64> {
        self.count("entity_mentions").await
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn edge_from_row(row: EdgeRow) -> Option<RelationshipEdge> {
    let (_, entity_a, entity_b, ty, weight, first_seen, last_seen, sample_doc_id, context) = row;
    let Some(relationship_type) = RelationshipType::parse(&ty) else {
        debug!("Skipping edge with unknown type {:?}", ty);
        return None;
    };
    Some(RelationshipEdge {
        entity_a,
        entity_b,
        relationship_type,
        weight,
        first_seen,
        last_seen,
        sample_doc_id,
        context,
    })
}

fn profile_from_row(row: ProfileRow) -> EntityProfile {
    let (
        address,
        canonical_name,
        names,
        emails,
        role,
        first_active,
        last_active,
        total_messages,
        total_threads,
        total_connections,
        principal,
    ) = row;
    EntityProfile {
        address,
        canonical_name,
        names: serde_json::from_str(&names).unwrap_or_default(),
        emails: serde_json::from_str(&emails).unwrap_or_default(),
        role,
        first_active,
        last_active,
        total_messages,
        total_threads,
        total_connections,
        principal,
    }
}
