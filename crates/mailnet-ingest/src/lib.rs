use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, SqlitePool};
use std::str::FromStr;
use tracing::{debug, instrument};

use mailnet_graph::{
    AddressPairTally, CorpusReader, Exchange, GraphError, MessageBody, ParticipantRole,
    Participation, RawEntity,
};

// Re-export graph types for convenience
pub use mailnet_graph::{GraphBuilder, GraphQueryEngine, GraphStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub doc_id: String,
    pub subject: Option<String>,
    pub message_count: i64,
    pub latest_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub doc_id: String,
    pub message_index: i64,
    pub sender_address: String,
    pub sender_name: Option<String>,
    pub subject: Option<String>,
    pub sent_at: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub message_id: String,
    pub address: String,
    pub name: Option<String>,
    pub role: ParticipantRole,
}

/// The loader's message store: threads, messages, recipients and the two
/// raw tallies. The graph tables live in the same database.
#[derive(Clone)]
pub struct CorpusStore {
    pool: SqlitePool,
}

impl CorpusStore {
    /// Open an existing store. A missing or unreadable file is reported as
    /// [`GraphError::StoreUnavailable`].
    pub async fn open(db_path: &Path) -> Result<Self> {
        Self::connect(db_path, false).await
    }

    /// Open a store, creating the file and its parent directory if needed.
    pub async fn create(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::connect(db_path, true).await
    }

    /// Wrap an existing pool, creating any missing tables.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn connect(db_path: &Path, create: bool) -> Result<Self> {
        let unavailable = |source: sqlx::Error| GraphError::StoreUnavailable {
            location: db_path.display().to_string(),
            source,
        };
        let options = SqliteConnectOptions::from_str("sqlite:")
            .map_err(unavailable)?
            .filename(db_path)
            .create_if_missing(create);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(unavailable)?;
        Self::with_pool(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a GraphStore instance backed by the same database.
    pub fn graph_store(&self) -> GraphStore {
        GraphStore::new(self.pool.clone())
    }

    #[instrument(skip_all)]
    async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS threads (\
                doc_id TEXT PRIMARY KEY,\
                subject TEXT,\
                message_count INTEGER NOT NULL DEFAULT 0,\
                latest_date TEXT\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (\
                id TEXT PRIMARY KEY,\
                doc_id TEXT NOT NULL REFERENCES threads(doc_id),\
                message_index INTEGER NOT NULL DEFAULT 0,\
                sender_address TEXT,\
                sender_name TEXT,\
                subject TEXT,\
                sent_at TEXT,\
                body_text TEXT,\
                body_html TEXT\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS recipients (\
                message_id TEXT NOT NULL REFERENCES messages(id),\
                address TEXT NOT NULL,\
                name TEXT,\
                role TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        // Raw tallies, built without alias awareness
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                address TEXT UNIQUE NOT NULL,\
                name TEXT,\
                message_count INTEGER NOT NULL DEFAULT 0,\
                principal INTEGER NOT NULL DEFAULT 0\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS edges (\
                source_address TEXT NOT NULL,\
                target_address TEXT NOT NULL,\
                weight INTEGER NOT NULL DEFAULT 1,\
                PRIMARY KEY (source_address, target_address)\
            )",
        )
        .execute(&self.pool)
        .await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_messages_doc_id ON messages(doc_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages(sent_at)",
            "CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_address)",
            "CREATE INDEX IF NOT EXISTS idx_recipients_message_id ON recipients(message_id)",
            "CREATE INDEX IF NOT EXISTS idx_recipients_address ON recipients(address)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        GraphStore::init_schema(&self.pool).await?;

        Ok(())
    }

    pub async fn insert_thread(&self, thread: &ThreadRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO threads (doc_id, subject, message_count, latest_date) \
            VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&thread.doc_id)
        .bind(&thread.subject)
        .bind(thread.message_count)
        .bind(&thread.latest_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_message(&self, message: &MessageRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO messages \
                (id, doc_id, message_index, sender_address, sender_name, subject, sent_at, body_text, body_html) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&message.id)
        .bind(&message.doc_id)
        .bind(message.message_index)
        .bind(&message.sender_address)
        .bind(&message.sender_name)
        .bind(&message.subject)
        .bind(&message.sent_at)
        .bind(&message.body_text)
        .bind(&message.body_html)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_recipient(&self, recipient: &RecipientRecord) -> Result<()> {
        sqlx::query("INSERT INTO recipients (message_id, address, name, role) VALUES (?1, ?2, ?3, ?4)")
            .bind(&recipient.message_id)
            .bind(&recipient.address)
            .bind(&recipient.name)
            .bind(recipient.role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_entity(&self, entity: &RawEntity) -> Result<()> {
        sqlx::query(
            "INSERT INTO entities (address, name, message_count, principal) VALUES (?1, ?2, ?3, ?4) \
            ON CONFLICT(address) DO UPDATE SET \
                name = COALESCE(NULLIF(excluded.name, ''), entities.name), \
                message_count = excluded.message_count, \
                principal = excluded.principal",
        )
        .bind(&entity.address)
        .bind(&entity.name)
        .bind(entity.message_count)
        .bind(entity.principal)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Add `weight` to the directed count `source -> target`.
    pub async fn add_tally(&self, source: &str, target: &str, weight: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO edges (source_address, target_address, weight) VALUES (?1, ?2, ?3) \
            ON CONFLICT(source_address, target_address) DO UPDATE SET weight = edges.weight + excluded.weight",
        )
        .bind(source)
        .bind(target)
        .bind(weight)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Threads in which both address sets took part, latest first.
    pub async fn shared_threads(
        &self,
        left: &[String],
        right: &[String],
        limit: i64,
    ) -> Result<Vec<ThreadRecord>> {
        if left.is_empty() || right.is_empty() {
            return Ok(Vec::new());
        }
        let lp = left.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let rp = right.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT t.doc_id, t.subject, t.message_count, t.latest_date FROM threads t \
            WHERE t.doc_id IN ( \
                SELECT m.doc_id FROM messages m WHERE m.sender_address IN ({lp}) \
                UNION SELECT m.doc_id FROM messages m JOIN recipients r ON m.id = r.message_id WHERE r.address IN ({lp}) \
            ) AND t.doc_id IN ( \
                SELECT m.doc_id FROM messages m WHERE m.sender_address IN ({rp}) \
                UNION SELECT m.doc_id FROM messages m JOIN recipients r ON m.id = r.message_id WHERE r.address IN ({rp}) \
            ) \
            ORDER BY t.latest_date DESC, t.doc_id \
            LIMIT ?"
        );
        let mut q = sqlx::query_as::<_, (String, Option<String>, i64, Option<String>)>(&query);
        for address in left.iter().chain(left).chain(right).chain(right) {
            q = q.bind(address);
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(doc_id, subject, message_count, latest_date)| ThreadRecord {
                doc_id,
                subject,
                message_count,
                latest_date,
            })
            .collect())
    }

    /// Get total thread count
    pub async fn thread_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Get total message count
    pub async fn message_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl CorpusReader for CorpusStore {
    async fn raw_entities(&self) -> Result<Vec<RawEntity>> {
        let rows = sqlx::query_as::<_, (String, Option<String>, i64, bool)>(
            "SELECT address, name, message_count, principal FROM entities ORDER BY address",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(address, name, message_count, principal)| RawEntity {
                address,
                name: name.unwrap_or_default(),
                message_count,
                principal,
            })
            .collect())
    }

    async fn participations(&self) -> Result<Vec<Participation>> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>)>(
            "SELECT m.doc_id, m.sender_address, 'sender', m.sent_at FROM messages m \
            WHERE m.sender_address IS NOT NULL AND m.sender_address != '' \
            UNION ALL \
            SELECT m.doc_id, r.address, r.role, m.sent_at FROM messages m \
            JOIN recipients r ON m.id = r.message_id \
            WHERE r.address != ''",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(doc_id, address, role, sent_at)| Participation {
                doc_id,
                address,
                role: ParticipantRole::parse(&role).unwrap_or_else(|| {
                    debug!("Unknown recipient role {:?}, treating as 'to'", role);
                    ParticipantRole::To
                }),
                sent_at,
            })
            .collect())
    }

    async fn message_bodies(&self) -> Result<Vec<MessageBody>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, Option<String>)>(
            "SELECT id, doc_id, sender_address, sent_at, body_text FROM messages \
            WHERE body_text IS NOT NULL AND body_text != '' \
            ORDER BY doc_id, message_index, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, doc_id, sender, sent_at, body)| MessageBody {
                id,
                doc_id,
                sender_address: sender.unwrap_or_default(),
                sent_at,
                body,
            })
            .collect())
    }

    async fn address_pair_tally(&self) -> Result<Vec<AddressPairTally>> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT source_address, target_address, weight FROM edges ORDER BY source_address, target_address",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(source, target, weight)| AddressPairTally {
                source,
                target,
                weight,
            })
            .collect())
    }

    async fn exchanges_between(&self, left: &[String], right: &[String]) -> Result<Vec<Exchange>> {
        if left.is_empty() || right.is_empty() {
            return Ok(Vec::new());
        }
        let lp = left.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let rp = right.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT DISTINCT m.id, m.doc_id, m.sent_at FROM messages m \
            JOIN recipients r ON m.id = r.message_id \
            WHERE (m.sender_address IN ({lp}) AND r.address IN ({rp})) \
               OR (m.sender_address IN ({rp}) AND r.address IN ({lp})) \
            ORDER BY m.sent_at, m.id"
        );
        let mut q = sqlx::query_as::<_, (String, String, Option<String>)>(&query);
        for address in left.iter().chain(right).chain(right).chain(left) {
            q = q.bind(address);
        }
        let rows = q.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(_, doc_id, sent_at)| Exchange { doc_id, sent_at })
            .collect())
    }
}
