//! Mailnet Graph - identity resolution and relationship graph for email
//! corpora.
//!
//! This crate turns a corpus of email threads into a deduplicated graph of
//! correspondents. It includes:
//!
//! - **Curation**: the externally supplied alias, name, role and principal
//!   tables
//! - **Identity**: alias-chain resolution onto canonical identities
//! - **Pipeline**: the batch build (aliases, co-participation, forwarded
//!   headers, direct tally, profiles)
//! - **Storage**: SQLite-backed persistence of aliases, edges, mentions and
//!   profiles
//! - **Query**: ego networks, filtered edge listings and person/pair views
//!
//! # Example
//!
//! ```ignore
//! use mailnet_graph::{CuratedTables, GraphBuilder, GraphQueryEngine, GraphStore};
//!
//! let tables = CuratedTables::load(&curation_path)?;
//! let store = GraphStore::new(pool);
//!
//! // Rebuild the graph from a corpus
//! let report = GraphBuilder::new(&tables).build(&corpus, &store).await?;
//!
//! // Two hops around one correspondent
//! let engine = GraphQueryEngine::new(store);
//! let view = engine.ego_network("jeevacation@gmail.com", 2).await?;
//! ```

pub mod accumulator;
pub mod corpus;
pub mod curation;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod participants;
pub mod pipeline;
pub mod profiles;
pub mod query;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use corpus::{CorpusReader, MemoryCorpus, MemoryMessage};
pub use curation::CuratedTables;
pub use error::GraphError;
pub use identity::IdentityResolver;
pub use pipeline::{BuildReport, GraphBuilder, PipelineConfig};
pub use query::{GraphQueryEngine, GraphSummary, PairView, PersonView, QueryConfig, TopRelationship};
pub use schema::{
    AddressPairTally, EntityProfile, Exchange, GraphLink, GraphNode, GraphView, MessageBody,
    ParticipantRole, Participation, RawEntity, RelationshipEdge, RelationshipType,
};
pub use storage::{GraphStore, TypeStats};
