//! Typed errors callers may want to match on.
//!
//! Everything else flows through `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    /// The message store could not be opened. This is the only condition
    /// that aborts a build outright.
    #[error("message store unavailable at {location}: {source}")]
    StoreUnavailable {
        location: String,
        #[source]
        source: sqlx::Error,
    },

    /// Curated tables failed validation.
    #[error("invalid curated tables: {0}")]
    InvalidCuration(String),
}
