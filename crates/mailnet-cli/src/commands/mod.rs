pub mod build;
pub mod query;

use anyhow::{Context, Result};
use mailnet_ingest::CorpusStore;

use crate::paths::MailnetPaths;

/// Open the message store named by `paths`. The store must already exist.
pub async fn open_store(paths: &MailnetPaths) -> Result<CorpusStore> {
    CorpusStore::open(&paths.db_path)
        .await
        .with_context(|| format!("Failed to open message store {}", paths.db_path.display()))
}
