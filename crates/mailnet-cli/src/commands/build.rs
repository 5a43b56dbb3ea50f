use anyhow::Result;
use mailnet_graph::{CuratedTables, GraphBuilder, GraphQueryEngine};
use tracing::info;

use super::open_store;
use crate::paths::MailnetPaths;
use crate::ui;

pub async fn run(paths: &MailnetPaths) -> Result<()> {
    let tables = CuratedTables::load(&paths.curation_path)?;
    info!(
        "Curated tables: {} aliases, {} names, {} principals",
        tables.aliases.len(),
        tables.canonical_names.len(),
        tables.principals.len()
    );

    let corpus = open_store(paths).await?;
    let graph = corpus.graph_store();
    info!(
        "Corpus: {} threads, {} messages",
        corpus.thread_count().await?,
        corpus.message_count().await?
    );

    let pb = ui::spinner("Building relationship graph");
    let report = match GraphBuilder::new(&tables).build(&corpus, &graph).await {
        Ok(report) => report,
        Err(e) => {
            pb.finish_and_clear();
            ui::error("Graph build failed");
            return Err(e);
        }
    };
    pb.finish_and_clear();
    ui::success(&format!("Graph rebuilt in {}ms", report.duration_ms));

    ui::build_report(&report);
    let summary = GraphQueryEngine::new(graph).summary().await?;
    ui::summary(&summary);

    Ok(())
}
