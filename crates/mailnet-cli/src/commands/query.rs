use anyhow::{bail, Result};
use mailnet_graph::{GraphQueryEngine, PairView};
use mailnet_ingest::ThreadRecord;
use serde::Serialize;

use super::open_store;
use crate::paths::MailnetPaths;
use crate::ui;

const SHARED_THREAD_LIMIT: i64 = 20;

#[derive(Serialize)]
struct PairOutput {
    #[serde(flatten)]
    view: PairView,
    shared_threads: Vec<ThreadRecord>,
}

async fn engine(paths: &MailnetPaths) -> Result<GraphQueryEngine> {
    let corpus = open_store(paths).await?;
    Ok(GraphQueryEngine::new(corpus.graph_store()))
}

pub async fn summary(paths: &MailnetPaths) -> Result<()> {
    let summary = engine(paths).await?.summary().await?;
    ui::json(&summary)
}

pub async fn ego(paths: &MailnetPaths, address: &str, depth: u32) -> Result<()> {
    let view = engine(paths).await?.ego_network(address, depth).await?;
    ui::json(&view)
}

pub async fn graph(
    paths: &MailnetPaths,
    min_weight: Option<i64>,
    limit: Option<usize>,
    relationship_type: Option<&str>,
) -> Result<()> {
    let view = engine(paths)
        .await?
        .edge_listing(min_weight, limit, relationship_type)
        .await?;
    ui::json(&view)
}

pub async fn top(
    paths: &MailnetPaths,
    limit: Option<i64>,
    relationship_type: Option<&str>,
    exclude_principal: bool,
) -> Result<()> {
    let rows = engine(paths)
        .await?
        .top_relationships(limit, relationship_type, exclude_principal)
        .await?;
    ui::json(&rows)
}

pub async fn person(paths: &MailnetPaths, address: &str) -> Result<()> {
    match engine(paths).await?.person(address).await? {
        Some(view) => ui::json(&view),
        None => bail!("No profile for {}", address),
    }
}

pub async fn pair(paths: &MailnetPaths, a: &str, b: &str) -> Result<()> {
    let corpus = open_store(paths).await?;
    let graph = corpus.graph_store();
    let view = GraphQueryEngine::new(graph.clone()).pair(a, b).await?;

    let left = graph.alias_set(&view.entity_a.address).await?;
    let right = graph.alias_set(&view.entity_b.address).await?;
    let shared_threads = corpus
        .shared_threads(&left, &right, SHARED_THREAD_LIMIT)
        .await?;

    ui::json(&PairOutput {
        view,
        shared_threads,
    })
}
