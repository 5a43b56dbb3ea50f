use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mailnet_graph::RelationshipType;

mod commands;
mod paths;
mod ui;

use paths::MailnetPaths;

#[derive(Parser)]
#[command(name = "mailnet")]
#[command(about = "Who wrote to whom. Correspondent graphs from email threads.")]
#[command(version)]
struct Cli {
    /// Message store to read (defaults to mailnet.db in the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Curated alias/name/role tables (defaults to curation.toml in the
    /// data directory, or the built-in tables when that file is absent)
    #[arg(long, global = true, value_name = "PATH")]
    curation: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild aliases, relationships, mentions and profiles
    Build,

    /// Show edge counts per type and the most connected people
    Summary,

    /// Ego network around one address
    Ego {
        #[arg(value_name = "ADDRESS")]
        address: String,

        /// Number of hops to expand
        #[arg(long, short, default_value = "2")]
        depth: u32,
    },

    /// Weight-filtered graph of the whole corpus
    Graph {
        /// Drop edges lighter than this
        #[arg(long)]
        min_weight: Option<i64>,

        /// Keep at most this many nodes
        #[arg(long)]
        limit: Option<usize>,

        /// Only edges of this type
        #[arg(long = "type", value_name = "TYPE")]
        relationship_type: Option<EdgeType>,
    },

    /// Heaviest individual relationships
    Top {
        #[arg(long)]
        limit: Option<i64>,

        /// Only edges of this type
        #[arg(long = "type", value_name = "TYPE")]
        relationship_type: Option<EdgeType>,

        /// Skip edges touching a principal
        #[arg(long)]
        exclude_principal: bool,
    },

    /// Profile and connections of one person
    Person {
        #[arg(value_name = "ADDRESS")]
        address: String,
    },

    /// Everything linking two people
    Pair {
        #[arg(value_name = "A")]
        a: String,
        #[arg(value_name = "B")]
        b: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EdgeType {
    #[value(name = "co-participant")]
    CoParticipant,
    #[value(name = "forwarded")]
    Forwarded,
    #[value(name = "direct_email")]
    DirectEmail,
}

impl EdgeType {
    fn filter(edge_type: Option<Self>) -> Option<&'static str> {
        edge_type.map(|t| RelationshipType::from(t).as_str())
    }
}

impl From<EdgeType> for RelationshipType {
    fn from(edge_type: EdgeType) -> Self {
        match edge_type {
            EdgeType::CoParticipant => RelationshipType::CoParticipant,
            EdgeType::Forwarded => RelationshipType::Forwarded,
            EdgeType::DirectEmail => RelationshipType::DirectEmail,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so query output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = MailnetPaths::from_env().with_overrides(cli.db, cli.curation);

    match cli.command {
        Commands::Build => commands::build::run(&paths).await,
        Commands::Summary => commands::query::summary(&paths).await,
        Commands::Ego { address, depth } => commands::query::ego(&paths, &address, depth).await,
        Commands::Graph {
            min_weight,
            limit,
            relationship_type,
        } => commands::query::graph(&paths, min_weight, limit, EdgeType::filter(relationship_type)).await,
        Commands::Top {
            limit,
            relationship_type,
            exclude_principal,
        } => {
            commands::query::top(&paths, limit, EdgeType::filter(relationship_type), exclude_principal)
                .await
        }
        Commands::Person { address } => commands::query::person(&paths, &address).await,
        Commands::Pair { a, b } => commands::query::pair(&paths, &a, &b).await,
    }
}
