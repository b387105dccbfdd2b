mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quarry::{Client, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::DocumentSource;

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Quarry CLI - compile and run query descriptions against a search cluster")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "quarry.toml")]
    config: PathBuf,

    /// Cluster URL, overrides the config file
    #[arg(long, env = "QUARRY_URL")]
    url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the search request a query file compiles to
    Compile {
        /// YAML or JSON query description
        query: PathBuf,
    },

    /// Run a query file and print matching documents as JSONL
    Search {
        /// YAML or JSON query description
        query: PathBuf,

        /// Stream every match through a scroll cursor
        #[arg(long)]
        all: bool,
    },

    /// Fetch one document by id
    Get {
        /// Collection name
        collection: String,

        /// Document id
        id: String,
    },

    /// Delete every document matching a query file
    Delete {
        /// YAML or JSON query description
        query: PathBuf,

        /// Version conflict handling: abort or proceed
        #[arg(long)]
        conflicts: Option<String>,

        /// Refresh after deleting: true or false
        #[arg(long)]
        refresh: Option<String>,
    },

    /// Bulk-index documents from a JSONL file or stdin
    Import {
        /// Target collection
        collection: String,

        /// JSONL file (reads stdin when omitted)
        input: Option<PathBuf>,

        /// Documents per bulk request
        #[arg(long, default_value = "500")]
        batch_size: usize,

        /// Disable progress output
        #[arg(long)]
        no_progress: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(url) = cli.url {
        config.connection.url = url;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let client = Client::from_config(&config)?;

    match cli.command {
        Commands::Compile { query } => commands::run_compile(&client, &query)?,
        Commands::Search { query, all } => commands::run_search(&client, &query, all).await?,
        Commands::Get { collection, id } => commands::run_get(&client, &collection, &id).await?,
        Commands::Delete {
            query,
            conflicts,
            refresh,
        } => {
            commands::run_delete(&client, &query, conflicts.as_deref(), refresh.as_deref())
                .await?
        }
        Commands::Import {
            collection,
            input,
            batch_size,
            no_progress,
        } => {
            let source = match input {
                Some(path) => DocumentSource::FromFile(path),
                None => DocumentSource::FromStdin,
            };
            commands::run_import(&client, &collection, source, batch_size, no_progress).await?
        }
    }

    Ok(())
}
