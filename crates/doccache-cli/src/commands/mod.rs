//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use doccache_graph::{DgraphClient, DgraphConfig, DocumentSync};

use crate::config;

pub mod document;
pub mod replay;
pub mod status;

/// doccache - mirror chain documents into Dgraph
#[derive(Parser)]
#[command(name = "doccache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML file with a [dgraph] table
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dgraph alpha HTTP endpoint
    #[arg(long, global = true, env = "DGRAPH_URL")]
    pub url: Option<String>,

    /// Dgraph API key
    #[arg(long, global = true, env = "DGRAPH_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the base schema if missing and list the Document predicates
    Schema,

    /// Store a chain document, or a JSON array of them
    Store {
        /// JSON file with the chain document(s)
        file: PathBuf,
    },

    /// Delete the document(s) in a file by hash
    Delete {
        /// JSON file with the chain document(s)
        file: PathBuf,
    },

    /// Create or remove a relationship between two documents
    Edge {
        /// Relationship name
        name: String,
        /// Hash of the source document
        from: String,
        /// Hash of the target document
        to: String,
        /// Remove the relationship instead
        #[arg(long)]
        delete: bool,
    },

    /// Show a document by hash
    Get(document::GetArgs),

    /// Print the uid of a document
    Uid {
        /// Document hash
        hash: String,
    },

    /// Apply a JSON-lines event stream in order
    Replay {
        /// Events file, one JSON event per line
        file: PathBuf,
        /// Replay into an in-memory store instead of Dgraph
        #[arg(long)]
        dry_run: bool,
    },

    /// Show Dgraph health and schema readiness
    Status,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let dgraph = config::resolve(self.config.as_deref(), self.url, self.auth_token)?;

        match self.command {
            Commands::Schema => status::cmd_schema(&connect(&dgraph).await?).await,
            Commands::Store { file } => document::cmd_store(&connect(&dgraph).await?, &file).await,
            Commands::Delete { file } => document::cmd_delete(&connect(&dgraph).await?, &file).await,
            Commands::Edge { name, from, to, delete } => {
                document::cmd_edge(&connect(&dgraph).await?, name, from, to, delete).await
            }
            Commands::Get(args) => document::cmd_get(&connect(&dgraph).await?, args).await,
            Commands::Uid { hash } => document::cmd_uid(&connect(&dgraph).await?, &hash).await,
            Commands::Replay { file, dry_run } => replay::execute(&dgraph, &file, dry_run).await,
            Commands::Status => status::cmd_status(&dgraph).await,
        }
    }
}

/// Connect to Dgraph and wrap the client in a synchronizer.
pub async fn connect(config: &DgraphConfig) -> Result<DocumentSync> {
    debug!(url = %config.url, "Connecting to Dgraph");
    let client = DgraphClient::connect(config)
        .await
        .with_context(|| format!("Cannot reach Dgraph at {}", config.url))?;
    Ok(DocumentSync::new(Arc::new(client)))
}
