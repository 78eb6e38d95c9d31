//! # profile-sync CLI (`psync`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `psync normalize` | Group the tag CSV into per-customer records and write the handoff file |
//! | `psync sync` | Insert a handoff file into a collection |
//! | `psync sample` | Print up to N records of a collection |
//! | `psync find --where k=v` | Print records whose metadata matches |
//! | `psync collections ensure <name>` | Create a collection if it is missing |
//! | `psync collections delete <name>` | Drop a collection and its records |
//! | `psync ping` | Check connectivity and credentials |
//! | `psync flow check <file>` | Validate a conversational flow file |
//!
//! ## Examples
//!
//! ```bash
//! psync normalize --input data/user_rawdata.csv
//! CHROMADB_USER=admin CHROMADB_PASSWORD=... psync sync --collection user_info
//! psync sample --collection product_info --limit 5 --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use profile_sync::config;
use profile_sync::flow;
use profile_sync::normalize;
use profile_sync::retrieve;
use profile_sync::store::chroma::ChromaClient;
use profile_sync::store::DocumentStore;
use profile_sync::sync;

/// Normalize customer tag data and sync it into Chroma.
///
/// Connection settings come from the `[store]` section of the config file;
/// `CHROMADB_HOST`, `CHROMADB_PORT`, `CHROMADB_USER` and `CHROMADB_PASSWORD`
/// override it.
#[derive(Parser)]
#[command(name = "psync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./config/psync.toml` is used if it exists and built-in
    /// defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Default log filter (overridden by `RUST_LOG`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the tag CSV into the handoff file.
    Normalize {
        /// CSV input (defaults to `normalize.input`).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Handoff output (defaults to `normalize.output`).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Insert a handoff file into a collection in one batch.
    ///
    /// Ids already present in the collection reject the whole batch.
    Sync {
        /// Handoff file (defaults to `normalize.output`).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Target collection (defaults to `collections.user_info`).
        #[arg(long)]
        collection: Option<String>,

        /// Validate the file and batch without connecting.
        #[arg(long)]
        dry_run: bool,

        /// Delete the collection before inserting.
        #[arg(long)]
        replace: bool,
    },

    /// Print a bounded sample of a collection.
    Sample {
        /// Collection (defaults to `collections.user_info`).
        #[arg(long)]
        collection: Option<String>,

        /// Maximum number of records (at least 1).
        #[arg(long, default_value = "10")]
        limit: NonZeroUsize,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print records whose metadata matches every `--where` clause.
    Find {
        /// Collection (defaults to `collections.product_info`).
        #[arg(long)]
        collection: Option<String>,

        /// `field=value` or `field!=value`; repeat for a conjunction.
        #[arg(long = "where", required = true)]
        clauses: Vec<String>,

        /// Maximum number of records (at least 1).
        #[arg(long)]
        limit: Option<NonZeroUsize>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Administer collections.
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Connect to the store and report success.
    Ping,

    /// Conversational flow configuration tools.
    Flow {
        #[command(subcommand)]
        action: FlowAction,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// Create the collection if it does not exist.
    Ensure { name: String },
    /// Delete the collection and all of its records.
    Delete { name: String },
}

#[derive(Subcommand)]
enum FlowAction {
    /// Validate a flow file (JSON).
    Check { path: PathBuf },
}

/// Initializes the tracing subscriber on stderr.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("profile_sync={log_level},psync={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect(cfg: &config::Config) -> Result<ChromaClient> {
    ChromaClient::open(cfg.store.clone())
        .await
        .with_context(|| "Failed to connect to ChromaDB")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    // Commands that don't require config
    if let Commands::Flow {
        action: FlowAction::Check { path },
    } = &cli.command
    {
        return flow::run_flow_check(path);
    }

    let cfg = config::load_config_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Normalize { input, output } => {
            normalize::run_normalize(&cfg, input, output)?;
        }
        Commands::Sync {
            file,
            collection,
            dry_run,
            replace,
        } => {
            sync::run_sync(&cfg, file, collection, dry_run, replace).await?;
        }
        Commands::Sample {
            collection,
            limit,
            json,
        } => {
            retrieve::run_sample(&cfg, collection, limit.get(), json).await?;
        }
        Commands::Find {
            collection,
            clauses,
            limit,
            json,
        } => {
            retrieve::run_find(&cfg, collection, &clauses, limit.map(NonZeroUsize::get), json).await?;
        }
        Commands::Collections { action } => {
            let client = connect(&cfg).await?;
            match action {
                CollectionAction::Ensure { name } => {
                    let collection = client.get_or_create_collection(&name).await?;
                    println!("collection '{}' ready (id {})", collection.name, collection.id);
                }
                CollectionAction::Delete { name } => {
                    if client.delete_collection(&name).await? {
                        println!("collection '{}' deleted", name);
                    } else {
                        println!("collection '{}' does not exist", name);
                    }
                }
            }
        }
        Commands::Ping => {
            connect(&cfg).await?;
            println!("connected to {}", cfg.store.base_url());
        }
        Commands::Flow { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
