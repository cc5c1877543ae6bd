//! `vdb`: ingest text, documents and YouTube captions, then search them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vdb_retrieval::{Engine, VdbConfig};

#[derive(Parser)]
#[command(name = "vdb", version, about = "Embedding store with similarity search")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address, e.g. 127.0.0.1:8000
        #[arg(long)]
        bind: Option<String>,
    },

    /// Store text or a document under a key
    Ingest {
        /// Record key (defaults to the file stem for --file)
        #[arg(long)]
        key: Option<String>,

        /// Text to store
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Document to extract and store
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Fetch and store the captions of a YouTube video
    Captions {
        /// Video URL
        url: String,

        /// Preferred caption language, may be repeated
        #[arg(long = "lang")]
        languages: Vec<String>,
    },

    /// Search stored records
    Query {
        /// Search text
        text: String,

        /// Number of results
        #[arg(short)]
        k: Option<usize>,
    },

    /// Show a stored record
    Get {
        /// Record key
        key: String,
    },
}

#[derive(Serialize)]
struct Stored<'a> {
    key: &'a str,
    dimension: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = VdbConfig::discover(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;
    init_tracing(config.log_level.as_deref());

    let default_bind = config.server.bind.clone();

    let engine = Engine::from_config(config)
        .await
        .context("failed to start engine")?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or(default_bind);
            vdb_server::serve(Arc::new(engine), &bind)
                .await
                .with_context(|| format!("server on {bind} failed"))?;
        }
        Command::Ingest { key, text, file } => {
            let record = match (text, file) {
                (Some(text), _) => {
                    let Some(key) = key else {
                        bail!("--key is required with --text");
                    };
                    engine.ingest(&key, &text).await?
                }
                (None, Some(file)) => engine.ingest_file(&file, key.as_deref()).await?,
                (None, None) => bail!("one of --text or --file is required"),
            };
            print_json(&Stored {
                key: &record.key,
                dimension: record.vector.len(),
            })?;
        }
        Command::Captions { url, languages } => {
            let record = engine.ingest_video(&url, &languages).await?;
            print_json(&Stored {
                key: &record.key,
                dimension: record.vector.len(),
            })?;
        }
        Command::Query { text, k } => {
            let results = engine.query(&text, k).await?;
            print_json(&results)?;
        }
        Command::Get { key } => {
            let record = engine.get(&key).await?;
            print_json(&serde_json::json!({
                "key": record.key,
                "text": record.text,
                "dimension": record.vector.len(),
            }))?;
        }
    }

    Ok(())
}

/// Logs go to stderr so command output stays parseable.
fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
