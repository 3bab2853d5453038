//! PlanSage CLI — one-shot questions against the plan document store,
//! plus document ingestion.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plansage_core::{
    AssistantConfig, ChatPipeline, DataApiStore, Document, DocumentStore, Embedder, IngestItem,
    IngestKind, OpenAiCompatFactory, RemoteEmbedder, ResponseManager,
};

/// PlanSage: retrieval-grounded insurance plan assistant
#[derive(Parser, Debug)]
#[command(name = "plansage", version, about, long_about = None)]
struct Cli {
    /// Question to ask (required unless a subcommand is given)
    query: Option<String>,

    /// Print the retrieved context block before the answer
    #[arg(long)]
    show_context: bool,

    /// Workspace directory searched for .plansage/config.toml
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Override the retrieval depth
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Load documents into the vector store
    Ingest {
        /// Files to ingest: JSON document arrays for `document`, plain
        /// text files for `text`
        paths: Vec<PathBuf>,

        /// How to interpret the files: document or text
        #[arg(long, default_value = "document")]
        kind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from("."));

    let mut config = plansage_core::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
    if let Some(top_k) = cli.top_k {
        config.retrieval.top_k = top_k;
    }

    let embedder: Arc<dyn Embedder> = Arc::new(RemoteEmbedder::new(&config.embedding)?);
    let store = Arc::new(DataApiStore::new(&config.store, embedder)?);

    match cli.command {
        Some(Commands::Ingest { paths, kind }) => ingest(store, paths, &kind).await,
        None => {
            let query = cli.query.ok_or_else(|| {
                anyhow::anyhow!("No question given. Run `plansage \"<question>\"` or see --help.")
            })?;
            ask(store, &config, &query, cli.show_context).await
        }
    }
}

/// Run one retrieve → reason pass and print the answer.
async fn ask(
    store: Arc<DataApiStore>,
    config: &AssistantConfig,
    query: &str,
    show_context: bool,
) -> anyhow::Result<()> {
    let factory = Arc::new(OpenAiCompatFactory::new(config.llm.clone()));
    let manager = ResponseManager::with_retry(
        config.llm.candidates.clone(),
        factory,
        config.llm.retry.clone(),
    );
    let pipeline = ChatPipeline::new(store, manager, &config.retrieval)?;

    let state = pipeline.run(query).await;

    if show_context {
        println!("--- context ---");
        println!("{}", state.context);
        println!("--- answer ---");
    }
    println!("{}", state.answer.unwrap_or_default());
    Ok(())
}

/// Read the given files and insert them into the store.
async fn ingest(store: Arc<DataApiStore>, paths: Vec<PathBuf>, kind: &str) -> anyhow::Result<()> {
    // Kind validation happens before anything touches the store.
    let kind: IngestKind = kind.parse::<IngestKind>()?;

    if paths.is_empty() {
        anyhow::bail!("No files given. Run `plansage ingest <file>...`.");
    }

    let mut items: Vec<IngestItem> = Vec::new();
    for path in &paths {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        match kind {
            IngestKind::Document => {
                let documents: Vec<Document> = serde_json::from_str(&raw).map_err(|e| {
                    anyhow::anyhow!("{} is not a JSON document array: {e}", path.display())
                })?;
                items.extend(documents.into_iter().map(IngestItem::from));
            }
            IngestKind::Text => items.push(IngestItem::from(raw)),
        }
    }

    info!(files = paths.len(), items = items.len(), %kind, "Ingesting");
    let count = store.ingest(items, kind).await?;
    println!("Ingested {count} document(s).");
    Ok(())
}
