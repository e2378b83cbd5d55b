//! # ragserve CLI
//!
//! Operational entry point for the ragserve RAG engine.
//!
//! ## Commands
//!
//! - `ragserve ingest <FILES>...` - Extract, chunk, embed, and index files
//! - `ragserve query <QUESTION>` - Ask a question over the indexed corpus
//! - `ragserve status` - Provider health and document count
//! - `ragserve configs` - List configuration snapshots
//!
//! ## Examples
//!
//! ```bash
//! # Index a couple of documents
//! OPENAI_API_KEY=sk-... ragserve ingest report.pdf notes.md
//!
//! # Ask a question, streaming the answer
//! ragserve query "what does the report conclude?" --stream
//! ```
//!
//! The first run bootstraps a default configuration (OpenAI models plus a
//! local file-backed index) when `OPENAI_API_KEY` is set.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use ragserve_config::{
    ConfigCoordinator, ConfigStore, DefaultProviderFactory, ProviderFactory,
};
use ragserve_core::{Document, DocumentRegistry, ProcessOptions};
use ragserve_extract::{DocumentExtractor, TesseractOcr};
use ragserve_ingest::{BatchProcessor, DocumentProcessor, MemoryRegistry};
use ragserve_query::QueryFrame;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ragserve")]
#[command(about = "A RAG ingestion-and-retrieval engine")]
#[command(version)]
struct Cli {
    /// Data directory for configuration and the local index
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files into the index
    Ingest {
        /// Files to ingest
        files: Vec<PathBuf>,

        /// Chunk size in chars
        #[arg(long, default_value = "1000")]
        chunk_size: usize,

        /// Chunk overlap in chars
        #[arg(long, default_value = "100")]
        chunk_overlap: usize,
    },

    /// Query the indexed corpus
    Query {
        /// The question
        question: String,

        /// Stream the answer token by token
        #[arg(long)]
        stream: bool,
    },

    /// Show provider health and document count
    Status,

    /// List configuration snapshots
    Configs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .init();

    let store = Arc::new(
        ConfigStore::open(cli.data_dir.join("configurations.json"))
            .await
            .context("opening configuration store")?,
    );
    let registry: Arc<dyn DocumentRegistry> = Arc::new(MemoryRegistry::new());
    let coordinator = ConfigCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::new(DefaultProviderFactory),
    );
    coordinator
        .bootstrap_default()
        .await
        .context("bootstrapping default configuration")?;

    match cli.command {
        Commands::Ingest {
            files,
            chunk_size,
            chunk_overlap,
        } => ingest(&coordinator, &registry, files, chunk_size, chunk_overlap).await,
        Commands::Query { question, stream } => query(&coordinator, &question, stream).await,
        Commands::Status => status(&coordinator).await,
        Commands::Configs => configs(&coordinator).await,
    }
}

async fn ingest(
    coordinator: &ConfigCoordinator,
    registry: &Arc<dyn DocumentRegistry>,
    files: Vec<PathBuf>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }

    let record = coordinator
        .active_record()
        .await
        .context("no active configuration; set OPENAI_API_KEY or create one")?;

    let factory = DefaultProviderFactory;
    let embedder = factory.build_embedding(&record.embedding)?;
    let index = factory.build_vector(&record.vector)?;
    index.initialize().await?;

    let extractor = Arc::new(DocumentExtractor::new().with_ocr(Arc::new(TesseractOcr::new())));
    let processor = Arc::new(DocumentProcessor::new(
        extractor,
        embedder,
        index,
        Arc::clone(registry),
    ));

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let metadata = tokio::fs::metadata(&file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("file has no name")?;
        let document = Document::new(filename, file.clone(), metadata.len());
        registry.create(document.clone()).await?;
        documents.push(document);
    }

    let options = ProcessOptions {
        chunk_size,
        chunk_overlap,
        extract_metadata: true,
    };
    let progress = |current: usize, total: usize, filename: &str| {
        println!("[{current}/{total}] {filename}");
    };

    let outcome = BatchProcessor::new(processor)
        .process_files_sequentially(&documents, &options, Some(&progress))
        .await;

    println!(
        "done: {} indexed, {} failed",
        outcome.processed, outcome.failed
    );
    Ok(())
}

async fn query(coordinator: &ConfigCoordinator, question: &str, stream: bool) -> Result<()> {
    let pipeline = coordinator.active_pipeline().await?;

    if stream {
        let mut frames = pipeline.query_stream(question, &[]).await;
        while let Some(frame) = frames.next().await {
            match frame? {
                QueryFrame::Sources(sources) => {
                    for hit in &sources {
                        eprintln!("source: {} (score {:.2})", hit.metadata.filename, hit.score);
                    }
                }
                QueryFrame::Content(delta) => {
                    print!("{delta}");
                    use std::io::Write;
                    std::io::stdout().flush().ok();
                }
                QueryFrame::Done(_) => println!(),
            }
        }
        return Ok(());
    }

    let answer = pipeline.query(question, &[]).await?;
    println!("{}", answer.content);
    if !answer.sources.is_empty() {
        println!();
        for hit in &answer.sources {
            println!("source: {} (score {:.2})", hit.metadata.filename, hit.score);
        }
    }
    Ok(())
}

async fn status(coordinator: &ConfigCoordinator) -> Result<()> {
    let status = coordinator.system_status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn configs(coordinator: &ConfigCoordinator) -> Result<()> {
    let records = coordinator.list().await;
    if records.is_empty() {
        println!("no configurations");
        return Ok(());
    }
    for record in records {
        let marker = if record.active { "*" } else { " " };
        println!("{marker} {} (owner {}, created {})", record.id, record.owner, record.created_at);
    }
    Ok(())
}
