use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragsearch::config::Config;
use ragsearch::embedder::{Embedder, load_embedder};
use ragsearch::store::{Collection, DiskLoader, StoreLoader, VectorStore, search_documents};
use ragsearch::web::{AppState, WebServer};

/// Semantic search over the HTML/CSS and PM-JAY document collections
#[derive(Parser, Debug)]
#[command(name = "ragsearch", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the vector stores and serve the search UI
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,

        /// Rebuild both vector stores from their sources on startup
        #[arg(long)]
        rebuild: bool,

        /// Do not load the PM-JAY store
        #[arg(long)]
        no_pmjay: bool,
    },

    /// Build (or load) vector stores and report their size
    Index {
        #[arg(long, value_enum, default_value_t = IndexTarget::All)]
        collection: IndexTarget,

        /// Discard the existing index first
        #[arg(long)]
        rebuild: bool,
    },

    /// Run one query from the command line
    Search {
        #[arg(long, value_enum, default_value_t = Collection::Text)]
        mode: Collection,

        /// Number of results (1-10)
        #[arg(short, default_value_t = 5)]
        k: usize,

        query: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IndexTarget {
    Text,
    Pmjay,
    All,
}

impl IndexTarget {
    fn collections(self) -> &'static [Collection] {
        match self {
            Self::Text => &[Collection::Text],
            Self::Pmjay => &[Collection::Pmjay],
            Self::All => &Collection::ALL,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;
    let config = Arc::new(config);

    let embedder = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || load_embedder(&config))
            .await
            .context("embedder loader panicked")??
    };

    match cli.command {
        Command::Serve {
            bind,
            rebuild,
            no_pmjay,
        } => serve(config, embedder, bind, rebuild, !no_pmjay).await,
        Command::Index {
            collection,
            rebuild,
        } => index(config, embedder, collection, rebuild).await,
        Command::Search { mode, k, query } => search(config, embedder, mode, k, &query).await,
    }
}

async fn serve(
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    bind: Option<String>,
    rebuild: bool,
    load_pmjay: bool,
) -> Result<()> {
    info!("Starting ragsearch UI...");
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let loader = Arc::new(DiskLoader::new(config.clone(), embedder));

    let load_pmjay = load_pmjay && config.load_pmjay_on_startup;
    let (state, _pending) = AppState::startup(config, loader, rebuild, load_pmjay).await?;

    WebServer::new(state).start(&bind).await
}

async fn load(
    config: &Arc<Config>,
    embedder: &Arc<dyn Embedder>,
    collection: Collection,
    rebuild: bool,
) -> Result<VectorStore> {
    let loader = DiskLoader::new(config.clone(), embedder.clone());
    tokio::task::spawn_blocking(move || loader.load(collection, rebuild))
        .await
        .context("store loader panicked")?
}

async fn index(
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    target: IndexTarget,
    rebuild: bool,
) -> Result<()> {
    for &collection in target.collections() {
        let store = load(&config, &embedder, collection, rebuild).await?;
        println!(
            "{}: {} documents, {} chunks",
            store.name(),
            store.document_count().await?,
            store.chunk_count().await?
        );
    }
    Ok(())
}

async fn search(
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    mode: Collection,
    k: usize,
    query: &str,
) -> Result<()> {
    let store = load(&config, &embedder, mode, false).await?;
    let docs = search_documents(&store, query, config.clamp_top_k(k)).await?;

    println!("Results from: {}", store.name());
    if docs.is_empty() {
        println!("No relevant documents found.");
    }
    for (i, doc) in docs.iter().enumerate() {
        let page = doc
            .page()
            .map_or_else(|| "N/A".to_string(), ToString::to_string);
        println!("\n--- Result {} – Page {page} ---", i + 1);
        println!("{}", doc.page_content.trim());
        if let Some(image_id) = doc.image_id() {
            println!("[image: {}]", config.image_store_dir().join(image_id).display());
        }
    }
    Ok(())
}
