use anyhow::Result;
use clap::{Parser, Subcommand};
use sitesearch_core::config::load_config;
use sitesearch_core::{stats, PageIndexer, SearchEngine, Store};
use sitesearch_crawler::IndexingService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "crawler")]
#[command(about = "Crawl configured sites into a lemma index and query it", long_about = None)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl and index every configured site
    Crawl,
    /// Re-index a single page of a configured site
    Page {
        #[arg(long)]
        url: String,
    },
    /// Run a search against the index
    Search {
        #[arg(long)]
        query: String,
        /// Restrict results to this site URL
        #[arg(long)]
        site: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print per-site statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli.config)?);
    let lemmatizer = config.morphology.build_lemmatizer()?;
    let store = Store::open(&config.storage.path)?;

    match cli.command {
        Commands::Crawl => {
            let service = IndexingService::new(config.clone(), PageIndexer::new(store.clone(), lemmatizer))?;
            let sites = service.start_indexing().await?;
            for site in sites {
                eprintln!("{}: {} {}", site.url, site.status, site.last_error.unwrap_or_default());
            }
        }
        Commands::Page { url } => {
            let service = IndexingService::new(config.clone(), PageIndexer::new(store.clone(), lemmatizer))?;
            service.index_page(&url).await?;
            eprintln!("indexed {url}");
        }
        Commands::Search { query, site, offset, limit } => {
            let engine = SearchEngine::new(store.clone(), lemmatizer, config.search.clone());
            let limit = limit.unwrap_or(engine.default_limit());
            let resp = engine.search(&query, site.as_deref(), offset, limit)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Stats => {
            let statistics = stats::collect(&store, false)?;
            println!("{}", serde_json::to_string_pretty(&statistics)?);
        }
    }
    store.flush()?;
    Ok(())
}
