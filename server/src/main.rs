use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::{build_app, AppState};
use sitesearch_core::config::load_config;
use sitesearch_core::{PageIndexer, SearchEngine, Store};
use sitesearch_crawler::IndexingService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Path to the TOML configuration
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,
    /// Host to bind, overrides server.bind
    #[arg(long)]
    host: Option<String>,
    /// Port to bind, overrides server.bind
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = Arc::new(load_config(&args.config)?);
    let lemmatizer = config.morphology.build_lemmatizer()?;
    let store = Store::open(&config.storage.path)?;
    if store.was_recovered() {
        tracing::info!(path = %config.storage.path.display(), "opened existing index");
    }

    let indexing = IndexingService::new(config.clone(), PageIndexer::new(store.clone(), lemmatizer.clone()))?;
    let search = SearchEngine::new(store.clone(), lemmatizer, config.search.clone());
    let state = AppState { indexing: Arc::new(indexing), search: Arc::new(search), store };
    let app: Router = build_app(state);

    let mut addr: SocketAddr = config.server.bind.parse()?;
    if let Some(host) = args.host {
        addr.set_ip(host.parse()?);
    }
    if let Some(port) = args.port {
        addr.set_port(port);
    }
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
