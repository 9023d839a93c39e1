//! HTTP server entry point. Wires config, logging and the storage backend
//! selected at compile time, then serves the dispatcher router.

use std::sync::Arc;

use cyphergraph::Graph;

struct Config {
    database_url: String,
    listen_addr: String,
}

impl Config {
    fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url()),
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:7474".to_string()),
        }
    }
}

#[cfg(feature = "sqlite")]
fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
fn default_database_url() -> String {
    "postgres://localhost/cyphergraph".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    run(config).await
}

#[cfg(feature = "sqlite")]
async fn run(config: Config) -> anyhow::Result<()> {
    let store = cyphergraph::SqliteStore::connect(&config.database_url).await?;
    serve(store, &config.listen_addr).await
}

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
async fn run(config: Config) -> anyhow::Result<()> {
    let store = cyphergraph::PostgresStore::connect(&config.database_url).await?;
    serve(store, &config.listen_addr).await
}

async fn serve<S: cyphergraph::GraphStore>(store: S, listen_addr: &str) -> anyhow::Result<()> {
    let graph = Arc::new(Graph::new(store));
    graph.initialize().await?;
    tracing::info!(addr = listen_addr, "cyphergraph listening");

    let app = cyphergraph::dispatcher::router(graph);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
