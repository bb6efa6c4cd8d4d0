mod config;
mod error;
mod render;
mod server;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mealplan_common::api::{MealPlanApi, MealPlanClient};
use mealplan_common::recipe_cache::RecipeCache;
use mealplan_common::resolver::RecipeResolver;
use mealplan_common::store::{FileStore, KeyValueStore, MemoryStore, RedisStore};

use config::{CacheBackend, Config};
use server::MealPlanServer;

async fn open_store(backend: &CacheBackend) -> Result<Arc<dyn KeyValueStore>, error::AppError> {
    let store: Arc<dyn KeyValueStore> = match backend {
        CacheBackend::Memory => {
            info!("recipe cache in memory, entries are lost on exit");
            Arc::new(MemoryStore::new())
        }
        CacheBackend::File(path) => Arc::new(FileStore::open(path).await?),
        CacheBackend::Redis(url) => {
            let store = RedisStore::new(Some(url.as_str()));
            match store.ping().await {
                Ok(()) => info!("redis connected"),
                Err(e) => warn!(error = %e, "redis unavailable, recipes are fetched until it returns"),
            }
            Arc::new(store)
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for MCP JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting mealplan MCP server");

    let config = Config::from_env()?;
    info!(
        base_url = %config.api.base_url,
        timeout_ms = config.api.default_timeout.as_millis(),
        max_retries = config.api.max_retries,
        cache = ?config.cache,
        reset_policy = ?config.reset_policy,
        "configuration loaded"
    );

    let api: Arc<dyn MealPlanApi> = Arc::new(MealPlanClient::new(config.api.clone())?);
    let cache = Arc::new(RecipeCache::new(open_store(&config.cache).await?));
    let resolver = Arc::new(RecipeResolver::new(Arc::clone(&api), cache));

    let server = MealPlanServer::new(api, resolver, config.reset_policy);

    if let Some(addr) = config.tcp_listen_addr.as_deref() {
        let listener = TcpListener::bind(addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
