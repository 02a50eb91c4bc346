use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackmyseries::{
    api::{create_router, AppState},
    config::Config,
    db::{create_redis_client, Cache},
    services::{CatalogProvider, ProgressStore, TvdbCatalog},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackmyseries=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store = ProgressStore::connect(&config.database_url).await?;
    tracing::info!(database_url = %config.database_url, "Progress store ready");

    let mut catalog = TvdbCatalog::new(config.tvdb_api_key.clone(), config.tvdb_api_url.clone());
    let mut cache_handle = None;
    if let Some(redis_url) = &config.redis_url {
        let client = create_redis_client(redis_url)?;
        let (cache, handle) = Cache::connect(client).await?;
        catalog = catalog.with_cache(cache, config.roster_cache_ttl);
        cache_handle = Some(handle);
        tracing::info!("Roster cache enabled");
    }
    if config.tvdb_api_key.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("TVDB_API_KEY not set, series totals cannot be resolved");
    }

    let catalog: Arc<dyn CatalogProvider> = Arc::new(catalog);
    tracing::info!(provider = catalog.name(), "Catalog provider configured");

    let state = AppState::new(store, catalog);

    if config.startup_backfill {
        let backfill = state.backfill.clone();
        tokio::spawn(async move {
            backfill.run_startup().await;
        });
    }

    let backfill = state.backfill.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Waiting for pending backfills");
    backfill.wait_idle().await;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
