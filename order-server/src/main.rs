use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use order_server::api;
use order_server::cache::OrderCache;
use order_server::config::Config;
use order_server::db::{OrderStore, PgOrderStore};
use order_server::ingest::IngestConsumer;
use order_server::state::AppState;
use order_server::telemetry::Metrics;
use shared::validation::Validator;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How long open connections get to drain after the shutdown signal.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::load()?;
    tracing::info!(service = %config.telemetry.service_name, "starting order-server");

    let metrics = Arc::new(Metrics::new()?);
    let validator = Validator::new()?;
    let cache = OrderCache::new(config.cache.max_items, config.cache.ttl);
    let shutdown = CancellationToken::new();

    let mut pool: Option<PgPool> = None;
    let mut store: Option<Arc<dyn OrderStore>> = None;
    if config.database.dsn.is_empty() {
        tracing::warn!("no database DSN configured, running without a store");
    } else {
        match PgPool::connect(&config.database.dsn).await {
            Ok(p) => {
                sqlx::migrate!("./migrations").run(&p).await?;
                store = Some(Arc::new(PgOrderStore::new(p.clone())));
                pool = Some(p);
                tracing::info!("connected to PostgreSQL");
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot connect to database, running without a store");
            }
        }
    }

    // Warm the cache so reads are hot from the first request.
    if let Some(store) = &store {
        match store.get_all_orders().await {
            Ok(orders) => {
                let total = orders.len();
                for order in orders {
                    cache.save(Arc::new(order)).await;
                }
                tracing::info!(total, "loaded orders into cache");
            }
            Err(err) => {
                tracing::warn!(error = %err, "cache warmup failed");
            }
        }
    }

    cache.start_janitor(shutdown.clone(), config.cache.cleanup_interval);

    let consumer_handle = match &store {
        Some(store) => {
            let consumer = IngestConsumer::new(
                &config.kafka,
                validator,
                store.clone(),
                Arc::new(cache.clone()),
                metrics.clone(),
                shutdown.clone(),
            )?;
            Some(tokio::spawn(consumer.run()))
        }
        None => None,
    };

    let state = AppState::new(Arc::new(cache.clone()), store.clone(), metrics.clone());
    let app = api::router(state, &config);

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("received shutdown signal");
            shutdown.cancel();
        });
    }

    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .into_future();
    let drain_deadline = {
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_DEADLINE).await;
        }
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => {
            tracing::warn!("graceful shutdown deadline exceeded, dropping open connections");
        }
    }

    // Shutdown order: consumer first, the pool it writes through last.
    if let Some(handle) = consumer_handle {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "consumer task failed");
        }
    }
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("database connections closed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
