//! Tourline conversations server

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tourline_api::{
    notifications::{broker_backoff, MemoryQueue, NotificationQueue, RedisQueue, RelayConsumer},
    routes::create_router,
    AppState, Config, Stores,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tourline_api=debug,tower_http=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(config.log_json)?;

    let (stores, pool) = match &config.database_url {
        Some(url) => {
            let pool = tourline_shared::create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            tourline_shared::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Using Postgres stores");
            (Stores::postgres(pool.clone()), Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            (Stores::memory(), None)
        }
    };

    let queue: Arc<dyn NotificationQueue> = match &config.redis_url {
        Some(url) => Arc::new(RedisQueue::new(url).context("Invalid REDIS_URL")?),
        None => {
            tracing::warn!("REDIS_URL not set, using in-process notification queue");
            Arc::new(MemoryQueue::new())
        }
    };

    let state = AppState::new(config.clone(), stores, queue.clone(), pool);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = RelayConsumer::new(
        queue,
        Arc::new(state.gateway.clone()),
        config.notification_channel.clone(),
        broker_backoff(
            Duration::from_millis(config.broker_backoff_base_ms),
            Duration::from_millis(config.broker_backoff_max_ms),
        ),
    );
    let relay_task = tokio::spawn(relay.run(shutdown_rx));

    let gateway = state.gateway.clone();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    tracing::info!(address = %config.bind_address, "Tourline conversations listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");
    gateway.close();
    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_task.await {
        tracing::error!(error = %e, "Notification relay task failed");
    }
    Ok(())
}
