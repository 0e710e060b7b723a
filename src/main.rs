use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flag_engine::connection::{ConnectionManager, PgConnector, QueueConnector};
use flag_engine::queue::{InvalidationQueue, RedisInvalidationBus};
use flag_engine::state::AppState;
use flag_engine::{routes, Config, FlagCache, FlagEngine, PgFlagStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let database = Arc::new(ConnectionManager::new(PgConnector::new(
        config.database_url.clone(),
        config.database_max_connections,
        config.connect_timeout(),
    )));
    let store = Arc::new(PgFlagStore::new(database.clone()));
    if config.run_migrations {
        store.migrate().await?;
    }

    let cache = Arc::new(FlagCache::new(config.cache_capacity, config.cache_ttl()));
    let engine = Arc::new(FlagEngine::new(store.clone(), cache.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut queue_connections = None;
    let mut listener_handle = None;
    let invalidations = match &config.redis_url {
        Some(url) => {
            let connections = Arc::new(ConnectionManager::new(QueueConnector::new(
                url,
                config.connect_timeout(),
            )?));
            let queue = InvalidationQueue::new(RedisInvalidationBus::new(
                connections.clone(),
                config.invalidation_channel.clone(),
            ));
            let listener = queue.clone().listen(cache.clone(), shutdown_rx);
            listener_handle = Some(tokio::spawn(listener));
            queue_connections = Some(connections);
            Some(queue)
        }
        None => {
            warn!("REDIS_URL not set, flag changes propagate on cache expiry only");
            None
        }
    };

    let state = AppState {
        engine,
        store,
        invalidations,
    };
    let app = routes::routes().with_state(state);

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!("flag service listening on http://{}", config.addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = listener_handle {
        let _ = handle.await;
    }
    if let Some(connections) = queue_connections {
        connections.close().await;
    }
    database.close().await;

    info!("flag service stopped");
    Ok(())
}
