//! LinkForty — self-hosted deep-link routing and attribution engine.
//!
//! Main entry point that wires the Store, cache, Event Bus, Webhook
//! Dispatcher, Attribution Engine and Resolver together and starts the
//! HTTP server.

use clap::Parser;
use linkforty_api::{AppState, ApiServer};
use linkforty_attribution::AttributionEngine;
use linkforty_cache::LinkCache;
use linkforty_core::config::AppConfig;
use linkforty_events::EventBus;
use linkforty_resolver::{ClickRecorder, Resolver};
use linkforty_store::{PgStore, Store};
use linkforty_webhooks::Dispatcher;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "linkforty-server")]
#[command(about = "Self-hosted deep-link routing and attribution engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LINKFORTY__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "LINKFORTY__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Skip connecting to Redis (the cache connection is optional)
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkforty_server=info,linkforty_api=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("LinkForty starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        "configuration loaded"
    );

    // The Store is the source of truth and every operation depends on it,
    // so connecting is retried before giving up.
    let store: Arc<dyn Store> = Arc::new(
        connect_with_retry("Postgres", || PgStore::connect(&config.store)).await?,
    );

    // The cache connection is optional; its absence does not degrade
    // correctness, so a failed connection here is a warning, not fatal.
    let cache: Option<Arc<LinkCache>> = if cli.no_cache {
        info!("cache disabled via --no-cache");
        None
    } else {
        match LinkCache::new(&config.redis).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "redis unavailable at startup, running without a cache");
                None
            }
        }
    };

    let events = Arc::new(EventBus::new());
    let dispatcher = Arc::new(Dispatcher::new());
    let recorder = Arc::new(ClickRecorder::new(store.clone(), events.clone(), dispatcher.clone()));
    let resolver = Arc::new(Resolver::new(store.clone(), cache.clone(), recorder));
    let attribution = Arc::new(AttributionEngine::new(
        store.clone(),
        dispatcher.clone(),
        config.attribution.clone(),
    ));

    let state = AppState {
        store: store.clone(),
        resolver,
        attribution,
        events,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };

    let api_server = ApiServer::new(config.clone(), state);

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "failed to start metrics exporter");
    }

    if let Some(cache) = cache {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                cache.maintenance().await;
            }
        });
    }

    info!("LinkForty is ready to serve traffic");

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("received SIGINT, shutting down");
        }
    };

    api_server.start_http(shutdown).await?;

    info!("LinkForty shut down cleanly");
    Ok(())
}

/// Connect to an external service with exponential backoff (3 attempts).
async fn connect_with_retry<T, F, Fut>(service_name: &str, connect_fn: F) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let delays = [
        std::time::Duration::from_secs(0),
        std::time::Duration::from_secs(2),
        std::time::Duration::from_secs(4),
    ];
    let mut last_err = None;
    for (attempt, delay) in delays.iter().enumerate() {
        if attempt > 0 {
            warn!(service = service_name, attempt, "retrying connection after {}s", delay.as_secs());
            tokio::time::sleep(*delay).await;
        }
        match connect_fn().await {
            Ok(conn) => {
                info!(service = service_name, "connected successfully");
                return Ok(conn);
            }
            Err(e) => {
                error!(service = service_name, attempt, error = %e, "connection failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} connection failed", service_name)))
}
