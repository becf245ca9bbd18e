// src/main.rs
use anyhow::Result;
use rust_api_gateway::{
    circuit_breaker::CircuitBreakerRecord,
    config::{self, Config},
    metrics::MetricsRegistry,
    proxy::Proxy,
    rate_limit::RateLimitWindow,
    server::{AdminHandler, RequestHandler, ServerBuilder},
    store::{MemoryRouteStore, MemoryStore},
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_api_gateway=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config: Config = config::load_config(&config_path).await?;
    info!("Loaded {} route(s)", config.routes.len());

    // Initialize metrics
    let registry = Arc::new(MetricsRegistry::new()?);

    // State stores, swept in the background
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let breaker_store: Arc<MemoryStore<CircuitBreakerRecord>> = Arc::new(MemoryStore::new());
    let rate_limit_store: Arc<MemoryStore<RateLimitWindow>> = Arc::new(MemoryStore::new());
    let sweep_every = config.stores.sweep_interval();
    let sweepers = vec![
        breaker_store.clone().spawn_sweeper(sweep_every, shutdown_rx.clone()),
        rate_limit_store.clone().spawn_sweeper(sweep_every, shutdown_rx.clone()),
    ];

    let routes = Arc::new(MemoryRouteStore::new(config.routes.clone()));

    let proxy = Arc::new(
        Proxy::builder(config.clone())
            .with_route_store(routes.clone())
            .with_circuit_breaker_store(breaker_store)
            .with_rate_limit_store(rate_limit_store)
            .with_metrics(registry.collector())
            .build()?,
    );

    // Optional active health probing ahead of traffic
    let health_task = config.health_check.active.then(|| {
        let health = proxy.health().clone();
        tokio::spawn(health.start(routes))
    });

    // Admin listener (metrics + operator endpoints)
    if config.admin.enabled {
        let admin = AdminHandler::new(proxy.clone(), registry.clone(), &config.admin.metrics_path);
        let addr = config.admin.listen;
        let mut admin_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let stopped = async move {
                let _ = admin_shutdown.changed().await;
            };
            if let Err(e) = ServerBuilder::new(addr)
                .with_name("Admin")
                .with_handler(admin)
                .serve_with_shutdown(stopped)
                .await
            {
                error!("Admin server error: {:#}", e);
            }
        });
    }

    // Main gateway listener
    info!("Starting API gateway on {}", config.server.listen);
    let served = ServerBuilder::new(config.server.listen)
        .with_name("Gateway")
        .with_handler(RequestHandler::new(proxy.clone()))
        .serve_with_shutdown(shutdown_signal())
        .await;

    // Stop background work
    let _ = shutdown_tx.send(true);
    proxy.health().shutdown();
    for sweeper in sweepers {
        let _ = sweeper.await;
    }
    if let Some(task) = health_task {
        let _ = task.await;
    }

    info!("API gateway stopped");
    served
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
