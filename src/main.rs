use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use xbridge::transport::LocalTransport;
use xbridge::types::Asset;
use xbridge::{api, AppState, Config, Database, Exchange, OrderStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config.log_level)?;

    info!("Starting XBridge engine...");
    info!("Server: {}", config.server_address());
    info!("Archive: {}", config.database_url);
    info!("Snapshot: {}", config.snapshot_path);
    info!("Safety margin: {}s", config.safety_margin_secs);
    info!("Chains: {}", config.chains.len());

    // Initialize the archive database
    let db = Database::new(&config.database_url).await?;
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database ready");

    // Order book snapshot store
    let store = Arc::new(OrderStore::with_interval(
        &config.snapshot_path,
        Duration::from_secs(config.save_interval_secs),
    ));
    let restored = store.read()?;
    info!("Restored {} orders from snapshot", restored.len());

    // Coordinator
    let transport = Arc::new(LocalTransport::default());
    let exchange = Arc::new(
        Exchange::new(config.exchange_config(), store, transport).with_archive(db.clone()),
    );

    for chain in &config.chains {
        exchange
            .register_asset(Asset::new(&chain.symbol, chain.precision)?)
            .await;
        // connectors need a ChainRpc adapter from the embedding
        // application; until one is registered, orders in this currency
        // are admitted but will not match
        warn!(
            chain = %chain.symbol,
            "no wallet connector registered; orders in this currency will not match"
        );
    }

    exchange.restore(restored).await;

    let coordinator = exchange.clone();
    tokio::spawn(async move {
        if let Err(err) = coordinator.run().await {
            error!(error = %err, "coordinator stopped");
        }
    });
    info!("Coordinator started");

    // Create app state and router
    let state = AppState { exchange, db };
    let app = api::create_router(state, config.cors_origins.clone());

    // Start HTTP server
    let addr = config.server_address();
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}
