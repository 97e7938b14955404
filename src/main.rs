use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use gas_broker_engine::auth::{IdentityProvider, JwtIdentityProvider};
use gas_broker_engine::collaborators::{
    AddressDirectory, HttpAddressDirectory, HttpSupplierService, StaticAddressDirectory,
    StaticSupplierService, SupplierService,
};
use gas_broker_engine::config::AppConfig;
use gas_broker_engine::engine::Engine;
use gas_broker_engine::events::{EventPublisher, InMemoryEventBus, RedisEventBus};
use gas_broker_engine::inventory::spawn_reaper;
use gas_broker_engine::store::PgStore;
use gas_broker_engine::{create_router, db, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Gas broker engine - Starting...");

    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let redis = match &config.redis_url {
        Some(url) => Some(Arc::new(RedisEventBus::connect(url).await?)),
        None => None,
    };
    let events: Arc<dyn EventPublisher> = match &redis {
        Some(bus) => bus.clone(),
        None => {
            tracing::warn!("REDIS_URL not set; domain events stay in-process");
            Arc::new(InMemoryEventBus::new())
        }
    };

    let addresses: Arc<dyn AddressDirectory> = match &config.address_service_url {
        Some(url) => Arc::new(HttpAddressDirectory::new(url.as_str())?),
        None => {
            tracing::warn!("ADDRESS_SERVICE_URL not set; no delivery address will resolve");
            Arc::new(StaticAddressDirectory::new())
        }
    };
    let supplier_service: Arc<dyn SupplierService> = match &config.supplier_service_url {
        Some(url) => Arc::new(HttpSupplierService::new(url.as_str())?),
        None => {
            tracing::warn!("SUPPLIER_SERVICE_URL not set; pricing falls back to local rules and defaults");
            Arc::new(StaticSupplierService::new())
        }
    };

    let reaper_interval = config.engine.reaper_interval;
    let engine = Arc::new(Engine::new(
        config.engine.clone(),
        Arc::new(PgStore::new(pool)),
        events,
        addresses,
        supplier_service,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = spawn_reaper(engine.ledger.clone(), reaper_interval, shutdown_rx);

    let identity: Arc<dyn IdentityProvider> = Arc::new(JwtIdentityProvider::new(config.jwt_secret.clone()));
    let app = create_router(AppState { engine, identity });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Gas broker engine is running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        tracing::error!("Reaper task ended abnormally: {}", e);
    }
    if let Some(bus) = redis {
        bus.close().await;
    }

    Ok(())
}
