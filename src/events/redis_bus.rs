// Redis pub/sub publisher

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::events::{DomainEvent, EventPublisher};

/// Publishes domain events with `PUBLISH <routing key> <json>`
///
/// Built and closed by the process bootstrap; the engine only sees the
/// `EventPublisher` trait.
pub struct RedisEventBus {
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisEventBus {
    pub async fn connect(url: &str) -> EngineResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis event bus");
        Ok(Self {
            conn: RwLock::new(Some(conn)),
        })
    }

    /// Drops the connection; later publishes fail with `EventBus`
    pub async fn close(&self) {
        if self.conn.write().await.take().is_some() {
            info!("Redis event bus closed");
        }
    }

    async fn publish_raw(&self, channel: &str, payload: String) -> EngineResult<()> {
        let mut conn = self
            .conn
            .read()
            .await
            .clone()
            .ok_or_else(|| EngineError::EventBus("event bus is closed".to_string()))?;

        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!("Published to {} ({} receivers)", channel, receivers);
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(&self, event: &DomainEvent) -> EngineResult<()> {
        let payload = serde_json::to_string(event)?;
        self.publish_raw(event.routing_key(), payload).await
    }

    async fn broadcast(&self, channel: &str, payload: &JsonValue) -> EngineResult<()> {
        self.publish_raw(channel, payload.to_string()).await
    }
}
