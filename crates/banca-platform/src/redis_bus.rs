use anyhow::Result;
use async_trait::async_trait;
use banca_core::{MovementEvent, NotificationEmitter};
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tracing::debug;

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

/// Publishes movement events as JSON on one channel.
#[derive(Clone)]
pub struct RedisNotifier {
    bus: RedisBus,
    channel: String,
}

impl RedisNotifier {
    pub fn new(bus: RedisBus, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl NotificationEmitter for RedisNotifier {
    async fn publish(&self, event: MovementEvent) -> Result<()> {
        self.bus.publish_json(&self.channel, &event).await?;
        debug!(movement = %event.movement_guid, channel = %self.channel, "movement event published");
        Ok(())
    }
}
