use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};

/// Thin wrapper around a multiplexed Redis connection. Cloning is
/// cheap; the underlying manager reconnects on its own.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    url: String,
}

impl RedisClient {
    pub async fn from_url(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            url: url.to_string(),
        })
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Pub/sub needs a dedicated connection; the multiplexed manager
    /// cannot enter subscriber mode.
    pub async fn pubsub(&self) -> RedisResult<redis::aio::PubSub> {
        let client = Client::open(self.url.as_str())?;
        client.get_async_pubsub().await
    }
}
