use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::Client;

use super::Connector;
use crate::error::ConnectionError;

/// Opens Redis connections for the invalidation channel.
pub struct QueueConnector {
    client: Client,
    connect_timeout: Duration,
}

impl QueueConnector {
    /// Parses the connection string up front; no network traffic happens
    /// until the first connect.
    pub fn new(redis_url: &str, connect_timeout: Duration) -> Result<Self, ConnectionError> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            connect_timeout,
        })
    }

    /// Opens a fresh pub/sub connection already subscribed to `channel`.
    ///
    /// A subscribed connection cannot issue ordinary commands, so it is never
    /// the shared one.
    pub async fn subscribe(&self, channel: &str) -> Result<PubSub, ConnectionError> {
        let connecting = self.client.get_async_pubsub();
        let mut pubsub = match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(pubsub) => pubsub?,
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    resource: self.resource(),
                    seconds: self.connect_timeout.as_secs(),
                })
            }
        };
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }
}

#[async_trait]
impl Connector for QueueConnector {
    type Connection = MultiplexedConnection;

    fn resource(&self) -> &'static str {
        "invalidation channel"
    }

    async fn connect(&self) -> Result<MultiplexedConnection, ConnectionError> {
        let connecting = self.client.get_multiplexed_async_connection();
        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(connection) => Ok(connection?),
            Err(_) => Err(ConnectionError::Timeout {
                resource: self.resource(),
                seconds: self.connect_timeout.as_secs(),
            }),
        }
    }
}
