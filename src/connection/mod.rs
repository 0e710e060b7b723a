//! Lazily-initialized, reusable connections to the flag store and the job
//! queue backend.
//!
//! A [`ConnectionManager`] is built once at startup and handed to whoever
//! needs it. The first call to [`ConnectionManager::acquire`] opens the shared
//! connection; later calls reuse it until [`ConnectionManager::close`] is
//! called. Workers that run long blocking operations take their own handle via
//! [`ConnectionManager::acquire_dedicated`].

mod postgres;
mod queue;

pub use postgres::PgConnector;
pub use queue::QueueConnector;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;

/// Knows how to open and tear down one kind of connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Clone + Send + Sync + 'static;

    /// Name used in logs and errors, e.g. `"flag store"`.
    fn resource(&self) -> &'static str;

    async fn connect(&self) -> Result<Self::Connection, ConnectionError>;

    async fn disconnect(&self, connection: Self::Connection) {
        drop(connection);
    }
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    shared: RwLock<Option<C::Connection>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            shared: RwLock::new(None),
        }
    }

    /// Returns the shared connection, creating it on first use.
    ///
    /// Concurrent first callers serialize on the write lock; whoever gets it
    /// first connects and the rest observe and reuse that connection. A failed
    /// attempt leaves the slot empty so the next caller tries again.
    pub async fn acquire(&self) -> Result<C::Connection, ConnectionError> {
        if let Some(connection) = self.shared.read().await.as_ref() {
            return Ok(connection.clone());
        }

        let mut slot = self.shared.write().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        let resource = self.connector.resource();
        let connection = self.connector.connect().await.map_err(|error| {
            warn!(resource, %error, "failed to open shared connection");
            error
        })?;
        info!(resource, "shared connection established");

        *slot = Some(connection.clone());
        Ok(connection)
    }

    /// Opens a new connection that is never handed to anyone else.
    pub async fn acquire_dedicated(&self) -> Result<C::Connection, ConnectionError> {
        let resource = self.connector.resource();
        let connection = self.connector.connect().await.map_err(|error| {
            warn!(resource, %error, "failed to open dedicated connection");
            error
        })?;
        debug!(resource, "dedicated connection established");
        Ok(connection)
    }

    /// Closes the shared connection. Calling this when nothing is open is a
    /// no-op.
    pub async fn close(&self) {
        let connection = self.shared.write().await.take();
        if let Some(connection) = connection {
            self.connector.disconnect(connection).await;
            info!(resource = self.connector.resource(), "shared connection closed");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.read().await.is_some()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}
