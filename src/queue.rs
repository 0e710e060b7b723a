//! Push-style cache invalidation fanned out over Redis pub/sub.
//!
//! Admin tooling that edits a flag publishes its key on a channel. Every
//! instance runs one listener subscribed on its own connection, so each
//! instance drops the key from its local cache. Missing a message only costs
//! freshness: the entry still expires on its TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::FlagCache;
use crate::connection::{ConnectionManager, QueueConnector};
use crate::error::ConnectionError;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Flag keys as they arrive on a subscription. The stream ending means the
/// subscription was lost.
pub type InvalidationStream = BoxStream<'static, String>;

/// Broadcast channel for changed flag keys. Every subscriber sees every
/// published key.
#[async_trait]
pub trait InvalidationBus: Send + Sync + 'static {
    /// Name used in logs.
    fn channel(&self) -> &str;

    async fn publish(&self, flag_key: &str) -> Result<(), ConnectionError>;

    async fn subscribe(&self) -> Result<InvalidationStream, ConnectionError>;
}

pub struct RedisInvalidationBus {
    connections: Arc<ConnectionManager<QueueConnector>>,
    channel: String,
}

impl RedisInvalidationBus {
    pub fn new(
        connections: Arc<ConnectionManager<QueueConnector>>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            connections,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl InvalidationBus for RedisInvalidationBus {
    fn channel(&self) -> &str {
        &self.channel
    }

    /// PUBLISH on the shared connection.
    async fn publish(&self, flag_key: &str) -> Result<(), ConnectionError> {
        let mut connection = self.connections.acquire().await?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(flag_key)
            .query_async(&mut connection)
            .await?;
        debug!(flag_key, channel = %self.channel, receivers, "published flag invalidation");
        Ok(())
    }

    /// SUBSCRIBE on a connection of its own.
    async fn subscribe(&self) -> Result<InvalidationStream, ConnectionError> {
        let pubsub = self.connections.connector().subscribe(&self.channel).await?;
        let channel = self.channel.clone();
        let keys = pubsub.into_on_message().filter_map(move |message| {
            let key = match message.get_payload::<String>() {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "ignoring unreadable invalidation");
                    None
                }
            };
            futures::future::ready(key)
        });
        Ok(keys.boxed())
    }
}

#[derive(Clone)]
pub struct InvalidationQueue {
    bus: Arc<dyn InvalidationBus>,
}

impl InvalidationQueue {
    pub fn new(bus: impl InvalidationBus) -> Self {
        Self { bus: Arc::new(bus) }
    }

    /// Announces that `flag_key` changed to every listening instance.
    pub async fn publish(&self, flag_key: &str) -> Result<(), ConnectionError> {
        self.bus.publish(flag_key).await
    }

    /// Applies invalidations to `cache` until `shutdown` flips to true.
    ///
    /// A failed or dropped subscription is logged and re-established after a
    /// delay. Keys published while resubscribing are missed.
    pub async fn listen(self, cache: Arc<FlagCache>, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.bus.channel(), "flag invalidation listener started");

        'listen: while !*shutdown.borrow() {
            let mut keys = match self.bus.subscribe().await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(error = %e, "invalidation listener could not subscribe");
                    if wait_or_shutdown(&mut shutdown, RECONNECT_DELAY).await {
                        break;
                    }
                    continue;
                }
            };
            debug!(channel = %self.bus.channel(), "invalidation listener subscribed");

            loop {
                let mut sender_gone = false;
                let next = tokio::select! {
                    key = keys.next() => Some(key),
                    changed = shutdown.changed() => {
                        sender_gone = changed.is_err();
                        None
                    }
                };

                match next {
                    Some(Some(flag_key)) => {
                        cache.invalidate(&flag_key);
                        debug!(flag_key = %flag_key, "flag cache entry invalidated");
                    }
                    Some(None) => {
                        warn!("invalidation subscription ended");
                        break;
                    }
                    None if sender_gone || *shutdown.borrow() => break 'listen,
                    None => {}
                }
            }

            if wait_or_shutdown(&mut shutdown, RECONNECT_DELAY).await {
                break;
            }
        }

        info!("flag invalidation listener stopped");
    }
}

// True when shutdown was requested (or its sender dropped) while waiting.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    let sender_gone = tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err(),
    };
    sender_gone || *shutdown.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedFlag;
    use crate::store::FlagDefinition;
    use tokio::sync::broadcast;

    /// In-process bus with the same fan-out semantics as Redis pub/sub.
    #[derive(Clone)]
    struct LocalBus {
        sender: broadcast::Sender<String>,
    }

    impl LocalBus {
        fn new() -> Self {
            let (sender, _) = broadcast::channel(16);
            Self { sender }
        }
    }

    #[async_trait]
    impl InvalidationBus for LocalBus {
        fn channel(&self) -> &str {
            "flags:test"
        }

        async fn publish(&self, flag_key: &str) -> Result<(), ConnectionError> {
            // No subscribers is not an error, same as PUBLISH returning 0.
            let _ = self.sender.send(flag_key.to_string());
            Ok(())
        }

        async fn subscribe(&self) -> Result<InvalidationStream, ConnectionError> {
            let receiver = self.sender.subscribe();
            let keys = futures::stream::unfold(receiver, |mut receiver| async move {
                loop {
                    match receiver.recv().await {
                        Ok(key) => return Some((key, receiver)),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            });
            Ok(keys.boxed())
        }
    }

    fn cache_with(keys: &[&str]) -> Arc<FlagCache> {
        let cache = FlagCache::new(100, Duration::from_secs(60));
        for key in keys {
            let flag = FlagDefinition::new(*key).enabled(true);
            cache.insert(key, CachedFlag::Present(Arc::new(flag)));
        }
        Arc::new(cache)
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_early_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let waiter =
            tokio::spawn(async move { wait_or_shutdown(&mut rx, Duration::from_secs(30)).await });

        tx.send(true).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!wait_or_shutdown(&mut rx, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_every_instance_drops_a_published_key() {
        let bus = LocalBus::new();
        let queue = InvalidationQueue::new(bus.clone());
        let (tx, rx) = watch::channel(false);

        let caches = [cache_with(&["checkout", "search"]), cache_with(&["checkout", "search"])];
        let listeners: Vec<_> = caches
            .iter()
            .map(|cache| tokio::spawn(queue.clone().listen(cache.clone(), rx.clone())))
            .collect();
        wait_until(|| bus.sender.receiver_count() == 2).await;

        queue.publish("checkout").await.unwrap();
        wait_until(|| caches.iter().all(|cache| cache.get("checkout").is_none())).await;
        for cache in &caches {
            assert!(cache.get("search").is_some());
        }

        tx.send(true).unwrap();
        for listener in listeners {
            tokio::time::timeout(Duration::from_secs(1), listener)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_listener_stops_while_subscribed() {
        let queue = InvalidationQueue::new(LocalBus::new());
        let (tx, rx) = watch::channel(false);
        let listener = tokio::spawn(queue.listen(cache_with(&[]), rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_listener_exits_when_already_shut_down() {
        let connector =
            QueueConnector::new("redis://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        let connections = Arc::new(ConnectionManager::new(connector));
        let bus = RedisInvalidationBus::new(connections, "flags:test");
        let (_tx, rx) = watch::channel(true);

        tokio::time::timeout(
            Duration::from_secs(1),
            InvalidationQueue::new(bus).listen(Arc::new(FlagCache::disabled()), rx),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_redis_does_not_block_shutdown() {
        let connector =
            QueueConnector::new("redis://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        let connections = Arc::new(ConnectionManager::new(connector));
        let bus = RedisInvalidationBus::new(connections, "flags:test");
        let (tx, rx) = watch::channel(false);
        let listener =
            tokio::spawn(InvalidationQueue::new(bus).listen(Arc::new(FlagCache::disabled()), rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(3), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
