//! Pub/Sub Channel
//!
//! Publishing encodes through the value codec; subscribers receive the raw
//! wire form and decode it themselves (see [`CacheService::codec`]).
//! Channel names are used as given, without the key prefix.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CacheService;
use crate::error::{CacheError, Result};
use crate::store::StoreMessage;

// == Message Handler ==
/// Callback invoked once per delivered message.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, message: &StoreMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(&StoreMessage) + Send + Sync + 'static,
{
    fn on_message(&self, message: &StoreMessage) {
        self(message)
    }
}

/// Identifies a live subscription for [`CacheService::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl CacheService {
    // == Publish ==
    /// Publishes `message` on `channel`; returns how many subscribers got it.
    pub async fn publish<T>(&self, channel: &str, message: &T) -> Result<u64>
    where
        T: Serialize + ?Sized,
    {
        if channel.is_empty() {
            return Err(CacheError::InvalidKey("channel cannot be empty".to_string()));
        }
        let wire = self.inner.codec.encode(message)?;
        let delivered = self
            .call("publish", self.inner.store.publish(channel, wire))
            .await?;
        debug!(channel, delivered, "published message");
        Ok(delivered)
    }

    // == Subscribe ==
    /// Registers `handler` for every message on `channels`.
    ///
    /// Delivery runs on a background task until [`unsubscribe`] is called
    /// or the store closes the subscription. A panicking handler is logged
    /// and does not end delivery.
    ///
    /// [`unsubscribe`]: CacheService::unsubscribe
    pub async fn subscribe<H>(&self, handler: H, channels: &[&str]) -> Result<SubscriptionId>
    where
        H: MessageHandler,
    {
        if channels.is_empty() || channels.iter().any(|c| c.is_empty()) {
            return Err(CacheError::InvalidKey(
                "subscribe needs at least one non-empty channel".to_string(),
            ));
        }
        let channels: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        let mut receiver = self
            .call("subscribe", self.inner.store.subscribe(&channels))
            .await?;

        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let handler = Arc::new(handler);
        let task = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let outcome = catch_unwind(AssertUnwindSafe(|| handler.on_message(&message)));
                if outcome.is_err() {
                    warn!(channel = %message.channel, "message handler panicked");
                }
            }
            debug!(subscription = id, "subscription closed by store");
        });

        self.inner.subscriptions.lock().insert(id, task);
        info!(subscription = id, ?channels, "subscribed");
        Ok(SubscriptionId(id))
    }

    /// Stops delivery for `id`; false if it was not active.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.inner.subscriptions.lock().remove(&id.0) {
            Some(task) => {
                task.abort();
                info!(subscription = id.0, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Number of subscriptions still delivering messages.
    pub fn active_subscriptions(&self) -> usize {
        let mut subscriptions = self.inner.subscriptions.lock();
        subscriptions.retain(|_, task| !task.is_finished());
        subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde::Deserialize;
    use tokio::sync::mpsc;

    use crate::config::CacheConfig;
    use crate::store::MemoryStore;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Event {
        kind: String,
    }

    fn service() -> (Arc<MemoryStore>, CacheService) {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheService::new(store.clone(), CacheConfig::default()).unwrap();
        (store, cache)
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let (_, cache) = service();
        assert_eq!(cache.publish("events", "hello").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_wire_form() {
        let (_, cache) = service();
        let (tx, mut rx) = mpsc::unbounded_channel();

        cache
            .subscribe(
                move |message: &StoreMessage| {
                    let _ = tx.send(message.clone());
                },
                &["events"],
            )
            .await
            .unwrap();

        let event = Event { kind: "created".into() };
        assert_eq!(cache.publish("events", &event).await.unwrap(), 1);
        assert_eq!(cache.publish("other", &event).await.unwrap(), 0);

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.channel, "events");
        let decoded: Event = cache.codec().decode(&message.payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn test_panicking_handler_keeps_subscription() {
        let (_, cache) = service();
        let (tx, mut rx) = mpsc::unbounded_channel();

        cache
            .subscribe(
                move |message: &StoreMessage| {
                    if message.payload == b"boom" {
                        panic!("handler failure");
                    }
                    let _ = tx.send(message.payload.clone());
                },
                &["events"],
            )
            .await
            .unwrap();

        cache.publish("events", "boom").await.unwrap();
        cache.publish("events", "ok").await.unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"ok");
        assert_eq!(cache.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (store, cache) = service();
        let id = cache
            .subscribe(|_: &StoreMessage| {}, &["a", "b"])
            .await
            .unwrap();
        assert_eq!(cache.active_subscriptions(), 1);
        assert_eq!(cache.publish("b", "x").await.unwrap(), 1);

        assert!(cache.unsubscribe(id));
        assert!(!cache.unsubscribe(id));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.active_subscriptions(), 0);
        assert_eq!(cache.publish("a", "x").await.unwrap(), 0);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_requires_channels() {
        let (_, cache) = service();
        assert!(cache.subscribe(|_: &StoreMessage| {}, &[]).await.is_err());
        assert!(cache.publish("", "x").await.is_err());
    }
}
