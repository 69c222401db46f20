//! The config source contract.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::lifecycle::ShutdownSignal;
use crate::model::config::{ConfigDescriptor, ConfigEvent, ConfigObject};

/// Stream of change notifications. Infinite while the source is alive.
pub type EventStream = BoxStream<'static, ConfigEvent>;

/// A watchable provider of typed configuration objects.
///
/// Implementations own the concurrency-safety of their state. Each source
/// publishes through one [`EventHub`] in commit order, so every subscriber
/// observes all of a source's events in the order the source applied them.
#[async_trait]
pub trait ConfigStoreCache: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Kinds this source serves.
    fn descriptor(&self) -> &ConfigDescriptor;

    fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<ConfigObject>>;

    /// List objects of a kind. `None` lists across all namespaces.
    fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<ConfigObject>>;

    /// Create an object, returning its new revision.
    async fn create(&self, _object: ConfigObject) -> Result<String> {
        Err(self.unsupported("create"))
    }

    /// Replace an existing object, returning its new revision.
    async fn update(&self, _object: ConfigObject) -> Result<String> {
        Err(self.unsupported("update"))
    }

    async fn delete(&self, _kind: &str, _namespace: &str, _name: &str) -> Result<()> {
        Err(self.unsupported("delete"))
    }

    /// Subscribe to change notifications from this point on.
    fn events(&self) -> EventStream;

    /// True once the initial state has been loaded.
    fn has_synced(&self) -> bool;

    /// Run the source until the shutdown signal fires.
    async fn run(&self, shutdown: ShutdownSignal);

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            operation,
            store: self.name().to_string(),
        }
    }

    /// Fail with `UnknownKind` unless this source serves `kind`.
    fn check_kind(&self, kind: &str) -> Result<()> {
        if self.descriptor().contains(kind) {
            Ok(())
        } else {
            Err(Error::UnknownKind(kind.to_string()))
        }
    }
}

/// Per-subscriber fan-out of a source's events.
///
/// Every subscriber owns an unbounded channel, so a slow consumer never loses
/// notifications. Closed subscribers are pruned on the next publish.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConfigEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream of every event published from now on. Ends when the hub is dropped.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) }).boxed()
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: ConfigEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscribers(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<ConfigEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::{ConfigObject, EventKind, ROUTE_RULE};
    use serde_json::json;

    fn added(name: &str) -> ConfigEvent {
        ConfigEvent::new(EventKind::Add, ConfigObject::new(&ROUTE_RULE, "default", name, json!({})))
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_every_event() {
        let hub = EventHub::new();
        let mut events = hub.subscribe();

        for i in 0..5000 {
            hub.publish(added(&format!("r{i}")));
        }

        for i in 0..5000 {
            let event = events.next().await.unwrap();
            assert_eq!(event.object.meta.name, format!("r{i}"));
        }
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let hub = EventHub::new();
        let kept = hub.subscribe();
        drop(hub.subscribe());

        hub.publish(added("a"));
        assert_eq!(hub.subscribers(), 1);
        drop(kept);
        assert_eq!(hub.subscribers(), 0);
    }

    #[tokio::test]
    async fn test_stream_ends_with_hub() {
        let hub = EventHub::new();
        let mut events = hub.subscribe();
        hub.publish(added("a"));
        drop(hub);

        assert_eq!(events.next().await.unwrap().object.meta.name, "a");
        assert!(events.next().await.is_none());
    }
}
