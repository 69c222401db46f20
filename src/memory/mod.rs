//! In-memory, writable config source.
//!
//! Used as the only config source on the VM registry platform, where there is
//! no cluster API to persist rules. Writes are serialized under one lock so
//! the event stream follows the order in which writes were applied.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::lifecycle::ShutdownSignal;
use crate::model::{
    ConfigDescriptor, ConfigEvent, ConfigKey, ConfigObject, ConfigStoreCache, EventHub, EventKind,
    EventStream,
};

pub struct MemoryConfigStore {
    name: String,
    descriptor: ConfigDescriptor,
    objects: RwLock<BTreeMap<ConfigKey, ConfigObject>>,
    revision: AtomicU64,
    events: EventHub,
    synced: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new(descriptor: ConfigDescriptor) -> Self {
        Self::named("memory", descriptor)
    }

    pub fn named(name: impl Into<String>, descriptor: ConfigDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            objects: RwLock::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
            events: EventHub::new(),
            synced: AtomicBool::new(false),
        }
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn emit(&self, event: EventKind, object: ConfigObject) {
        tracing::debug!(
            store = %self.name,
            event = event.as_str(),
            key = %object.key(),
            "Config changed"
        );
        self.events.publish(ConfigEvent::new(event, object));
    }

    fn not_found(key: ConfigKey) -> Error {
        Error::NotFound {
            kind: key.kind,
            namespace: key.namespace,
            name: key.name,
        }
    }
}

#[async_trait]
impl ConfigStoreCache for MemoryConfigStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &ConfigDescriptor {
        &self.descriptor
    }

    fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<ConfigObject>> {
        self.check_kind(kind)?;
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects.get(&ConfigKey::new(kind, namespace, name)).cloned())
    }

    fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<ConfigObject>> {
        self.check_kind(kind)?;
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects
            .values()
            .filter(|o| o.meta.kind == kind)
            .filter(|o| namespace.map_or(true, |ns| o.meta.namespace == ns))
            .cloned()
            .collect())
    }

    async fn create(&self, mut object: ConfigObject) -> Result<String> {
        self.check_kind(&object.meta.kind)?;
        let key = object.key();
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: key.kind,
                namespace: key.namespace,
                name: key.name,
            });
        }
        let revision = self.next_revision();
        object.meta.revision = revision.clone();
        objects.insert(key, object.clone());
        self.emit(EventKind::Add, object);
        Ok(revision)
    }

    async fn update(&self, mut object: ConfigObject) -> Result<String> {
        self.check_kind(&object.meta.kind)?;
        let key = object.key();
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        if !objects.contains_key(&key) {
            return Err(Self::not_found(key));
        }
        let revision = self.next_revision();
        object.meta.revision = revision.clone();
        objects.insert(key, object.clone());
        self.emit(EventKind::Update, object);
        Ok(revision)
    }

    async fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
        self.check_kind(kind)?;
        let key = ConfigKey::new(kind, namespace, name);
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        match objects.remove(&key) {
            Some(object) => {
                self.emit(EventKind::Delete, object);
                Ok(())
            }
            None => Err(Self::not_found(key)),
        }
    }

    fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    async fn run(&self, shutdown: ShutdownSignal) {
        self.synced.store(true, Ordering::Release);
        tracing::info!(store = %self.name, kinds = ?self.descriptor.types(), "Memory config store running");
        shutdown.cancelled().await;
        tracing::info!(store = %self.name, "Memory config store stopped");
    }
}
