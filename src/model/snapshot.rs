//! Snapshot cache shared by the polling config sources.
//!
//! A poll loop replaces the objects of one kind at a time. The cache diffs the
//! new listing against the previous one and emits add/update/delete events in
//! key order. Writers (the poll loop and write-through refreshes) are
//! serialized; readers never take the lock and only ever see whole snapshots.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::model::config::{ConfigEvent, ConfigKey, ConfigObject, EventKind};
use crate::model::store::{EventHub, EventStream};

type Snapshot = BTreeMap<ConfigKey, ConfigObject>;

pub struct SnapshotCache {
    name: String,
    objects: ArcSwap<Snapshot>,
    // Held from load to publish so events follow commit order.
    write: Mutex<()>,
    events: EventHub,
    synced: AtomicBool,
}

impl SnapshotCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: ArcSwap::from_pointee(Snapshot::new()),
            write: Mutex::new(()),
            events: EventHub::new(),
            synced: AtomicBool::new(false),
        }
    }

    pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Option<ConfigObject> {
        self.objects
            .load()
            .get(&ConfigKey::new(kind, namespace, name))
            .cloned()
    }

    pub fn list(&self, kind: &str, namespace: Option<&str>) -> Vec<ConfigObject> {
        self.objects
            .load()
            .values()
            .filter(|o| o.meta.kind == kind)
            .filter(|o| namespace.map_or(true, |ns| o.meta.namespace == ns))
            .cloned()
            .collect()
    }

    /// Replace every object of `kind` with `objects`, returning the events emitted.
    pub fn replace_kind(&self, kind: &str, objects: Vec<ConfigObject>) -> Vec<ConfigEvent> {
        let _write = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.objects.load_full();
        let incoming: Snapshot = objects.into_iter().map(|o| (o.key(), o)).collect();

        let mut next: Snapshot = current
            .iter()
            .filter(|(key, _)| key.kind != kind)
            .map(|(key, obj)| (key.clone(), obj.clone()))
            .collect();

        let mut changes = Vec::new();
        for (key, old) in current.iter().filter(|(key, _)| key.kind == kind) {
            if !incoming.contains_key(key) {
                changes.push((key.clone(), ConfigEvent::new(EventKind::Delete, old.clone())));
            }
        }
        for (key, obj) in incoming {
            match current.get(&key) {
                None => changes.push((key.clone(), ConfigEvent::new(EventKind::Add, obj.clone()))),
                Some(old) if old != &obj => {
                    changes.push((key.clone(), ConfigEvent::new(EventKind::Update, obj.clone())))
                }
                Some(_) => {}
            }
            next.insert(key, obj);
        }
        changes.sort_by(|a, b| a.0.cmp(&b.0));

        self.objects.store(Arc::new(next));

        let events: Vec<ConfigEvent> = changes.into_iter().map(|(_, event)| event).collect();
        for event in &events {
            self.events.publish(event.clone());
        }
        if !events.is_empty() {
            tracing::debug!(source = %self.name, kind, changes = events.len(), "Snapshot updated");
        }
        events
    }

    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn mark_synced(&self) {
        if !self.synced.swap(true, Ordering::AcqRel) {
            tracing::info!(source = %self.name, "Initial sync complete");
        }
    }

    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.objects.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
