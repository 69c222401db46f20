//! Aggregation of several config sources into one store.
//!
//! # Data Flow
//! ```text
//! sources (disjoint kinds)
//!     → routing table: kind → owning source (built once, read-only)
//!     → list/get/create/update/delete routed to the owner
//!     → events(): fan-in of every source's stream
//!     → run(): each source's loop on its own task
//! ```
//!
//! # Design Decisions
//! - Kind conflicts are rejected at construction, before anything runs
//! - No cross-source ordering; each source's own order is preserved
//! - No deduplication of events, consumers handle repeats

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::lifecycle::ShutdownSignal;
use crate::model::{ConfigDescriptor, ConfigObject, ConfigStoreCache, EventStream};

/// A config store routing each kind to the single source that owns it.
pub struct AggregateConfigStore {
    descriptor: ConfigDescriptor,
    routes: HashMap<&'static str, usize>,
    sources: Vec<Arc<dyn ConfigStoreCache>>,
    tasks: TaskTracker,
}

impl AggregateConfigStore {
    /// Build an aggregate over `sources`.
    ///
    /// Fails with [`Error::KindConflict`] if two sources claim the same kind.
    pub fn new(sources: Vec<Arc<dyn ConfigStoreCache>>) -> Result<Self> {
        let mut routes: HashMap<&'static str, usize> = HashMap::new();
        let mut kinds = Vec::new();

        for (index, source) in sources.iter().enumerate() {
            for kind in source.descriptor().iter() {
                if let Some(&owner) = routes.get(kind.type_name) {
                    return Err(Error::KindConflict {
                        kind: kind.type_name.to_string(),
                        first: sources[owner].name().to_string(),
                        second: source.name().to_string(),
                    });
                }
                routes.insert(kind.type_name, index);
                kinds.push(*kind);
            }
        }

        // Disjointness was checked above, so the union cannot contain duplicates.
        let descriptor = ConfigDescriptor::new(kinds)?;

        tracing::info!(
            sources = sources.len(),
            kinds = ?descriptor.types(),
            "Aggregate config store created"
        );

        Ok(Self {
            descriptor,
            routes,
            sources,
            tasks: TaskTracker::new(),
        })
    }

    /// The source that owns `kind`.
    pub fn owner(&self, kind: &str) -> Result<&Arc<dyn ConfigStoreCache>> {
        self.routes
            .get(kind)
            .map(|&index| &self.sources[index])
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    pub fn sources(&self) -> &[Arc<dyn ConfigStoreCache>] {
        &self.sources
    }

    /// Resolve once every source loop started by [`ConfigStoreCache::run`] has returned.
    pub async fn wait_drained(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Number of source loops still running.
    pub fn running_sources(&self) -> usize {
        self.tasks.len()
    }
}

#[async_trait]
impl ConfigStoreCache for AggregateConfigStore {
    fn name(&self) -> &str {
        "aggregate"
    }

    fn descriptor(&self) -> &ConfigDescriptor {
        &self.descriptor
    }

    fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<ConfigObject>> {
        self.owner(kind)?.get(kind, namespace, name)
    }

    fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<ConfigObject>> {
        self.owner(kind)?.list(kind, namespace)
    }

    async fn create(&self, object: ConfigObject) -> Result<String> {
        self.owner(&object.meta.kind)?.create(object).await
    }

    async fn update(&self, object: ConfigObject) -> Result<String> {
        self.owner(&object.meta.kind)?.update(object).await
    }

    async fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
        self.owner(kind)?.delete(kind, namespace, name).await
    }

    fn events(&self) -> EventStream {
        stream::select_all(self.sources.iter().map(|s| s.events())).boxed()
    }

    fn has_synced(&self) -> bool {
        self.sources.iter().all(|s| s.has_synced())
    }

    async fn run(&self, shutdown: ShutdownSignal) {
        for source in &self.sources {
            let source = Arc::clone(source);
            let signal = shutdown.clone();
            self.tasks.spawn(async move {
                let name = source.name().to_string();
                tracing::debug!(source = %name, "Config source loop starting");
                source.run(signal).await;
                tracing::debug!(source = %name, "Config source loop exited");
            });
        }

        shutdown.cancelled().await;
        self.tasks.close();
        tracing::info!(pending = self.tasks.len(), "Aggregate config store stopping");
    }
}
