//! Config kinds stored as cluster custom resources.
//!
//! # Responsibilities
//! - Describe each config kind as a custom resource definition
//! - Convert between dynamic custom resources and [`ConfigObject`]s
//! - Poll the cluster and publish per-kind snapshots as a config source

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ApiResource, DynamicObject};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ControllerOptions;
use crate::error::{Error, Result};
use crate::lifecycle::ShutdownSignal;
use crate::model::{
    ConfigDescriptor, ConfigKind, ConfigMeta, ConfigObject, ConfigStoreCache, EventStream,
    SnapshotCache,
};
use crate::platform::kube::client::ClusterApi;

pub const CRD_GROUP: &str = "config.istio.io";
pub const CRD_VERSION: &str = "v1alpha2";

/// Namespace used for writes that do not name one.
const DEFAULT_NAMESPACE: &str = "default";

pub(crate) fn api_resource(kind: &ConfigKind) -> ApiResource {
    ApiResource {
        group: CRD_GROUP.to_string(),
        version: CRD_VERSION.to_string(),
        api_version: format!("{CRD_GROUP}/{CRD_VERSION}"),
        kind: kind.kind.to_string(),
        plural: kind.plural.to_string(),
    }
}

/// Custom resource definition for a config kind. The payload schema is left open.
pub(crate) fn crd_manifest(kind: &ConfigKind) -> serde_json::Result<CustomResourceDefinition> {
    serde_json::from_value(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": format!("{}.{}", kind.plural, CRD_GROUP) },
        "spec": {
            "group": CRD_GROUP,
            "scope": "Namespaced",
            "names": {
                "kind": kind.kind,
                "listKind": format!("{}List", kind.kind),
                "plural": kind.plural,
                "singular": kind.type_name,
            },
            "versions": [{
                "name": CRD_VERSION,
                "served": true,
                "storage": true,
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "x-kubernetes-preserve-unknown-fields": true,
                    }
                }
            }]
        }
    }))
}

pub(crate) fn config_from_dynamic(kind: &ConfigKind, object: DynamicObject) -> ConfigObject {
    let meta = object.metadata;
    ConfigObject {
        meta: ConfigMeta {
            kind: kind.type_name.to_string(),
            namespace: meta.namespace.unwrap_or_default(),
            name: meta.name.unwrap_or_default(),
            revision: meta.resource_version.unwrap_or_default(),
            labels: meta.labels.unwrap_or_default(),
        },
        spec: object
            .data
            .get("spec")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    }
}

pub(crate) fn config_to_dynamic(kind: &ConfigKind, object: &ConfigObject) -> DynamicObject {
    let mut dynamic = DynamicObject::new(&object.meta.name, &api_resource(kind))
        .within(&object.meta.namespace)
        .data(json!({ "spec": object.spec }));
    if !object.meta.labels.is_empty() {
        dynamic.metadata.labels = Some(object.meta.labels.clone());
    }
    if !object.meta.revision.is_empty() {
        dynamic.metadata.resource_version = Some(object.meta.revision.clone());
    }
    dynamic
}

/// Config source backed by custom resources, refreshed on every resync tick.
pub struct CrdController {
    api: Arc<dyn ClusterApi>,
    descriptor: ConfigDescriptor,
    namespace: Option<String>,
    resync: Duration,
    cache: SnapshotCache,
    // Held from list to replace so an older listing never lands after a newer one.
    listing: Mutex<()>,
}

impl CrdController {
    pub fn new(api: Arc<dyn ClusterApi>, descriptor: ConfigDescriptor, options: &ControllerOptions) -> Self {
        Self {
            api,
            descriptor,
            namespace: options.namespace.clone(),
            resync: options.resync_period,
            cache: SnapshotCache::new("kubernetes-crd"),
            listing: Mutex::new(()),
        }
    }

    async fn sync_kind(&self, kind: &ConfigKind) -> Result<()> {
        let _listing = self.listing.lock().await;
        let objects = self.api.list_configs(kind, self.namespace.as_deref()).await?;
        self.cache.replace_kind(kind.type_name, objects);
        Ok(())
    }

    /// Re-list every kind. A failing kind keeps its previous snapshot.
    pub async fn sync(&self) -> Result<()> {
        let mut first_error = None;
        for kind in self.descriptor.iter() {
            if let Err(e) = self.sync_kind(kind).await {
                tracing::warn!(kind = %kind, error = %e, "Failed to list custom resources");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                self.cache.mark_synced();
                Ok(())
            }
        }
    }

    fn kind(&self, type_name: &str) -> Result<ConfigKind> {
        self.descriptor
            .get(type_name)
            .copied()
            .ok_or_else(|| Error::UnknownKind(type_name.to_string()))
    }

    fn with_namespace(&self, mut object: ConfigObject) -> ConfigObject {
        if object.meta.namespace.is_empty() {
            object.meta.namespace = self
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        }
        object
    }

    /// Pick up our own write without waiting for the next tick.
    async fn refresh(&self, kind: &ConfigKind) {
        if let Err(e) = self.sync_kind(kind).await {
            tracing::debug!(kind = %kind, error = %e, "Refresh after write failed");
        }
    }
}

#[async_trait]
impl ConfigStoreCache for CrdController {
    fn name(&self) -> &str {
        "kubernetes-crd"
    }

    fn descriptor(&self) -> &ConfigDescriptor {
        &self.descriptor
    }

    fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<ConfigObject>> {
        self.check_kind(kind)?;
        Ok(self.cache.get(kind, namespace, name))
    }

    fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<ConfigObject>> {
        self.check_kind(kind)?;
        Ok(self.cache.list(kind, namespace))
    }

    async fn create(&self, object: ConfigObject) -> Result<String> {
        let kind = self.kind(&object.meta.kind)?;
        let object = self.with_namespace(object);
        let revision = self.api.create_config(&kind, &object).await?;
        self.refresh(&kind).await;
        Ok(revision)
    }

    async fn update(&self, object: ConfigObject) -> Result<String> {
        let kind = self.kind(&object.meta.kind)?;
        let object = self.with_namespace(object);
        let revision = self.api.update_config(&kind, &object).await?;
        self.refresh(&kind).await;
        Ok(revision)
    }

    async fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
        let kind = self.kind(kind)?;
        self.api.delete_config(&kind, namespace, name).await?;
        self.refresh(&kind).await;
        Ok(())
    }

    fn events(&self) -> EventStream {
        self.cache.events()
    }

    fn has_synced(&self) -> bool {
        self.cache.has_synced()
    }

    async fn run(&self, shutdown: ShutdownSignal) {
        let mut ticker = interval(self.resync);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            kinds = ?self.descriptor.types(),
            namespace = self.namespace.as_deref().unwrap_or("*"),
            resync = ?self.resync,
            "Starting custom resource controller"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged per kind and retried on the next tick.
                    let _ = self.sync().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Custom resource controller stopping");
                    break;
                }
            }
        }
    }
}
