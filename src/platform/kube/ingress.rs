//! Ingress resources synthesized into `ingress-rule` configs.
//!
//! Read-only source: each ingress path becomes one rule routing
//! `host` + `path` to a cluster service. Which ingresses are processed is
//! decided by the mesh's ingress controller mode and class.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::{ControllerOptions, IngressControllerMode, MeshConfig};
use crate::error::Result;
use crate::lifecycle::ShutdownSignal;
use crate::model::{ConfigDescriptor, ConfigObject, ConfigStoreCache, EventStream, SnapshotCache, INGRESS_RULE};
use crate::platform::kube::client::{BackendPort, ClusterApi, ClusterIngress, ClusterIngressPath};

/// Whether this ingress belongs to the mesh's ingress controller.
///
/// `Default` also takes ingresses without any class; `Strict` requires a match.
pub fn should_process(ingress: &ClusterIngress, mesh: &MeshConfig) -> bool {
    match (mesh.ingress_controller_mode, ingress.class.as_deref()) {
        (IngressControllerMode::Off, _) => false,
        (IngressControllerMode::Default, None) => true,
        (IngressControllerMode::Default | IngressControllerMode::Strict, Some(class)) => {
            class == mesh.ingress_class
        }
        (IngressControllerMode::Strict, None) => false,
    }
}

fn uri_match(path: &ClusterIngressPath) -> Option<Value> {
    let path_value = path.path.as_deref().filter(|p| !p.is_empty())?;
    let matcher = match path.path_type.as_deref() {
        Some("Prefix") => json!({ "prefix": path_value }),
        Some("Exact") => json!({ "exact": path_value }),
        _ => match path_value
            .strip_suffix(".*")
            .or_else(|| path_value.strip_suffix('*'))
        {
            Some(prefix) => json!({ "prefix": prefix }),
            None => json!({ "exact": path_value }),
        },
    };
    Some(matcher)
}

fn rule_spec(ingress: &ClusterIngress, path: &ClusterIngressPath, domain_suffix: &str) -> Value {
    let mut matcher = Map::new();
    if let Some(host) = path.host.as_deref().filter(|h| !h.is_empty()) {
        matcher.insert("authority".into(), json!({ "exact": host }));
    }
    if let Some(uri) = uri_match(path) {
        matcher.insert("uri".into(), uri);
    }

    let port = match &path.port {
        Some(BackendPort::Number(n)) => json!(n),
        Some(BackendPort::Name(name)) => json!(name),
        None => Value::Null,
    };

    json!({
        "destination": format!("{}.{}.svc.{}", path.service, ingress.namespace, domain_suffix),
        "destinationPort": port,
        "match": Value::Object(matcher),
    })
}

/// One `ingress-rule` per ingress path, named `{ingress}-{index}`.
pub fn convert_ingress(ingress: &ClusterIngress, domain_suffix: &str) -> Vec<ConfigObject> {
    ingress
        .paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let mut object = ConfigObject::new(
                &INGRESS_RULE,
                ingress.namespace.clone(),
                format!("{}-{}", ingress.name, index),
                rule_spec(ingress, path, domain_suffix),
            );
            object.meta.revision = ingress.revision.clone();
            object
        })
        .collect()
}

pub struct IngressController {
    api: Arc<dyn ClusterApi>,
    mesh: Arc<MeshConfig>,
    descriptor: ConfigDescriptor,
    namespace: Option<String>,
    domain_suffix: String,
    resync: Duration,
    cache: SnapshotCache,
}

impl IngressController {
    pub fn new(api: Arc<dyn ClusterApi>, mesh: Arc<MeshConfig>, options: &ControllerOptions) -> Self {
        Self {
            api,
            mesh,
            descriptor: ConfigDescriptor::ingress_rules(),
            namespace: options.namespace.clone(),
            domain_suffix: options.domain_suffix.clone(),
            resync: options.resync_period,
            cache: SnapshotCache::new("kubernetes-ingress"),
        }
    }

    pub async fn sync(&self) -> Result<()> {
        let ingresses = self.api.list_ingresses(self.namespace.as_deref()).await?;
        let rules: Vec<ConfigObject> = ingresses
            .iter()
            .filter(|ingress| should_process(ingress, &self.mesh))
            .flat_map(|ingress| convert_ingress(ingress, &self.domain_suffix))
            .collect();
        self.cache.replace_kind(INGRESS_RULE.type_name, rules);
        self.cache.mark_synced();
        Ok(())
    }
}

#[async_trait]
impl ConfigStoreCache for IngressController {
    fn name(&self) -> &str {
        "kubernetes-ingress"
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
            mode = ?self.mesh.ingress_controller_mode,
            class = %self.mesh.ingress_class,
            "Starting ingress controller"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync().await {
                        tracing::warn!(error = %e, "Failed to list ingresses");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Ingress controller stopping");
                    break;
                }
            }
        }
    }
}
