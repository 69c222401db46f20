//! Shared fakes and helpers for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use pilot::config::PilotSettings;
use pilot::error::{Error, Result};
use pilot::model::{ConfigDescriptor, ConfigKey, ConfigKind, ConfigObject};
use pilot::platform::kube::client::{ClusterIngress, ClusterService};
use pilot::platform::kube::ClusterApi;
use pilot::platform::vms::{RegistryApi, RegistryEndpoint, RegistryInstance};
use pilot::platform::PlatformConnector;

/// In-memory stand-in for the cluster API.
#[derive(Default)]
pub struct FakeCluster {
    pub configs: Mutex<BTreeMap<ConfigKey, ConfigObject>>,
    pub ingresses: Mutex<Vec<ClusterIngress>>,
    pub services: Mutex<Vec<ClusterService>>,
    pub secrets: Mutex<BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>>,
    pub registered: Mutex<Vec<String>>,
    pub fail_registration: bool,
    revision: AtomicU64,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_registration() -> Self {
        Self {
            fail_registration: true,
            ..Self::default()
        }
    }

    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn register_kinds(&self, descriptor: &ConfigDescriptor) -> Result<()> {
        for kind in descriptor.iter() {
            if self.fail_registration {
                return Err(Error::Registration {
                    kind: kind.type_name.to_string(),
                    source: "forbidden".into(),
                });
            }
            self.registered.lock().unwrap().push(kind.type_name.to_string());
        }
        Ok(())
    }

    async fn list_configs(&self, kind: &ConfigKind, namespace: Option<&str>) -> Result<Vec<ConfigObject>> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.meta.kind == kind.type_name)
            .filter(|o| namespace.map_or(true, |ns| o.meta.namespace == ns))
            .cloned()
            .collect())
    }

    async fn create_config(&self, _kind: &ConfigKind, object: &ConfigObject) -> Result<String> {
        let mut configs = self.configs.lock().unwrap();
        if configs.contains_key(&object.key()) {
            return Err(Error::AlreadyExists {
                kind: object.meta.kind.clone(),
                namespace: object.meta.namespace.clone(),
                name: object.meta.name.clone(),
            });
        }
        let mut stored = object.clone();
        stored.meta.revision = self.next_revision();
        configs.insert(stored.key(), stored.clone());
        Ok(stored.meta.revision)
    }

    async fn update_config(&self, _kind: &ConfigKind, object: &ConfigObject) -> Result<String> {
        let mut configs = self.configs.lock().unwrap();
        if !configs.contains_key(&object.key()) {
            return Err(Error::NotFound {
                kind: object.meta.kind.clone(),
                namespace: object.meta.namespace.clone(),
                name: object.meta.name.clone(),
            });
        }
        let mut stored = object.clone();
        stored.meta.revision = self.next_revision();
        configs.insert(stored.key(), stored.clone());
        Ok(stored.meta.revision)
    }

    async fn delete_config(&self, kind: &ConfigKind, namespace: &str, name: &str) -> Result<()> {
        self.configs
            .lock()
            .unwrap()
            .remove(&ConfigKey::new(kind.type_name, namespace, name))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound {
                kind: kind.type_name.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list_ingresses(&self, namespace: Option<&str>) -> Result<Vec<ClusterIngress>> {
        Ok(self
            .ingresses
            .lock()
            .unwrap()
            .iter()
            .filter(|i| namespace.map_or(true, |ns| i.namespace == ns))
            .cloned()
            .collect())
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<ClusterService>> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .filter(|s| namespace.map_or(true, |ns| s.namespace == ns))
            .cloned()
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

pub struct FakeRegistry {
    pub endpoint: RegistryEndpoint,
    pub instances: Mutex<Vec<RegistryInstance>>,
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }

    async fn list_instances(&self) -> Result<Vec<RegistryInstance>> {
        Ok(self.instances.lock().unwrap().clone())
    }
}

/// Hands out fakes and records what the adapter asked for.
pub struct FakeConnector {
    pub cluster: Arc<FakeCluster>,
    pub instances: Vec<RegistryInstance>,
    pub refuse: bool,
    pub cluster_connects: AtomicUsize,
    pub registry_endpoints: Mutex<Vec<RegistryEndpoint>>,
}

impl FakeConnector {
    pub fn new(cluster: FakeCluster) -> Self {
        Self {
            cluster: Arc::new(cluster),
            instances: Vec::new(),
            refuse: false,
            cluster_connects: AtomicUsize::new(0),
            registry_endpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn with_instances(instances: Vec<RegistryInstance>) -> Self {
        Self {
            instances,
            ..Self::new(FakeCluster::new())
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(FakeCluster::new())
        }
    }

    pub fn connects(&self) -> usize {
        self.cluster_connects.load(Ordering::SeqCst) + self.registry_endpoints.lock().unwrap().len()
    }
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    async fn connect_cluster(&self, _kubeconfig: Option<&Path>) -> Result<Arc<dyn ClusterApi>> {
        self.cluster_connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(Error::connection("connect to Kubernetes API", "connection refused"));
        }
        Ok(self.cluster.clone())
    }

    async fn connect_registry(&self, endpoint: RegistryEndpoint) -> Result<Arc<dyn RegistryApi>> {
        self.registry_endpoints.lock().unwrap().push(endpoint.clone());
        if self.refuse {
            return Err(Error::connection("create VMs client", "connection refused"));
        }
        Ok(Arc::new(FakeRegistry {
            endpoint,
            instances: Mutex::new(self.instances.clone()),
        }))
    }
}

/// Write a mesh config file for the orchestrator path.
pub fn mesh_config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Settings suited to tests: ephemeral discovery port, fast resync, short grace.
pub fn test_settings(adapter: &str, mesh_config: &Path) -> PilotSettings {
    let mut settings = PilotSettings {
        adapter: adapter.to_string(),
        mesh_config: mesh_config.to_path_buf(),
        grace_period: Duration::from_secs(2),
        ..PilotSettings::default()
    };
    settings.discovery.port = 0;
    settings.controller.resync_period = Duration::from_millis(20);
    settings
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
