//! Service discovery over the VM registry.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::lifecycle::ShutdownSignal;
use crate::model::{
    Controller, NetworkEndpoint, Port, Protocol, Service, ServiceAccounts, ServiceDiscovery,
    ServiceInstance,
};
use crate::observability::metrics;
use crate::platform::index::ServiceIndex;
use crate::platform::vms::client::{RegistryApi, RegistryInstance};

/// Registry tags become labels: `key=value` splits, a bare tag maps to an empty value.
pub fn tags_to_labels(tags: &[String]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|tag| match tag.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (tag.clone(), String::new()),
        })
        .collect()
}

fn is_serving(instance: &RegistryInstance) -> bool {
    instance.status.is_empty() || instance.status.eq_ignore_ascii_case("up")
}

fn parse_host_port(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.rsplit_once(':')?;
    let port = port.parse().ok()?;
    (!host.is_empty()).then(|| (host.trim_matches(|c| c == '[' || c == ']').to_string(), port))
}

pub fn build_index(instances: &[RegistryInstance]) -> ServiceIndex {
    let mut services: BTreeMap<&str, Vec<Port>> = BTreeMap::new();
    let mut index = ServiceIndex::default();

    for instance in instances.iter().filter(|i| is_serving(i)) {
        let Some((address, port)) = parse_host_port(&instance.endpoint.value) else {
            tracing::debug!(id = %instance.id, value = %instance.endpoint.value, "Skipping instance with malformed endpoint");
            continue;
        };
        let service_port = Port::new(
            instance.endpoint.kind.clone(),
            port,
            Protocol::from_port_name(&instance.endpoint.kind),
        );

        let ports = services.entry(&instance.service_name).or_default();
        if !ports.contains(&service_port) {
            ports.push(service_port.clone());
        }

        index.insert_instance(ServiceInstance {
            endpoint: NetworkEndpoint {
                address,
                port,
                service_port,
            },
            service: instance.service_name.clone(),
            labels: tags_to_labels(&instance.tags),
        });
    }

    for (name, ports) in services {
        index.insert_service(Service {
            hostname: name.to_string(),
            address: None,
            ports,
            external_name: None,
        });
    }
    index
}

/// Polls the registry and serves its instances.
pub struct VmsServiceController {
    api: Arc<dyn RegistryApi>,
    index: ArcSwap<ServiceIndex>,
    synced: AtomicBool,
}

impl VmsServiceController {
    pub fn new(api: Arc<dyn RegistryApi>) -> Self {
        Self {
            api,
            index: ArcSwap::from_pointee(ServiceIndex::default()),
            synced: AtomicBool::new(false),
        }
    }

    pub async fn sync(&self) -> Result<usize> {
        let instances = self.api.list_instances().await?;
        let index = build_index(&instances);
        let count = index.len();
        self.index.store(Arc::new(index));
        metrics::record_services(count);
        if !self.synced.swap(true, Ordering::AcqRel) {
            tracing::info!(services = count, instances = instances.len(), "VMs registry synced");
        }
        Ok(count)
    }

    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

impl ServiceDiscovery for VmsServiceController {
    fn services(&self) -> Vec<Service> {
        self.index.load().services()
    }

    fn get_service(&self, hostname: &str) -> Option<Service> {
        self.index.load().service(hostname)
    }

    fn instances(&self, hostname: &str, ports: &[&str]) -> Vec<ServiceInstance> {
        self.index.load().instances(hostname, ports)
    }

    fn host_instances(&self, addresses: &HashSet<String>) -> Vec<ServiceInstance> {
        self.index.load().host_instances(addresses)
    }
}

/// The registry carries no workload identities.
impl ServiceAccounts for VmsServiceController {
    fn service_accounts(&self, _hostname: &str, _ports: &[&str]) -> Vec<String> {
        Vec::new()
    }
}

#[async_trait]
impl Controller for VmsServiceController {
    async fn run(&self, shutdown: ShutdownSignal) {
        let poll = self.api.endpoint().poll_interval;
        let mut ticker = interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(url = %self.api.endpoint().url, poll = ?poll, "Starting VMs registry controller");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync().await {
                        tracing::warn!(error = %e, "Failed to poll VMs registry");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("VMs registry controller stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::vms::client::InstanceEndpoint;

    fn instance(service: &str, value: &str, tags: &[&str], status: &str) -> RegistryInstance {
        RegistryInstance {
            id: format!("{service}-{value}"),
            service_name: service.into(),
            endpoint: InstanceEndpoint {
                kind: "http".into(),
                value: value.into(),
            },
            tags: tags.iter().map(|t| t.to_string()).collect(),
            status: status.into(),
        }
    }

    #[test]
    fn test_tags_to_labels() {
        let labels = tags_to_labels(&["version=v2".into(), "canary".into(), "env=".into()]);
        assert_eq!(labels.get("version").map(String::as_str), Some("v2"));
        assert_eq!(labels.get("canary").map(String::as_str), Some(""));
        assert_eq!(labels.get("env").map(String::as_str), Some(""));
    }

    #[test]
    fn test_build_index_groups_by_service() {
        let index = build_index(&[
            instance("reviews", "10.0.0.1:9080", &["version=v1"], "UP"),
            instance("reviews", "10.0.0.2:9080", &["version=v2"], ""),
            instance("reviews", "10.0.0.3:9080", &[], "OUT_OF_SERVICE"),
            instance("ratings", "bad-endpoint", &[], "UP"),
        ]);

        assert_eq!(index.len(), 1);
        let svc = index.service("reviews").unwrap();
        assert_eq!(svc.ports, vec![Port::new("http", 9080, Protocol::Http)]);

        let instances = index.instances("reviews", &[]);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].labels.get("version").map(String::as_str), Some("v2"));
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(parse_host_port("10.0.0.1:80"), Some(("10.0.0.1".into(), 80)));
        assert_eq!(parse_host_port("[::1]:80"), Some(("::1".into(), 80)));
        assert_eq!(parse_host_port(":80"), None);
        assert_eq!(parse_host_port("host:http"), None);
    }
}
