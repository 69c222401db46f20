//! Service discovery over cluster services and endpoints.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ControllerOptions;
use crate::error::Result;
use crate::lifecycle::ShutdownSignal;
use crate::model::{
    Controller, NetworkEndpoint, Port, Protocol, Service, ServiceAccounts, ServiceDiscovery,
    ServiceInstance,
};
use crate::observability::metrics;
use crate::platform::index::ServiceIndex;
use crate::platform::kube::client::{ClusterApi, ClusterService};

/// Comma-separated service account names allowed to run the service.
pub const KUBE_SERVICE_ACCOUNTS_ANNOTATION: &str = "alpha.istio.io/kubernetes-serviceaccounts";
/// Comma-separated identities that are used verbatim.
pub const CANONICAL_SERVICE_ACCOUNTS_ANNOTATION: &str = "alpha.istio.io/canonical-serviceaccounts";

pub fn service_hostname(name: &str, namespace: &str, domain_suffix: &str) -> String {
    format!("{name}.{namespace}.svc.{domain_suffix}")
}

pub fn spiffe_identity(domain_suffix: &str, namespace: &str, account: &str) -> String {
    format!("spiffe://{domain_suffix}/ns/{namespace}/sa/{account}")
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Build the discovery index from cluster services.
pub fn build_index(services: &[ClusterService], domain_suffix: &str) -> ServiceIndex {
    let mut index = ServiceIndex::default();

    for svc in services {
        let hostname = service_hostname(&svc.name, &svc.namespace, domain_suffix);
        let ports: Vec<Port> = svc
            .ports
            .iter()
            .map(|p| Port::new(p.name.clone(), p.port, Protocol::from_platform(p.protocol.as_deref(), &p.name)))
            .collect();

        for ep in &svc.endpoints {
            // Unnamed endpoint ports only map unambiguously onto single-port services.
            let service_port = ports
                .iter()
                .find(|p| p.name == ep.port_name)
                .or_else(|| (ports.len() == 1).then(|| &ports[0]));
            let Some(service_port) = service_port else { continue };

            index.insert_instance(ServiceInstance {
                endpoint: NetworkEndpoint {
                    address: ep.address.clone(),
                    port: ep.port,
                    service_port: service_port.clone(),
                },
                service: hostname.clone(),
                labels: ep.labels.clone(),
            });
            if let Some(account) = &ep.service_account {
                index.insert_account(
                    &hostname,
                    Some(&service_port.name),
                    spiffe_identity(domain_suffix, &svc.namespace, account),
                );
            }
        }

        if let Some(accounts) = svc.annotations.get(KUBE_SERVICE_ACCOUNTS_ANNOTATION) {
            for account in split_list(accounts) {
                index.insert_account(&hostname, None, spiffe_identity(domain_suffix, &svc.namespace, account));
            }
        }
        if let Some(accounts) = svc.annotations.get(CANONICAL_SERVICE_ACCOUNTS_ANNOTATION) {
            for account in split_list(accounts) {
                index.insert_account(&hostname, None, account.to_string());
            }
        }

        index.insert_service(Service {
            hostname,
            address: svc.cluster_ip.clone(),
            ports,
            external_name: svc.external_name.clone(),
        });
    }

    index
}

/// Polls cluster services and serves them through [`ServiceDiscovery`].
pub struct KubeServiceController {
    api: Arc<dyn ClusterApi>,
    namespace: Option<String>,
    domain_suffix: String,
    resync: Duration,
    index: ArcSwap<ServiceIndex>,
    synced: AtomicBool,
}

impl KubeServiceController {
    pub fn new(api: Arc<dyn ClusterApi>, options: &ControllerOptions) -> Self {
        Self {
            api,
            namespace: options.namespace.clone(),
            domain_suffix: options.domain_suffix.clone(),
            resync: options.resync_period,
            index: ArcSwap::from_pointee(ServiceIndex::default()),
            synced: AtomicBool::new(false),
        }
    }

    /// Re-list services and swap in a fresh index. Returns the service count.
    pub async fn sync(&self) -> Result<usize> {
        let services = self.api.list_services(self.namespace.as_deref()).await?;
        let index = build_index(&services, &self.domain_suffix);
        let count = index.len();
        self.index.store(Arc::new(index));
        metrics::record_services(count);
        if !self.synced.swap(true, Ordering::AcqRel) {
            tracing::info!(services = count, "Service registry synced");
        }
        Ok(count)
    }

    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

impl ServiceDiscovery for KubeServiceController {
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

impl ServiceAccounts for KubeServiceController {
    fn service_accounts(&self, hostname: &str, ports: &[&str]) -> Vec<String> {
        self.index.load().accounts(hostname, ports)
    }
}

#[async_trait]
impl Controller for KubeServiceController {
    async fn run(&self, shutdown: ShutdownSignal) {
        let mut ticker = interval(self.resync);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            namespace = self.namespace.as_deref().unwrap_or("*"),
            resync = ?self.resync,
            "Starting service controller"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync().await {
                        tracing::warn!(error = %e, "Failed to list services");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Service controller stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::kube::client::{ClusterEndpoint, ClusterServicePort};
    use std::collections::BTreeMap;

    fn reviews() -> ClusterService {
        ClusterService {
            name: "reviews".into(),
            namespace: "default".into(),
            cluster_ip: Some("10.96.0.10".into()),
            external_name: None,
            ports: vec![
                ClusterServicePort {
                    name: "http".into(),
                    port: 9080,
                    protocol: Some("TCP".into()),
                },
                ClusterServicePort {
                    name: "grpc-admin".into(),
                    port: 9090,
                    protocol: Some("TCP".into()),
                },
            ],
            annotations: [(KUBE_SERVICE_ACCOUNTS_ANNOTATION.to_string(), "ops, audit".to_string())]
                .into_iter()
                .collect(),
            endpoints: vec![ClusterEndpoint {
                address: "172.17.0.5".into(),
                port: 9080,
                port_name: "http".into(),
                labels: [("version".to_string(), "v1".to_string())].into_iter().collect(),
                service_account: Some("bookinfo".into()),
            }],
        }
    }

    #[test]
    fn test_build_index() {
        let index = build_index(&[reviews()], "cluster.local");
        let svc = index.service("reviews.default.svc.cluster.local").unwrap();
        assert_eq!(svc.address.as_deref(), Some("10.96.0.10"));
        assert_eq!(svc.port("grpc-admin").map(|p| p.protocol), Some(Protocol::Grpc));

        let instances = index.instances("reviews.default.svc.cluster.local", &["http"]);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].labels.get("version").map(String::as_str), Some("v1"));
        assert!(index
            .instances("reviews.default.svc.cluster.local", &["grpc-admin"])
            .is_empty());
    }

    #[test]
    fn test_service_accounts() {
        let index = build_index(&[reviews()], "cluster.local");
        let host = "reviews.default.svc.cluster.local";
        assert_eq!(
            index.accounts(host, &["http"]),
            vec![
                "spiffe://cluster.local/ns/default/sa/audit",
                "spiffe://cluster.local/ns/default/sa/bookinfo",
                "spiffe://cluster.local/ns/default/sa/ops",
            ]
        );
        assert_eq!(
            index.accounts(host, &["grpc-admin"]),
            vec![
                "spiffe://cluster.local/ns/default/sa/audit",
                "spiffe://cluster.local/ns/default/sa/ops",
            ]
        );
    }

    #[test]
    fn test_unnamed_endpoint_port_on_single_port_service() {
        let svc = ClusterService {
            name: "db".into(),
            namespace: "data".into(),
            cluster_ip: None,
            external_name: None,
            ports: vec![ClusterServicePort {
                name: String::new(),
                port: 5432,
                protocol: None,
            }],
            annotations: BTreeMap::new(),
            endpoints: vec![ClusterEndpoint {
                address: "10.1.0.4".into(),
                port: 5432,
                port_name: "unnamed".into(),
                labels: BTreeMap::new(),
                service_account: None,
            }],
        };
        let index = build_index(&[svc], "cluster.local");
        let instances = index.instances("db.data.svc.cluster.local", &[]);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].endpoint.service_port.protocol, Protocol::Tcp);
    }
}
