//! Service index shared by the platform service controllers.
//!
//! Controllers rebuild a whole index on every poll and publish it with an
//! atomic swap, so lookups never block the poll loop.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::model::service::select_ports;
use crate::model::{Service, ServiceInstance};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceIndex {
    services: BTreeMap<String, Service>,
    instances: BTreeMap<String, Vec<ServiceInstance>>,
    /// Service account URIs per hostname, keyed by port name (`None` = every port).
    accounts: BTreeMap<String, Vec<(Option<String>, String)>>,
}

impl ServiceIndex {
    pub fn insert_service(&mut self, service: Service) {
        self.services.insert(service.hostname.clone(), service);
    }

    pub fn insert_instance(&mut self, instance: ServiceInstance) {
        self.instances
            .entry(instance.service.clone())
            .or_default()
            .push(instance);
    }

    /// Record an account allowed on `port` of `hostname`, or on every port when `port` is `None`.
    pub fn insert_account(&mut self, hostname: &str, port: Option<&str>, account: String) {
        self.accounts
            .entry(hostname.to_string())
            .or_default()
            .push((port.map(str::to_string), account));
    }

    pub fn services(&self) -> Vec<Service> {
        self.services.values().cloned().collect()
    }

    pub fn service(&self, hostname: &str) -> Option<Service> {
        self.services.get(hostname).cloned()
    }

    pub fn instances(&self, hostname: &str, ports: &[&str]) -> Vec<ServiceInstance> {
        self.instances
            .get(hostname)
            .map(|all| select_ports(all, ports))
            .unwrap_or_default()
    }

    pub fn host_instances(&self, addresses: &HashSet<String>) -> Vec<ServiceInstance> {
        self.instances
            .values()
            .flatten()
            .filter(|i| addresses.contains(&i.endpoint.address))
            .cloned()
            .collect()
    }

    /// Sorted, de-duplicated accounts for the requested ports (all ports when empty).
    pub fn accounts(&self, hostname: &str, ports: &[&str]) -> Vec<String> {
        let Some(entries) = self.accounts.get(hostname) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|(port, _)| match port {
                None => true,
                Some(port) => ports.is_empty() || ports.contains(&port.as_str()),
            })
            .map(|(_, account)| account.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NetworkEndpoint, Port, Protocol};

    fn instance(service: &str, address: &str, port: &Port) -> ServiceInstance {
        ServiceInstance {
            endpoint: NetworkEndpoint {
                address: address.to_string(),
                port: 9080,
                service_port: port.clone(),
            },
            service: service.to_string(),
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_lookup() {
        let http = Port::new("http", 80, Protocol::Http);
        let mut index = ServiceIndex::default();
        index.insert_service(Service {
            hostname: "reviews".into(),
            address: None,
            ports: vec![http.clone()],
            external_name: None,
        });
        index.insert_instance(instance("reviews", "10.0.0.1", &http));
        index.insert_instance(instance("reviews", "10.0.0.2", &http));

        assert_eq!(index.len(), 1);
        assert_eq!(index.instances("reviews", &[]).len(), 2);
        assert_eq!(index.instances("reviews", &["http"]).len(), 2);
        assert!(index.instances("ratings", &[]).is_empty());

        let hosts: HashSet<String> = ["10.0.0.2".to_string()].into_iter().collect();
        assert_eq!(index.host_instances(&hosts).len(), 1);
    }

    #[test]
    fn test_accounts_by_port() {
        let mut index = ServiceIndex::default();
        index.insert_account("reviews", Some("http"), "spiffe://a".into());
        index.insert_account("reviews", Some("grpc"), "spiffe://b".into());
        index.insert_account("reviews", None, "spiffe://c".into());
        index.insert_account("reviews", Some("http"), "spiffe://a".into());

        assert_eq!(index.accounts("reviews", &["http"]), vec!["spiffe://a", "spiffe://c"]);
        assert_eq!(
            index.accounts("reviews", &[]),
            vec!["spiffe://a", "spiffe://b", "spiffe://c"]
        );
        assert!(index.accounts("ratings", &[]).is_empty());
    }
}
