//! Service registry model and the service discovery contracts.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::lifecycle::ShutdownSignal;

/// Application protocol carried on a service port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Http2,
    Grpc,
    Https,
    Tcp,
    Udp,
    Mongo,
    Redis,
}

impl Protocol {
    /// Derive the protocol from a port name such as `http-api` or `grpc`.
    ///
    /// Unrecognized names are treated as opaque TCP.
    pub fn from_port_name(name: &str) -> Self {
        let prefix = name.split('-').next().unwrap_or_default().to_ascii_lowercase();
        match prefix.as_str() {
            "http" => Protocol::Http,
            "http2" => Protocol::Http2,
            "grpc" => Protocol::Grpc,
            "https" => Protocol::Https,
            "udp" => Protocol::Udp,
            "mongo" => Protocol::Mongo,
            "redis" => Protocol::Redis,
            _ => Protocol::Tcp,
        }
    }

    /// Protocol for a port as reported by the platform (`TCP`/`UDP`) plus its name.
    pub fn from_platform(transport: Option<&str>, name: &str) -> Self {
        match transport {
            Some(t) if t.eq_ignore_ascii_case("udp") => Protocol::Udp,
            _ => Self::from_port_name(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Port {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Port {
    pub fn new(name: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            port,
            protocol,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    /// Fully qualified hostname, e.g. `reviews.default.svc.cluster.local`.
    pub hostname: String,
    pub address: Option<String>,
    pub ports: Vec<Port>,
    pub external_name: Option<String>,
}

impl Service {
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEndpoint {
    pub address: String,
    pub port: u16,
    pub service_port: Port,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInstance {
    pub endpoint: NetworkEndpoint,
    pub service: String,
    pub labels: BTreeMap<String, String>,
}

/// Read access to the platform's service registry.
pub trait ServiceDiscovery: Send + Sync {
    fn services(&self) -> Vec<Service>;

    fn get_service(&self, hostname: &str) -> Option<Service>;

    /// Instances of a service, restricted to the named ports (all ports when empty).
    fn instances(&self, hostname: &str, ports: &[&str]) -> Vec<ServiceInstance>;

    /// Instances co-located on any of the given addresses.
    fn host_instances(&self, addresses: &HashSet<String>) -> Vec<ServiceInstance>;
}

/// Identity lookups for mutual TLS.
pub trait ServiceAccounts: Send + Sync {
    /// Service account URIs allowed to run the given service ports.
    fn service_accounts(&self, hostname: &str, ports: &[&str]) -> Vec<String>;
}

/// A long-running controller bound to the shared shutdown signal.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn run(&self, shutdown: ShutdownSignal);
}

/// Certificate and key pair served to ingress proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSecret {
    pub certificate: Vec<u8>,
    pub private_key: Vec<u8>,
}

/// Lookup of TLS secrets by `name.namespace` URI.
#[async_trait]
pub trait SecretRegistry: Send + Sync {
    async fn get_tls_secret(&self, uri: &str) -> Result<Option<TlsSecret>>;
}

/// Filter instances down to the requested port names.
pub(crate) fn select_ports<'a>(
    instances: impl IntoIterator<Item = &'a ServiceInstance>,
    ports: &[&str],
) -> Vec<ServiceInstance> {
    instances
        .into_iter()
        .filter(|i| ports.is_empty() || ports.contains(&i.endpoint.service_port.name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_port_name() {
        assert_eq!(Protocol::from_port_name("http"), Protocol::Http);
        assert_eq!(Protocol::from_port_name("http-api"), Protocol::Http);
        assert_eq!(Protocol::from_port_name("HTTP2-web"), Protocol::Http2);
        assert_eq!(Protocol::from_port_name("grpc-backend"), Protocol::Grpc);
        assert_eq!(Protocol::from_port_name("mongo"), Protocol::Mongo);
        assert_eq!(Protocol::from_port_name("metrics"), Protocol::Tcp);
        assert_eq!(Protocol::from_port_name(""), Protocol::Tcp);
    }

    #[test]
    fn test_platform_udp_overrides_name() {
        assert_eq!(Protocol::from_platform(Some("UDP"), "http-dns"), Protocol::Udp);
        assert_eq!(Protocol::from_platform(Some("TCP"), "http-web"), Protocol::Http);
        assert_eq!(Protocol::from_platform(None, "redis"), Protocol::Redis);
    }

    #[test]
    fn test_select_ports() {
        let port = Port::new("http", 80, Protocol::Http);
        let admin = Port::new("admin", 9000, Protocol::Tcp);
        let instances = vec![
            ServiceInstance {
                endpoint: NetworkEndpoint { address: "10.0.0.1".into(), port: 8080, service_port: port },
                service: "a".into(),
                labels: BTreeMap::new(),
            },
            ServiceInstance {
                endpoint: NetworkEndpoint { address: "10.0.0.1".into(), port: 9000, service_port: admin },
                service: "a".into(),
                labels: BTreeMap::new(),
            },
        ];
        assert_eq!(select_ports(&instances, &[]).len(), 2);
        assert_eq!(select_ports(&instances, &["admin"]).len(), 1);
        assert!(select_ports(&instances, &["grpc"]).is_empty());
    }
}
