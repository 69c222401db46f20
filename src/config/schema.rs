//! Configuration schema definitions.
//!
//! Mesh-wide static configuration and the VM registry settings file. All
//! types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

/// Mesh-wide static configuration, handed to the discovery service as-is.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Address of the egress proxy (host:port), empty when egress is disabled.
    pub egress_proxy_address: String,

    /// Address proxies use to reach the discovery service (host:port).
    pub discovery_address: String,

    /// Address of the policy/telemetry service (host:port), empty when disabled.
    pub mixer_address: String,

    /// Address of the trace collector (host:port), empty when disabled.
    pub zipkin_address: String,

    /// Port the sidecar proxy captures traffic on.
    pub proxy_listen_port: u16,

    /// Port of the sidecar proxy admin interface.
    pub proxy_admin_port: u16,

    /// Connection timeout used by proxies towards upstreams, in seconds.
    pub connect_timeout_secs: u64,

    /// Delay between proxy polls of the discovery service, in seconds.
    pub discovery_refresh_delay_secs: u64,

    /// How long proxies drain connections on hot restart, in seconds.
    pub drain_duration_secs: u64,

    /// Service cluster name reported by proxies.
    pub istio_service_cluster: String,

    /// Authentication between proxies.
    pub auth_policy: AuthPolicy,

    /// Directory proxies read mutual TLS certificates from.
    pub auth_certs_path: String,

    /// Whether ingress resources are turned into routing rules.
    pub ingress_controller_mode: IngressControllerMode,

    /// Ingress class handled by the mesh.
    pub ingress_class: String,

    /// Name of the service fronting the mesh ingress proxies.
    pub ingress_service: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            egress_proxy_address: "istio-egress:80".to_string(),
            discovery_address: "istio-pilot:8080".to_string(),
            mixer_address: String::new(),
            zipkin_address: String::new(),
            proxy_listen_port: 15001,
            proxy_admin_port: 15000,
            connect_timeout_secs: 1,
            discovery_refresh_delay_secs: 1,
            drain_duration_secs: 2,
            istio_service_cluster: "istio-proxy".to_string(),
            auth_policy: AuthPolicy::None,
            auth_certs_path: "/etc/certs".to_string(),
            ingress_controller_mode: IngressControllerMode::Off,
            ingress_class: "istio".to_string(),
            ingress_service: "istio-ingress".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    #[default]
    None,
    MutualTls,
}

/// Ingress synthesis mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressControllerMode {
    /// Ingress resources are ignored.
    #[default]
    Off,
    /// Ingresses with the mesh class or no class annotation are handled.
    Default,
    /// Only ingresses explicitly annotated with the mesh class are handled.
    Strict,
}

impl IngressControllerMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, IngressControllerMode::Off)
    }
}

/// Contents of the VM registry settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VmsFileConfig {
    pub registry: RegistryFileSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryFileSection {
    pub url: Option<String>,
    pub token: Option<String>,
    /// Registry poll interval in seconds.
    pub poll_secs: Option<u64>,
}
