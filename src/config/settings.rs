//! Immutable process settings.
//!
//! Built once from the command line and passed by value into the platform
//! adapter and the lifecycle coordinator. Nothing reads flags after this.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by the platform controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Namespace scope; `None` watches every namespace.
    pub namespace: Option<String>,
    /// Interval between re-listings of watched resources.
    pub resync_period: Duration,
    /// DNS domain suffix used to build service hostnames.
    pub domain_suffix: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_period: Duration::from_secs(1),
            domain_suffix: "cluster.local".to_string(),
        }
    }
}

/// Discovery service options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub port: u16,
    /// Serve the `/debug` endpoints.
    pub enable_profiling: bool,
    /// Cache config responses until the next config change.
    pub enable_caching: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            port: 8080,
            enable_profiling: true,
            enable_caching: true,
        }
    }
}

/// VM registry overrides. The config file and the token are separate fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmsOptions {
    pub config_file: Option<PathBuf>,
    pub server_url: Option<String>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PilotSettings {
    /// Platform tag as given on the command line; empty selects the default.
    pub adapter: String,
    pub kubeconfig: Option<PathBuf>,
    pub mesh_config: PathBuf,
    pub controller: ControllerOptions,
    pub discovery: DiscoveryOptions,
    pub vms: VmsOptions,
    /// How long draining tasks get before the process exits anyway.
    pub grace_period: Duration,
    /// Prometheus exporter address; disabled when unset.
    pub metrics_address: Option<SocketAddr>,
}

impl Default for PilotSettings {
    fn default() -> Self {
        Self {
            adapter: String::new(),
            kubeconfig: None,
            mesh_config: PathBuf::from("/etc/istio/config/mesh"),
            controller: ControllerOptions::default(),
            discovery: DiscoveryOptions::default(),
            vms: VmsOptions::default(),
            grace_period: Duration::from_secs(10),
            metrics_address: None,
        }
    }
}
