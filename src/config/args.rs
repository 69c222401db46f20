//! Command line definition.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::settings::{ControllerOptions, DiscoveryOptions, PilotSettings, VmsOptions};

#[derive(Debug, Parser)]
#[command(name = "pilot")]
#[command(about = "Service mesh pilot", long_about = "Pilot provides management plane functionality to the service mesh.")]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long = "log_as_json", global = true)]
    pub log_as_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the proxy discovery service
    Discovery(DiscoveryArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct DiscoveryArgs {
    /// Select the underlying running platform, options are {Kubernetes, VMs}
    #[arg(long, default_value = "Kubernetes")]
    pub adapter: String,

    /// Use a Kubernetes configuration file instead of in-cluster configuration
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// File name for mesh configuration
    #[arg(long = "meshConfig", default_value = "/etc/istio/config/mesh")]
    pub mesh_config: PathBuf,

    /// Select a namespace for the controller loop. If not set, uses ${POD_NAMESPACE} environment variable
    #[arg(short, long, env = "POD_NAMESPACE")]
    pub namespace: Option<String>,

    /// Controller resync interval, e.g. `1s`, `500ms` or bare seconds
    #[arg(long = "resync", default_value = "1s", value_parser = parse_resync)]
    pub resync: Duration,

    /// DNS domain suffix
    #[arg(long = "domain", default_value = "cluster.local")]
    pub domain_suffix: String,

    /// Discovery service port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Enable debug endpoints under /debug
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub profile: bool,

    /// Enable caching discovery service responses
    #[arg(long = "discovery_cache", default_value_t = true, action = ArgAction::Set)]
    pub discovery_cache: bool,

    /// VMs config file for discovery
    #[arg(long = "vmsconfig")]
    pub vms_config: Option<PathBuf>,

    /// URL for the registry server
    #[arg(long = "serverURL")]
    pub server_url: Option<String>,

    /// Authorization token used to access the registry server
    #[arg(long = "authToken")]
    pub auth_token: Option<String>,

    /// Seconds to wait for tasks to stop after a termination request
    #[arg(long = "grace", default_value_t = 10)]
    pub grace_secs: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long = "metricsAddr")]
    pub metrics_address: Option<SocketAddr>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl DiscoveryArgs {
    /// Freeze the parsed flags into the settings struct.
    pub fn into_settings(self) -> PilotSettings {
        PilotSettings {
            adapter: self.adapter,
            kubeconfig: self.kubeconfig,
            mesh_config: self.mesh_config,
            controller: ControllerOptions {
                namespace: non_empty(self.namespace),
                resync_period: self.resync,
                domain_suffix: self.domain_suffix,
            },
            discovery: DiscoveryOptions {
                port: self.port,
                enable_profiling: self.profile,
                enable_caching: self.discovery_cache,
            },
            vms: VmsOptions {
                config_file: self.vms_config,
                server_url: non_empty(self.server_url),
                auth_token: non_empty(self.auth_token),
            },
            grace_period: Duration::from_secs(self.grace_secs),
            metrics_address: self.metrics_address,
        }
    }
}

/// Parse a resync period. Bare integers are seconds.
fn parse_resync(value: &str) -> Result<Duration, String> {
    let period = match value.trim().parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(value.trim()).map_err(|e| e.to_string())?,
    };
    if period.is_zero() {
        return Err("resync period must be greater than zero".to_string());
    }
    Ok(period)
}
