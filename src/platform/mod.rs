//! Platform adapters.
//!
//! # Data Flow
//! ```text
//! PilotSettings.adapter ("Kubernetes" | "VMs" | "")
//!     → Platform (parsed tag)
//!     → PlatformAdapter (variant carrying only its own settings)
//!     → build(connector) → PlatformContext
//! ```
//!
//! # Design Decisions
//! - Clients come from a [`PlatformConnector`] so the wiring can run against fakes
//! - Each variant validates and connects before anything is launched

pub mod index;
pub mod kube;
pub mod vms;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ControllerOptions, MeshConfig, PilotSettings, VmsOptions};
use crate::error::{Error, Result};
use crate::model::{
    ConfigStoreCache, Controller, SecretRegistry, ServiceAccounts, ServiceDiscovery,
};
use crate::platform::kube::{ClusterApi, KubeClusterApi};
use crate::platform::vms::{HttpRegistryClient, RegistryApi, RegistryEndpoint};

pub const KUBERNETES_ADAPTER: &str = "Kubernetes";
pub const VMS_ADAPTER: &str = "VMs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Orchestrator,
    VmRegistry,
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "" | KUBERNETES_ADAPTER => Ok(Platform::Orchestrator),
            VMS_ADAPTER => Ok(Platform::VmRegistry),
            other => Err(Error::AdapterSelection(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Orchestrator => f.write_str(KUBERNETES_ADAPTER),
            Platform::VmRegistry => f.write_str(VMS_ADAPTER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub kubeconfig: Option<PathBuf>,
    pub mesh_config: PathBuf,
    pub controller: ControllerOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRegistrySettings {
    pub vms: VmsOptions,
    pub controller: ControllerOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformAdapter {
    Orchestrator(OrchestratorSettings),
    VmRegistry(VmRegistrySettings),
}

impl PlatformAdapter {
    pub fn select(settings: &PilotSettings) -> Result<Self> {
        let adapter = match settings.adapter.parse::<Platform>()? {
            Platform::Orchestrator => PlatformAdapter::Orchestrator(OrchestratorSettings {
                kubeconfig: settings.kubeconfig.clone(),
                mesh_config: settings.mesh_config.clone(),
                controller: settings.controller.clone(),
            }),
            Platform::VmRegistry => PlatformAdapter::VmRegistry(VmRegistrySettings {
                vms: settings.vms.clone(),
                controller: settings.controller.clone(),
            }),
        };
        Ok(adapter)
    }

    pub fn platform(&self) -> Platform {
        match self {
            PlatformAdapter::Orchestrator(_) => Platform::Orchestrator,
            PlatformAdapter::VmRegistry(_) => Platform::VmRegistry,
        }
    }

    /// Connect to the platform and assemble its context.
    pub async fn build(self, connector: &dyn PlatformConnector) -> Result<PlatformContext> {
        tracing::info!(platform = %self.platform(), "Building platform adapter");
        match self {
            PlatformAdapter::Orchestrator(settings) => kube::build(settings, connector).await,
            PlatformAdapter::VmRegistry(settings) => vms::build(settings, connector).await,
        }
    }
}

/// Everything a platform contributes to the environment.
pub struct PlatformContext {
    pub platform: Platform,
    pub service_discovery: Arc<dyn ServiceDiscovery>,
    pub service_accounts: Arc<dyn ServiceAccounts>,
    pub service_controller: Arc<dyn Controller>,
    /// In registration order.
    pub config_sources: Vec<Arc<dyn ConfigStoreCache>>,
    pub mesh: Arc<MeshConfig>,
    pub secret_registry: Option<Arc<dyn SecretRegistry>>,
    /// Resolved registry endpoint (VM registry only).
    pub registry_endpoint: Option<RegistryEndpoint>,
}

impl fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.config_sources.iter().map(|s| s.name()).collect();
        f.debug_struct("PlatformContext")
            .field("platform", &self.platform)
            .field("config_sources", &sources)
            .field("secret_registry", &self.secret_registry.is_some())
            .field("registry_endpoint", &self.registry_endpoint)
            .finish_non_exhaustive()
    }
}

/// Creates platform clients.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect_cluster(&self, kubeconfig: Option<&Path>) -> Result<Arc<dyn ClusterApi>>;

    async fn connect_registry(&self, endpoint: RegistryEndpoint) -> Result<Arc<dyn RegistryApi>>;
}

/// Connects to real clusters and registries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveConnector;

#[async_trait]
impl PlatformConnector for LiveConnector {
    async fn connect_cluster(&self, kubeconfig: Option<&Path>) -> Result<Arc<dyn ClusterApi>> {
        Ok(Arc::new(KubeClusterApi::connect(kubeconfig).await?))
    }

    async fn connect_registry(&self, endpoint: RegistryEndpoint) -> Result<Arc<dyn RegistryApi>> {
        Ok(Arc::new(HttpRegistryClient::new(endpoint)?))
    }
}
