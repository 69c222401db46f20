//! VM registry platform.
//!
//! Service discovery comes from the registry; config lives in a single
//! in-memory store. The mesh config file is not read on this path.

pub mod client;
pub mod controller;

use std::sync::Arc;

use crate::config::MeshConfig;
use crate::error::Result;
use crate::memory::MemoryConfigStore;
use crate::model::{ConfigDescriptor, ConfigStoreCache};
use crate::platform::{Platform, PlatformConnector, PlatformContext, VmRegistrySettings};

pub use client::{HttpRegistryClient, RegistryApi, RegistryEndpoint, RegistryInstance};
pub use controller::VmsServiceController;

pub(crate) async fn build(
    settings: VmRegistrySettings,
    connector: &dyn PlatformConnector,
) -> Result<PlatformContext> {
    let endpoint = RegistryEndpoint::resolve(&settings.vms, settings.controller.resync_period)?;
    let api = connector.connect_registry(endpoint.clone()).await?;

    let store: Arc<dyn ConfigStoreCache> = Arc::new(MemoryConfigStore::new(ConfigDescriptor::mesh_rules()));
    let services = Arc::new(VmsServiceController::new(api));

    Ok(PlatformContext {
        platform: Platform::VmRegistry,
        service_discovery: services.clone(),
        service_accounts: services.clone(),
        service_controller: services,
        config_sources: vec![store],
        mesh: Arc::new(MeshConfig::default()),
        secret_registry: None,
        registry_endpoint: Some(endpoint),
    })
}
