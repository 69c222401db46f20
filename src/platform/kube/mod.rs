//! Orchestrator (Kubernetes) platform.
//!
//! # Startup Order
//! ```text
//! connect → read mesh config → register kinds
//!     → CrdController {route-rule, destination-policy}
//!     → IngressController {ingress-rule}   (ingress mode != off)
//!     → KubeServiceController, KubeSecretRegistry
//! ```

pub mod client;
pub mod controller;
pub mod crd;
pub mod ingress;
pub mod secrets;

use std::sync::Arc;

use crate::config::loader::load_mesh_config;
use crate::error::Result;
use crate::model::{ConfigDescriptor, ConfigStoreCache};
use crate::platform::{OrchestratorSettings, Platform, PlatformConnector, PlatformContext};

pub use client::{ClusterApi, KubeClusterApi};
pub use controller::KubeServiceController;
pub use crd::CrdController;
pub use ingress::IngressController;
pub use secrets::KubeSecretRegistry;

pub(crate) async fn build(
    settings: OrchestratorSettings,
    connector: &dyn PlatformConnector,
) -> Result<PlatformContext> {
    let api = connector.connect_cluster(settings.kubeconfig.as_deref()).await?;

    let mesh = Arc::new(load_mesh_config(&settings.mesh_config)?);
    tracing::info!(path = %settings.mesh_config.display(), "Mesh configuration loaded");

    let descriptor = ConfigDescriptor::mesh_rules();
    api.register_kinds(&descriptor).await?;

    let mut config_sources: Vec<Arc<dyn ConfigStoreCache>> = vec![Arc::new(CrdController::new(
        Arc::clone(&api),
        descriptor,
        &settings.controller,
    ))];

    if mesh.ingress_controller_mode.is_enabled() {
        tracing::info!(
            mode = ?mesh.ingress_controller_mode,
            class = %mesh.ingress_class,
            "Ingress rules enabled"
        );
        config_sources.push(Arc::new(IngressController::new(
            Arc::clone(&api),
            Arc::clone(&mesh),
            &settings.controller,
        )));
    }

    let services = Arc::new(KubeServiceController::new(Arc::clone(&api), &settings.controller));

    Ok(PlatformContext {
        platform: Platform::Orchestrator,
        service_discovery: services.clone(),
        service_accounts: services.clone(),
        service_controller: services,
        config_sources,
        mesh,
        secret_registry: Some(Arc::new(KubeSecretRegistry::new(api))),
        registry_endpoint: None,
    })
}
