//! Startup orchestration.
//!
//! Builds every component in dependency order without launching anything,
//! so a failure at any step leaves nothing to clean up.

use std::future::Future;
use std::sync::Arc;

use crate::aggregate::AggregateConfigStore;
use crate::config::PilotSettings;
use crate::discovery::DiscoveryService;
use crate::environment::Environment;
use crate::error::Result;
use crate::lifecycle::coordinator::{Components, DrainOutcome, LifecycleCoordinator};
use crate::model::Controller;
use crate::platform::{Platform, PlatformAdapter, PlatformConnector};

/// Fully built, not yet running, control plane.
pub struct Bootstrap {
    pub platform: Platform,
    pub environment: Environment,
    pub config_store: Arc<AggregateConfigStore>,
    pub service_controller: Arc<dyn Controller>,
    pub discovery: DiscoveryService,
}

impl Bootstrap {
    pub fn into_components(self) -> Components {
        Components {
            service_controller: self.service_controller,
            config_store: self.config_store,
            discovery: self.discovery,
        }
    }
}

/// Select the platform, build its context, aggregate its sources and bind discovery.
pub async fn bootstrap(settings: &PilotSettings, connector: &dyn PlatformConnector) -> Result<Bootstrap> {
    let adapter = PlatformAdapter::select(settings)?;
    let platform = adapter.platform();
    let context = adapter.build(connector).await?;
    tracing::debug!(context = ?context, "Platform context built");

    let config_store = Arc::new(AggregateConfigStore::new(context.config_sources.clone())?);
    let environment = Environment::new(&context, Arc::clone(&config_store));
    let discovery = DiscoveryService::bind(environment.clone(), settings.discovery.clone()).await?;

    tracing::info!(
        platform = %platform,
        address = %discovery.local_addr()?,
        "Bootstrap complete"
    );

    Ok(Bootstrap {
        platform,
        environment,
        config_store,
        service_controller: context.service_controller,
        discovery,
    })
}

/// Bootstrap, launch everything on `coordinator`, and block until `termination` resolves.
///
/// A bootstrap error is returned without launching any task.
pub async fn run<F>(
    coordinator: &LifecycleCoordinator,
    settings: PilotSettings,
    connector: &dyn PlatformConnector,
    termination: F,
) -> Result<DrainOutcome>
where
    F: Future<Output = ()>,
{
    let bootstrap = match bootstrap(&settings, connector).await {
        Ok(bootstrap) => bootstrap,
        Err(e) => return Err(coordinator.fail(e)),
    };

    coordinator.start(bootstrap.into_components());
    Ok(coordinator.run_until(termination).await)
}
