//! The environment handed to the discovery service.
//!
//! A read-only view over the platform context plus the aggregate config
//! store. Clones share the same underlying handles, and queries always go
//! through to the live store.

use std::fmt;
use std::sync::Arc;

use crate::aggregate::AggregateConfigStore;
use crate::config::MeshConfig;
use crate::error::{Error, Result};
use crate::model::{
    ConfigObject, ConfigStoreCache, SecretRegistry, ServiceAccounts, ServiceDiscovery,
    DESTINATION_POLICY, INGRESS_RULE, ROUTE_RULE,
};
use crate::platform::PlatformContext;

#[derive(Clone)]
pub struct Environment {
    pub service_discovery: Arc<dyn ServiceDiscovery>,
    pub service_accounts: Arc<dyn ServiceAccounts>,
    pub config_store: Arc<AggregateConfigStore>,
    pub mesh: Arc<MeshConfig>,
    pub secret_registry: Option<Arc<dyn SecretRegistry>>,
}

impl Environment {
    pub fn new(context: &PlatformContext, config_store: Arc<AggregateConfigStore>) -> Self {
        Self {
            service_discovery: Arc::clone(&context.service_discovery),
            service_accounts: Arc::clone(&context.service_accounts),
            config_store,
            mesh: Arc::clone(&context.mesh),
            secret_registry: context.secret_registry.clone(),
        }
    }

    /// Route rules across all namespaces.
    pub fn route_rules(&self) -> Result<Vec<ConfigObject>> {
        self.config_store.list(ROUTE_RULE.type_name, None)
    }

    pub fn destination_policies(&self) -> Result<Vec<ConfigObject>> {
        self.config_store.list(DESTINATION_POLICY.type_name, None)
    }

    /// Ingress rules, or nothing when no source synthesizes them.
    pub fn ingress_rules(&self) -> Result<Vec<ConfigObject>> {
        match self.config_store.list(INGRESS_RULE.type_name, None) {
            Err(Error::UnknownKind(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config_kinds", &self.config_store.descriptor().types())
            .field("mesh", &self.mesh)
            .field("secret_registry", &self.secret_registry.is_some())
            .finish_non_exhaustive()
    }
}
