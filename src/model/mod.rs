//! Core model shared by config sources, platform adapters and the discovery service.
//!
//! # Data Flow
//! ```text
//! platform clients
//!     → ConfigStoreCache sources (config.rs objects, store.rs contract)
//!     → aggregate store
//!     → Environment
//!
//! platform registries
//!     → ServiceDiscovery / ServiceAccounts (service.rs)
//!     → Environment
//! ```

pub mod config;
pub mod service;
pub mod snapshot;
pub mod store;

pub use config::{
    ConfigDescriptor, ConfigEvent, ConfigKey, ConfigKind, ConfigMeta, ConfigObject, EventKind,
    DESTINATION_POLICY, INGRESS_RULE, ROUTE_RULE,
};
pub use service::{
    Controller, NetworkEndpoint, Port, Protocol, SecretRegistry, Service, ServiceAccounts,
    ServiceDiscovery, ServiceInstance, TlsSecret,
};
pub use snapshot::SnapshotCache;
pub use store::{ConfigStoreCache, EventHub, EventStream};
