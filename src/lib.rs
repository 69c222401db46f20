//! Service mesh pilot.
//!
//! Selects a runtime platform, merges its configuration sources into one
//! aggregate store and serves the resulting environment to proxies.
//!
//! ```text
//!   PilotSettings ──▶ PlatformAdapter ──▶ PlatformContext
//!                                             │
//!                      ┌──────────────────────┼───────────────────────┐
//!                      ▼                      ▼                       ▼
//!              service discovery      config sources (N)        mesh config
//!                      │                      │                       │
//!                      │              AggregateConfigStore            │
//!                      │                      │                       │
//!                      └──────────────▶  Environment  ◀───────────────┘
//!                                             │
//!                                     DiscoveryService
//!
//!   LifecycleCoordinator owns the running tasks and the shutdown signal.
//! ```

pub mod aggregate;
pub mod config;
pub mod discovery;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod model;
pub mod observability;
pub mod platform;

pub use aggregate::AggregateConfigStore;
pub use environment::Environment;
pub use error::{Error, Result};
pub use lifecycle::{LifecycleCoordinator, Shutdown, ShutdownSignal};
pub use memory::MemoryConfigStore;
