//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     PilotSettings → PlatformAdapter → PlatformContext
//!         → AggregateConfigStore → Environment → DiscoveryService (bound)
//!
//! Run (coordinator.rs):
//!     launch service controller, config store, discovery service
//!     → wait for termination → drain with grace period
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → termination future
//! ```
//!
//! # Design Decisions
//! - Ordered startup: every fatal error happens before the first task launch
//! - One shutdown signal shared by every task, closed exactly once
//! - Draining waits a bounded time; tasks are never force-killed

pub mod coordinator;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use coordinator::{Components, DrainOutcome, LifecycleCoordinator, LifecycleState};
pub use shutdown::{Shutdown, ShutdownSignal};
