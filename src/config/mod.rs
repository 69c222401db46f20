//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (args.rs, clap)
//!     → PilotSettings (settings.rs, immutable, passed by value)
//!
//! mesh config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MeshConfig (validated, immutable, shared via Arc)
//! ```
//!
//! # Design Decisions
//! - Settings are frozen once at startup; no global mutable flags
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod args;
pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;

pub use schema::{AuthPolicy, IngressControllerMode, MeshConfig, VmsFileConfig};
pub use settings::{ControllerOptions, DiscoveryOptions, PilotSettings, VmsOptions};
