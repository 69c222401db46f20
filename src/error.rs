//! Error taxonomy for the discovery bootstrap.
//!
//! Startup failures (`Connection`, `Registration`, `ConfigRead`,
//! `KindConflict`, `AdapterSelection`, `Discovery`) are fatal and abort before
//! any task is launched. `UnknownKind` and the store write errors are returned
//! to the caller during steady state.

use thiserror::Error;

/// Boxed error used to carry client failures from external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the bootstrap, the config stores and the platform adapters.
#[derive(Debug, Error)]
pub enum Error {
    /// The platform client could not be created or reached.
    #[error("failed to {stage}: {source}")]
    Connection {
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    /// A custom configuration kind could not be registered with the cluster.
    #[error("failed to register custom resource kind {kind}: {source}")]
    Registration {
        kind: String,
        #[source]
        source: BoxError,
    },

    /// A static configuration file was unreadable or malformed.
    #[error("failed to read {what} from {path}: {reason}")]
    ConfigRead {
        what: &'static str,
        path: String,
        reason: String,
    },

    /// Two sources registered into one aggregate claim the same kind.
    #[error("configuration kind {kind} is claimed by both {first} and {second}")]
    KindConflict {
        kind: String,
        first: String,
        second: String,
    },

    /// A query named a kind that no source owns.
    #[error("unknown configuration kind {0}")]
    UnknownKind(String),

    /// The platform tag is not one of the recognized adapters.
    #[error("unrecognized platform adapter {0:?}, options are {{Kubernetes, VMs}}")]
    AdapterSelection(String),

    /// A descriptor was built with the same kind twice.
    #[error("duplicate configuration kind {0} in descriptor")]
    DuplicateKind(String),

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// The owning source does not accept this operation (e.g. writes to a
    /// synthesized source).
    #[error("{operation} is not supported by {store}")]
    Unsupported {
        operation: &'static str,
        store: String,
    },

    /// A steady-state platform request failed.
    #[error("platform request failed: {0}")]
    Platform(#[source] BoxError),

    /// The discovery service could not bind its listener.
    #[error("failed to create discovery service: {0}")]
    Discovery(#[source] std::io::Error),
}

impl Error {
    /// Wrap a client failure as a connection error, e.g. stage `"connect to Kubernetes API"`.
    pub fn connection(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Error::Connection {
            stage,
            source: source.into(),
        }
    }

    /// Wrap a steady-state client failure.
    pub fn platform(source: impl Into<BoxError>) -> Self {
        Error::Platform(source.into())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
