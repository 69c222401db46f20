//! Shutdown coordination for the control plane.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Owner of the process-wide shutdown signal.
///
/// All long-running tasks hold a [`ShutdownSignal`] obtained from
/// [`Shutdown::subscribe`]. Only the owner can trigger it, and it fires once.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the shutdown signal.
    ///
    /// Subscribers created after the trigger observe it immediately.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.token.clone(),
        }
    }

    /// Trigger the shutdown signal.
    ///
    /// Returns true only for the call that actually closed the signal; repeat
    /// calls have no further effect.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::info!("Shutdown signal triggered");
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolve once the signal has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

/// Read-only view of the shutdown signal handed to tasks.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
