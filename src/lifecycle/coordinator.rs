//! Lifecycle state machine for the running control plane.
//!
//! ```text
//! Idle → Starting → Running → Draining → Stopped
//!   └──────── bootstrap failure ─────────────┘
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::task::TaskTracker;

use crate::aggregate::AggregateConfigStore;
use crate::discovery::DiscoveryService;
use crate::error::Error;
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::model::{ConfigStoreCache, Controller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How the drain phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every task returned within the grace period.
    Completed,
    /// The grace period elapsed with tasks still running.
    TimedOut { pending: usize },
}

/// The three long-running parts launched by [`LifecycleCoordinator::start`].
pub struct Components {
    pub service_controller: Arc<dyn Controller>,
    pub config_store: Arc<AggregateConfigStore>,
    pub discovery: DiscoveryService,
}

/// Launches tracked tasks on one shared shutdown signal and drains them.
pub struct LifecycleCoordinator {
    shutdown: Shutdown,
    tasks: TaskTracker,
    state: watch::Sender<LifecycleState>,
    grace: Duration,
}

impl LifecycleCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            shutdown: Shutdown::new(),
            tasks: TaskTracker::new(),
            state,
            grace,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Handle for whatever delivers termination requests.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Number of launched tasks that have not returned yet.
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::info!(from = %previous, to = %next, "Lifecycle transition");
    }

    /// Record a bootstrap failure. Nothing was launched, so go straight to `Stopped`.
    pub fn fail(&self, error: Error) -> Error {
        tracing::error!(error = %error, "Startup failed");
        self.transition(LifecycleState::Stopped);
        error
    }

    /// Spawn a tracked task bound to the shared shutdown signal.
    pub fn launch<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = task(self.shutdown.subscribe());
        self.tasks.spawn(async move {
            tracing::debug!(task = name, "Task started");
            fut.await;
            tracing::info!(task = name, "Task stopped");
        });
    }

    /// Launch the service controller, the config store and the discovery service.
    ///
    /// Returns once all three are spawned; they keep running in the background.
    pub fn start(&self, components: Components) {
        self.transition(LifecycleState::Starting);

        let Components {
            service_controller,
            config_store,
            discovery,
        } = components;

        self.launch("service-controller", move |signal| async move {
            service_controller.run(signal).await;
        });

        self.launch("config-store", move |signal| async move {
            config_store.run(signal).await;
            config_store.wait_drained().await;
        });

        self.launch("discovery-service", move |signal| async move {
            if let Err(e) = discovery.run(signal).await {
                tracing::error!(error = %e, "Discovery service exited with error");
            }
        });

        self.transition(LifecycleState::Running);
    }

    /// Block until `termination` resolves or shutdown is triggered elsewhere, then drain.
    pub async fn run_until<F>(&self, termination: F) -> DrainOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = termination => tracing::info!("Termination requested"),
            _ = self.shutdown.triggered() => tracing::info!("Shutdown triggered"),
        }
        self.drain().await
    }

    /// Close the shutdown signal and wait up to the grace period for all tasks.
    ///
    /// Safe to call more than once; the signal is only closed the first time.
    pub async fn drain(&self) -> DrainOutcome {
        if self.state() == LifecycleState::Stopped {
            return DrainOutcome::Completed;
        }
        self.transition(LifecycleState::Draining);
        self.shutdown.trigger();
        self.tasks.close();

        let outcome = match tokio::time::timeout(self.grace, self.tasks.wait()).await {
            Ok(()) => DrainOutcome::Completed,
            Err(_) => {
                let pending = self.tasks.len();
                tracing::warn!(
                    pending,
                    grace_secs = self.grace.as_secs_f64(),
                    "Grace period elapsed with tasks still running"
                );
                DrainOutcome::TimedOut { pending }
            }
        };

        self.transition(LifecycleState::Stopped);
        outcome
    }
}
