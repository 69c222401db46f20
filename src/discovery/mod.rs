//! Discovery service.
//!
//! # Responsibilities
//! - Serve the environment (services, instances, config) as JSON over HTTP
//! - Cache config responses and clear them on every config event
//! - Stop accepting and finish in-flight requests on shutdown
//!
//! # Routes
//! ```text
//! GET /healthz
//! GET /v1/registration
//! GET /v1/registration/{hostname}?ports=a,b
//! GET /v1/config/{kind}?namespace=ns
//! GET /debug/mesh, /debug/cache          (profiling only)
//! ```

pub mod cache;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use futures::StreamExt;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::DiscoveryOptions;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::lifecycle::ShutdownSignal;
use crate::model::{ConfigStoreCache, EventStream};
use crate::observability::metrics;

use self::cache::ResponseCache;
use self::handlers::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DiscoveryService {
    listener: TcpListener,
    router: Router,
    env: Environment,
    cache: Arc<ResponseCache>,
}

impl DiscoveryService {
    /// Bind the listener. Failure is fatal at startup.
    pub async fn bind(env: Environment, options: DiscoveryOptions) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], options.port)))
            .await
            .map_err(Error::Discovery)?;

        let cache = Arc::new(ResponseCache::new(options.enable_caching));
        let state = AppState {
            env: env.clone(),
            cache: Arc::clone(&cache),
            options,
        };
        let router = Self::build_router(state);

        Ok(Self {
            listener,
            router,
            env,
            cache,
        })
    }

    fn build_router(state: AppState) -> Router {
        let mut router = Router::new()
            .route("/healthz", get(handlers::healthz))
            .route("/v1/registration", get(handlers::list_services))
            .route("/v1/registration/{hostname}", get(handlers::service_instances))
            .route("/v1/config/{kind}", get(handlers::list_configs));

        if state.options.enable_profiling {
            router = router
                .route("/debug/mesh", get(handlers::debug_mesh))
                .route("/debug/cache", get(handlers::debug_cache));
        }

        router
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
            .layer(TraceLayer::new_for_http())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::Discovery)
    }

    /// Serve until the shutdown signal fires, then drain in-flight requests.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<()> {
        let addr = self.local_addr()?;
        let Self {
            listener,
            router,
            env,
            cache,
        } = self;
        tracing::info!(address = %addr, caching = cache.is_enabled(), "Discovery service starting");

        let invalidation = invalidate_on_events(env.config_store.events(), cache, shutdown.clone());
        let server = async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        };

        let (served, ()) = tokio::join!(server, invalidation);
        served.map_err(Error::Discovery)?;

        tracing::info!("Discovery service stopped");
        Ok(())
    }
}

async fn invalidate_on_events(mut events: EventStream, cache: Arc<ResponseCache>, shutdown: ShutdownSignal) {
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    metrics::record_config_event(&event.object.meta.kind, event.event.as_str());
                    tracing::debug!(
                        kind = %event.object.meta.kind,
                        namespace = %event.object.meta.namespace,
                        name = %event.object.meta.name,
                        event = event.event.as_str(),
                        "Config changed, clearing discovery cache"
                    );
                    cache.clear();
                }
                None => {
                    shutdown.cancelled().await;
                    break;
                }
            },
            _ = shutdown.cancelled() => break,
        }
    }
}
