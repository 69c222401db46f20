//! Discovery HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::DiscoveryOptions;
use crate::discovery::cache::ResponseCache;
use crate::environment::Environment;
use crate::error::Error;
use crate::model::{ConfigStoreCache, Service, ServiceInstance};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub env: Environment,
    pub cache: Arc<ResponseCache>,
    pub options: DiscoveryOptions,
}

#[derive(Debug, Deserialize)]
pub struct InstancesQuery {
    /// Comma-separated port names.
    pub ports: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstancesResponse {
    pub service: Service,
    pub instances: Vec<ServiceInstance>,
    pub service_accounts: Vec<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn json_body(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

pub async fn healthz(State(state): State<AppState>) -> Response {
    if state.env.config_store.has_synced() {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "config store not synced").into_response()
    }
}

pub async fn list_services(State(state): State<AppState>) -> Json<Vec<Service>> {
    metrics::record_discovery_request("registration", false);
    Json(state.env.service_discovery.services())
}

pub async fn service_instances(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    Query(query): Query<InstancesQuery>,
) -> Response {
    metrics::record_discovery_request("instances", false);

    let Some(service) = state.env.service_discovery.get_service(&hostname) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown service {hostname}"));
    };

    let ports: Vec<&str> = query
        .ports
        .as_deref()
        .map(|p| p.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let response = InstancesResponse {
        instances: state.env.service_discovery.instances(&hostname, &ports),
        service_accounts: state.env.service_accounts.service_accounts(&hostname, &ports),
        service,
    };
    Json(response).into_response()
}

pub async fn list_configs(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ConfigQuery>,
) -> Response {
    let namespace = query.namespace.filter(|ns| !ns.is_empty());
    let key = format!("{}?{}", kind, namespace.as_deref().unwrap_or_default());

    if let Some(body) = state.cache.get(&key) {
        metrics::record_discovery_request("config", true);
        return json_body(body);
    }
    metrics::record_discovery_request("config", false);

    let generation = state.cache.generation();
    match state.env.config_store.list(&kind, namespace.as_deref()) {
        Ok(configs) => match serde_json::to_string(&configs) {
            Ok(body) => {
                state.cache.insert_if_current(key, body.clone(), generation);
                json_body(body)
            }
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        Err(e @ Error::UnknownKind(_)) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            tracing::warn!(kind = %kind, error = %e, "Config listing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn debug_mesh(State(state): State<AppState>) -> Response {
    Json(json!({
        "mesh": &*state.env.mesh,
        "config_kinds": state.env.config_store.descriptor().types(),
        "config_synced": state.env.config_store.has_synced(),
    }))
    .into_response()
}

pub async fn debug_cache(State(state): State<AppState>) -> Response {
    Json(json!({
        "enabled": state.cache.is_enabled(),
        "entries": state.cache.len(),
        "keys": state.cache.keys(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::aggregate::AggregateConfigStore;
    use crate::config::MeshConfig;
    use crate::lifecycle::ShutdownSignal;
    use crate::model::{ConfigDescriptor, ConfigObject, EventHub, EventStream, ServiceAccounts, ServiceDiscovery, ROUTE_RULE};

    struct NoServices;

    impl ServiceDiscovery for NoServices {
        fn services(&self) -> Vec<Service> {
            Vec::new()
        }
        fn get_service(&self, _hostname: &str) -> Option<Service> {
            None
        }
        fn instances(&self, _hostname: &str, _ports: &[&str]) -> Vec<ServiceInstance> {
            Vec::new()
        }
        fn host_instances(&self, _addresses: &HashSet<String>) -> Vec<ServiceInstance> {
            Vec::new()
        }
    }

    impl ServiceAccounts for NoServices {
        fn service_accounts(&self, _hostname: &str, _ports: &[&str]) -> Vec<String> {
            Vec::new()
        }
    }

    /// Source where a write lands, and the cache is cleared, right after each listing.
    struct WriteDuringList {
        descriptor: ConfigDescriptor,
        objects: Mutex<Vec<ConfigObject>>,
        cache: Arc<ResponseCache>,
        events: EventHub,
    }

    #[async_trait]
    impl ConfigStoreCache for WriteDuringList {
        fn name(&self) -> &str {
            "write-during-list"
        }

        fn descriptor(&self) -> &ConfigDescriptor {
            &self.descriptor
        }

        fn get(&self, _kind: &str, _namespace: &str, _name: &str) -> crate::error::Result<Option<ConfigObject>> {
            Ok(None)
        }

        fn list(&self, kind: &str, _namespace: Option<&str>) -> crate::error::Result<Vec<ConfigObject>> {
            self.check_kind(kind)?;
            let mut objects = self.objects.lock().unwrap();
            let listed = objects.clone();
            let name = format!("late-{}", objects.len());
            objects.push(ConfigObject::new(&ROUTE_RULE, "default", name, serde_json::json!({})));
            self.cache.clear();
            Ok(listed)
        }

        fn events(&self) -> EventStream {
            self.events.subscribe()
        }

        fn has_synced(&self) -> bool {
            true
        }

        async fn run(&self, shutdown: ShutdownSignal) {
            shutdown.cancelled().await;
        }
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_listing_raced_by_a_write_is_not_cached() {
        let cache = Arc::new(ResponseCache::new(true));
        let source: Arc<dyn ConfigStoreCache> = Arc::new(WriteDuringList {
            descriptor: ConfigDescriptor::mesh_rules(),
            objects: Mutex::new(Vec::new()),
            cache: Arc::clone(&cache),
            events: EventHub::new(),
        });
        let services = Arc::new(NoServices);
        let state = AppState {
            env: Environment {
                service_discovery: services.clone(),
                service_accounts: services,
                config_store: Arc::new(AggregateConfigStore::new(vec![source]).unwrap()),
                mesh: Arc::new(MeshConfig::default()),
                secret_registry: None,
            },
            cache: Arc::clone(&cache),
            options: DiscoveryOptions::default(),
        };
        let query = || Query(ConfigQuery { namespace: None });

        let first = list_configs(State(state.clone()), Path("route-rule".into()), query()).await;
        assert_eq!(body(first).await, "[]");
        assert!(cache.is_empty(), "stale listing was cached");

        let second = list_configs(State(state.clone()), Path("route-rule".into()), query()).await;
        assert!(body(second).await.contains("late-0"));
    }
}
