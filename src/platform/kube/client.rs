//! Kubernetes API client.
//!
//! # Responsibilities
//! - Connect to the API server (kubeconfig file or in-cluster)
//! - Register custom resource definitions for config kinds
//! - List/create/update/delete config custom resources
//! - List ingresses, services (with endpoints and pods) and secrets
//!
//! The rest of the platform adapter only sees the [`ClusterApi`] trait.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Resource};

use crate::error::{Error, Result};
use crate::model::{ConfigDescriptor, ConfigKind, ConfigObject};
use crate::platform::kube::crd::{api_resource, config_from_dynamic, config_to_dynamic, crd_manifest};

const CONNECT_STAGE: &str = "connect to Kubernetes API";

/// Port of a cluster service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterServicePort {
    pub name: String,
    pub port: u16,
    pub protocol: Option<String>,
}

/// A ready endpoint backing a cluster service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub address: String,
    pub port: u16,
    pub port_name: String,
    pub labels: BTreeMap<String, String>,
    pub service_account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterService {
    pub name: String,
    pub namespace: String,
    pub cluster_ip: Option<String>,
    pub external_name: Option<String>,
    pub ports: Vec<ClusterServicePort>,
    pub annotations: BTreeMap<String, String>,
    pub endpoints: Vec<ClusterEndpoint>,
}

/// Backend port of an ingress path, by number or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendPort {
    Number(u16),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIngressPath {
    pub host: Option<String>,
    pub path: Option<String>,
    pub path_type: Option<String>,
    pub service: String,
    pub port: Option<BackendPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIngress {
    pub name: String,
    pub namespace: String,
    pub revision: String,
    pub class: Option<String>,
    pub paths: Vec<ClusterIngressPath>,
}

/// Raw cluster primitives needed by the orchestrator platform.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Register the kinds as custom resources. Already-registered kinds are not an error.
    async fn register_kinds(&self, descriptor: &ConfigDescriptor) -> Result<()>;

    async fn list_configs(&self, kind: &ConfigKind, namespace: Option<&str>) -> Result<Vec<ConfigObject>>;

    async fn create_config(&self, kind: &ConfigKind, object: &ConfigObject) -> Result<String>;

    async fn update_config(&self, kind: &ConfigKind, object: &ConfigObject) -> Result<String>;

    async fn delete_config(&self, kind: &ConfigKind, namespace: &str, name: &str) -> Result<()>;

    async fn list_ingresses(&self, namespace: Option<&str>) -> Result<Vec<ClusterIngress>>;

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<ClusterService>>;

    /// Secret data by key, or `None` if the secret does not exist.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, Vec<u8>>>>;
}

/// [`ClusterApi`] backed by a kube client.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Connect using a kubeconfig file, or in-cluster/default configuration when `None`.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| Error::connection(CONNECT_STAGE, e))?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| Error::connection(CONNECT_STAGE, e))?;
                Client::try_from(config).map_err(|e| Error::connection(CONNECT_STAGE, e))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| Error::connection(CONNECT_STAGE, e))?,
        };

        let version = client
            .apiserver_version()
            .await
            .map_err(|e| Error::connection(CONNECT_STAGE, e))?;
        tracing::info!(version = %version.git_version, "Connected to Kubernetes API");

        Ok(Self { client })
    }

    fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn configs(&self, kind: &ConfigKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = api_resource(kind);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn write_error(error: kube::Error, object: &ConfigObject) -> Error {
    match error {
        kube::Error::Api(ref response) if response.code == 409 => Error::AlreadyExists {
            kind: object.meta.kind.clone(),
            namespace: object.meta.namespace.clone(),
            name: object.meta.name.clone(),
        },
        kube::Error::Api(ref response) if response.code == 404 => Error::NotFound {
            kind: object.meta.kind.clone(),
            namespace: object.meta.namespace.clone(),
            name: object.meta.name.clone(),
        },
        other => Error::platform(other),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn register_kinds(&self, descriptor: &ConfigDescriptor) -> Result<()> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        for kind in descriptor.iter() {
            let registration_error = |source: crate::error::BoxError| Error::Registration {
                kind: kind.type_name.to_string(),
                source,
            };
            let crd = crd_manifest(kind).map_err(|e| registration_error(e.into()))?;
            match api.create(&PostParams::default(), &crd).await {
                Ok(_) => tracing::info!(kind = %kind, "Registered custom resource definition"),
                Err(kube::Error::Api(response)) if response.code == 409 => {
                    tracing::debug!(kind = %kind, "Custom resource definition already registered")
                }
                Err(e) => return Err(registration_error(e.into())),
            }
        }
        Ok(())
    }

    async fn list_configs(&self, kind: &ConfigKind, namespace: Option<&str>) -> Result<Vec<ConfigObject>> {
        let list = self
            .configs(kind, namespace)
            .list(&ListParams::default())
            .await
            .map_err(Error::platform)?;
        Ok(list
            .items
            .into_iter()
            .map(|obj| config_from_dynamic(kind, obj))
            .collect())
    }

    async fn create_config(&self, kind: &ConfigKind, object: &ConfigObject) -> Result<String> {
        let created = self
            .configs(kind, Some(&object.meta.namespace))
            .create(&PostParams::default(), &config_to_dynamic(kind, object))
            .await
            .map_err(|e| write_error(e, object))?;
        Ok(created.metadata.resource_version.unwrap_or_default())
    }

    async fn update_config(&self, kind: &ConfigKind, object: &ConfigObject) -> Result<String> {
        let updated = self
            .configs(kind, Some(&object.meta.namespace))
            .replace(&object.meta.name, &PostParams::default(), &config_to_dynamic(kind, object))
            .await
            .map_err(|e| write_error(e, object))?;
        Ok(updated.metadata.resource_version.unwrap_or_default())
    }

    async fn delete_config(&self, kind: &ConfigKind, namespace: &str, name: &str) -> Result<()> {
        let target = ConfigObject::new(kind, namespace, name, serde_json::Value::Null);
        self.configs(kind, Some(namespace))
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| write_error(e, &target))?;
        Ok(())
    }

    async fn list_ingresses(&self, namespace: Option<&str>) -> Result<Vec<ClusterIngress>> {
        let list = self
            .scoped::<Ingress>(namespace)
            .list(&ListParams::default())
            .await
            .map_err(Error::platform)?;
        Ok(list.items.into_iter().map(ingress_from_k8s).collect())
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<ClusterService>> {
        let params = ListParams::default();
        let services = self
            .scoped::<Service>(namespace)
            .list(&params)
            .await
            .map_err(Error::platform)?;
        let endpoints = self
            .scoped::<Endpoints>(namespace)
            .list(&params)
            .await
            .map_err(Error::platform)?;
        let pods = self
            .scoped::<Pod>(namespace)
            .list(&params)
            .await
            .map_err(Error::platform)?;
        Ok(services_from_k8s(services.items, endpoints.items, pods.items))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        let secret = Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(Error::platform)?;
        Ok(secret.map(|s| {
            s.data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect()
        }))
    }
}

const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

fn backend_path(
    host: Option<String>,
    path: Option<String>,
    path_type: Option<String>,
    backend: IngressBackend,
) -> Option<ClusterIngressPath> {
    let service = backend.service?;
    let port = service.port.and_then(|p| match (p.number, p.name) {
        (Some(number), _) => u16::try_from(number).ok().map(BackendPort::Number),
        (None, Some(name)) => Some(BackendPort::Name(name)),
        (None, None) => None,
    });
    Some(ClusterIngressPath {
        host,
        path,
        path_type,
        service: service.name,
        port,
    })
}

/// Flatten an ingress into host/path → backend entries.
pub(crate) fn ingress_from_k8s(ingress: Ingress) -> ClusterIngress {
    let meta = ingress.metadata;
    let spec = ingress.spec.unwrap_or_default();

    let class = spec.ingress_class_name.or_else(|| {
        meta.annotations
            .as_ref()
            .and_then(|a| a.get(INGRESS_CLASS_ANNOTATION).cloned())
    });

    let mut paths = Vec::new();
    for rule in spec.rules.unwrap_or_default() {
        let Some(http) = rule.http else { continue };
        for path in http.paths {
            if let Some(entry) = backend_path(
                rule.host.clone(),
                path.path,
                Some(path.path_type),
                path.backend,
            ) {
                paths.push(entry);
            }
        }
    }
    if let Some(backend) = spec.default_backend {
        paths.extend(backend_path(None, None, None, backend));
    }

    ClusterIngress {
        name: meta.name.unwrap_or_default(),
        namespace: meta.namespace.unwrap_or_default(),
        revision: meta.resource_version.unwrap_or_default(),
        class,
        paths,
    }
}

/// Join services with their ready endpoints and the labels of the backing pods.
pub(crate) fn services_from_k8s(
    services: Vec<Service>,
    endpoints: Vec<Endpoints>,
    pods: Vec<Pod>,
) -> Vec<ClusterService> {
    let pods: BTreeMap<(String, String), Pod> = pods
        .into_iter()
        .filter_map(|pod| {
            let key = (pod.metadata.namespace.clone()?, pod.metadata.name.clone()?);
            Some((key, pod))
        })
        .collect();

    let mut by_service: BTreeMap<(String, String), Vec<ClusterEndpoint>> = BTreeMap::new();
    for ep in endpoints {
        let (Some(namespace), Some(name)) = (ep.metadata.namespace, ep.metadata.name) else {
            continue;
        };
        let entry = by_service.entry((namespace.clone(), name)).or_default();
        for subset in ep.subsets.unwrap_or_default() {
            let ports = subset.ports.unwrap_or_default();
            for address in subset.addresses.unwrap_or_default() {
                let pod = address
                    .target_ref
                    .as_ref()
                    .and_then(|r| r.name.clone())
                    .and_then(|pod_name| pods.get(&(namespace.clone(), pod_name)));
                let labels = pod
                    .and_then(|p| p.metadata.labels.clone())
                    .unwrap_or_default();
                let service_account = pod
                    .and_then(|p| p.spec.as_ref())
                    .and_then(|s| s.service_account_name.clone());

                for port in &ports {
                    let Ok(port_number) = u16::try_from(port.port) else { continue };
                    entry.push(ClusterEndpoint {
                        address: address.ip.clone(),
                        port: port_number,
                        port_name: port.name.clone().unwrap_or_default(),
                        labels: labels.clone(),
                        service_account: service_account.clone(),
                    });
                }
            }
        }
    }

    services
        .into_iter()
        .filter_map(|svc| {
            let namespace = svc.metadata.namespace?;
            let name = svc.metadata.name?;
            let spec = svc.spec.unwrap_or_default();
            let ports = spec
                .ports
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| {
                    Some(ClusterServicePort {
                        name: p.name.unwrap_or_default(),
                        port: u16::try_from(p.port).ok()?,
                        protocol: p.protocol,
                    })
                })
                .collect();
            let endpoints = by_service
                .remove(&(namespace.clone(), name.clone()))
                .unwrap_or_default();
            Some(ClusterService {
                name,
                namespace,
                cluster_ip: spec.cluster_ip.filter(|ip| !ip.is_empty() && ip != "None"),
                external_name: spec.external_name,
                ports,
                annotations: svc.metadata.annotations.unwrap_or_default(),
                endpoints,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        EndpointAddress, EndpointPort, EndpointSubset, ObjectReference, PodSpec, ServicePort,
        ServiceSpec,
    };
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressRule, IngressServiceBackend, IngressSpec,
        ServiceBackendPort,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn meta(namespace: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn service_backend(name: &str, port: i32) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: name.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(port),
                    name: None,
                }),
            }),
            resource: None,
        }
    }

    #[test]
    fn test_ingress_flattening() {
        let mut ingress_meta = meta("default", "web");
        ingress_meta.annotations = Some(
            [(INGRESS_CLASS_ANNOTATION.to_string(), "istio".to_string())]
                .into_iter()
                .collect(),
        );
        let ingress = Ingress {
            metadata: ingress_meta,
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some("example.com".into()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![
                            HTTPIngressPath {
                                path: Some("/api".into()),
                                path_type: "Prefix".into(),
                                backend: service_backend("api", 8080),
                            },
                            HTTPIngressPath {
                                path: Some("/".into()),
                                path_type: "Exact".into(),
                                backend: service_backend("frontend", 80),
                            },
                        ],
                    }),
                }]),
                default_backend: Some(service_backend("fallback", 80)),
                ..Default::default()
            }),
            ..Default::default()
        };

        let flat = ingress_from_k8s(ingress);
        assert_eq!(flat.class.as_deref(), Some("istio"));
        assert_eq!(flat.paths.len(), 3);
        assert_eq!(flat.paths[0].service, "api");
        assert_eq!(flat.paths[0].port, Some(BackendPort::Number(8080)));
        assert_eq!(flat.paths[0].host.as_deref(), Some("example.com"));
        assert_eq!(flat.paths[2].service, "fallback");
        assert_eq!(flat.paths[2].host, None);
    }

    #[test]
    fn test_services_joined_with_endpoints_and_pods() {
        let service = Service {
            metadata: meta("default", "reviews"),
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.96.0.10".into()),
                ports: Some(vec![ServicePort {
                    name: Some("http".into()),
                    port: 9080,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let endpoints = Endpoints {
            metadata: meta("default", "reviews"),
            subsets: Some(vec![EndpointSubset {
                addresses: Some(vec![EndpointAddress {
                    ip: "172.17.0.5".into(),
                    target_ref: Some(ObjectReference {
                        name: Some("reviews-v1-abc".into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ports: Some(vec![EndpointPort {
                    name: Some("http".into()),
                    port: 9080,
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
        };
        let mut pod_meta = meta("default", "reviews-v1-abc");
        pod_meta.labels = Some([("version".to_string(), "v1".to_string())].into_iter().collect());
        let pod = Pod {
            metadata: pod_meta,
            spec: Some(PodSpec {
                service_account_name: Some("bookinfo-reviews".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let services = services_from_k8s(vec![service], vec![endpoints], vec![pod]);
        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.cluster_ip.as_deref(), Some("10.96.0.10"));
        assert_eq!(svc.endpoints.len(), 1);
        let ep = &svc.endpoints[0];
        assert_eq!(ep.address, "172.17.0.5");
        assert_eq!(ep.port_name, "http");
        assert_eq!(ep.labels.get("version").map(String::as_str), Some("v1"));
        assert_eq!(ep.service_account.as_deref(), Some("bookinfo-reviews"));
    }

    #[test]
    fn test_headless_service_has_no_address() {
        let service = Service {
            metadata: meta("default", "db"),
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let services = services_from_k8s(vec![service], vec![], vec![]);
        assert_eq!(services[0].cluster_ip, None);
        assert!(services[0].endpoints.is_empty());
    }
}
