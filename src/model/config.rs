//! Configuration kinds, descriptors and objects.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A configuration kind, e.g. `route-rule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigKind {
    /// Unique type name used for routing and queries.
    pub type_name: &'static str,
    /// Plural form used as the resource collection name on the cluster.
    pub plural: &'static str,
    /// CamelCase kind used in custom resource definitions.
    pub kind: &'static str,
}

impl ConfigKind {
    pub const fn new(type_name: &'static str, plural: &'static str, kind: &'static str) -> Self {
        Self {
            type_name,
            plural,
            kind,
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Traffic routing rules.
pub const ROUTE_RULE: ConfigKind = ConfigKind::new("route-rule", "route-rules", "RouteRule");

/// Destination policies (load balancing, circuit breaking).
pub const DESTINATION_POLICY: ConfigKind =
    ConfigKind::new("destination-policy", "destination-policies", "DestinationPolicy");

/// Rules synthesized from ingress resources.
pub const INGRESS_RULE: ConfigKind = ConfigKind::new("ingress-rule", "ingress-rules", "IngressRule");

/// An ordered set of uniquely named configuration kinds.
///
/// Immutable once constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDescriptor {
    kinds: Vec<ConfigKind>,
}

impl ConfigDescriptor {
    /// Build a descriptor, rejecting kinds that share a type name.
    pub fn new(kinds: impl IntoIterator<Item = ConfigKind>) -> Result<Self> {
        let kinds: Vec<ConfigKind> = kinds.into_iter().collect();
        let mut seen = HashSet::with_capacity(kinds.len());
        for kind in &kinds {
            if !seen.insert(kind.type_name) {
                return Err(Error::DuplicateKind(kind.type_name.to_string()));
            }
        }
        Ok(Self { kinds })
    }

    /// Descriptor for the primary watcher: route rules and destination policies.
    pub fn mesh_rules() -> Self {
        Self {
            kinds: vec![ROUTE_RULE, DESTINATION_POLICY],
        }
    }

    /// Descriptor for the ingress-derived source.
    pub fn ingress_rules() -> Self {
        Self {
            kinds: vec![INGRESS_RULE],
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&ConfigKind> {
        self.kinds.iter().find(|k| k.type_name == type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.get(type_name).is_some()
    }

    /// Type names in declaration order.
    pub fn types(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|k| k.type_name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigKind> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Metadata shared by every configuration object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMeta {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Opaque revision marker assigned by the owning source.
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A typed, namespaced configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigObject {
    pub meta: ConfigMeta,
    pub spec: serde_json::Value,
}

impl ConfigObject {
    pub fn new(
        kind: &ConfigKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: serde_json::Value,
    ) -> Self {
        Self {
            meta: ConfigMeta {
                kind: kind.type_name.to_string(),
                namespace: namespace.into(),
                name: name.into(),
                revision: String::new(),
                labels: BTreeMap::new(),
            },
            spec,
        }
    }

    pub fn key(&self) -> ConfigKey {
        ConfigKey {
            kind: self.meta.kind.clone(),
            namespace: self.meta.namespace.clone(),
            name: self.meta.name.clone(),
        }
    }
}

/// Identity of a configuration object within a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ConfigKey {
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

/// A change notification emitted by a config source.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEvent {
    pub event: EventKind,
    pub object: ConfigObject,
}

impl ConfigEvent {
    pub fn new(event: EventKind, object: ConfigObject) -> Self {
        Self { event, object }
    }
}
