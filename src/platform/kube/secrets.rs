//! TLS secrets read from the cluster.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{SecretRegistry, TlsSecret};
use crate::platform::kube::client::ClusterApi;

pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY: &str = "tls.key";

pub struct KubeSecretRegistry {
    api: Arc<dyn ClusterApi>,
}

impl KubeSecretRegistry {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }
}

/// Split `name.namespace`. Secret names may contain dots, the namespace cannot.
fn parse_uri(uri: &str) -> Option<(&str, &str)> {
    let (name, namespace) = uri.rsplit_once('.')?;
    (!name.is_empty() && !namespace.is_empty()).then_some((name, namespace))
}

#[async_trait]
impl SecretRegistry for KubeSecretRegistry {
    async fn get_tls_secret(&self, uri: &str) -> Result<Option<TlsSecret>> {
        let Some((name, namespace)) = parse_uri(uri) else {
            tracing::warn!(uri, "Malformed secret reference");
            return Ok(None);
        };

        let Some(mut data) = self.api.get_secret(namespace, name).await? else {
            return Ok(None);
        };

        match (data.remove(TLS_CERT_KEY), data.remove(TLS_PRIVATE_KEY)) {
            (Some(certificate), Some(private_key)) => Ok(Some(TlsSecret {
                certificate,
                private_key,
            })),
            _ => {
                tracing::warn!(uri, "Secret is missing {TLS_CERT_KEY} or {TLS_PRIVATE_KEY}");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        assert_eq!(parse_uri("ingress-cert.istio-system"), Some(("ingress-cert", "istio-system")));
        assert_eq!(parse_uri("wildcard.example.default"), Some(("wildcard.example", "default")));
        assert_eq!(parse_uri("nodot"), None);
        assert_eq!(parse_uri(".default"), None);
    }
}
