//! VM service registry client.
//!
//! The registry exposes its instance list as JSON at `GET /api/v1/instances`,
//! optionally protected by a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::loader::load_vms_config;
use crate::config::VmsOptions;
use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:8080";
const CONNECT_STAGE: &str = "create VMs client";
const INSTANCES_PATH: &str = "api/v1/instances";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    pub url: String,
    pub token: Option<String>,
    pub poll_interval: Duration,
}

impl RegistryEndpoint {
    /// Resolve with precedence: command line flag, then settings file, then default.
    pub fn resolve(options: &VmsOptions, default_poll: Duration) -> Result<Self> {
        let file = options
            .config_file
            .as_deref()
            .map(load_vms_config)
            .transpose()?
            .unwrap_or_default();

        let url = options
            .server_url
            .clone()
            .or(file.registry.url)
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string());
        let token = options.auth_token.clone().or(file.registry.token);
        let poll_interval = file
            .registry
            .poll_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(default_poll);

        Ok(Self {
            url,
            token,
            poll_interval,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEndpoint {
    /// Transport tag, e.g. `http` or `tcp`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `host:port`
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInstance {
    #[serde(default)]
    pub id: String,
    pub service_name: String,
    pub endpoint: InstanceEndpoint,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    #[serde(default)]
    instances: Vec<RegistryInstance>,
}

/// Read access to the VM registry.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    fn endpoint(&self) -> &RegistryEndpoint;

    async fn list_instances(&self) -> Result<Vec<RegistryInstance>>;
}

pub struct HttpRegistryClient {
    endpoint: RegistryEndpoint,
    instances_url: Url,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new(endpoint: RegistryEndpoint) -> Result<Self> {
        let mut base = Url::parse(&endpoint.url).map_err(|e| Error::connection(CONNECT_STAGE, e))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let instances_url = base
            .join(INSTANCES_PATH)
            .map_err(|e| Error::connection(CONNECT_STAGE, e))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::connection(CONNECT_STAGE, e))?;

        tracing::info!(url = %instances_url, authenticated = endpoint.token.is_some(), "VMs registry client created");

        Ok(Self {
            endpoint,
            instances_url,
            http,
        })
    }

    pub fn instances_url(&self) -> &Url {
        &self.instances_url
    }
}

#[async_trait]
impl RegistryApi for HttpRegistryClient {
    fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }

    async fn list_instances(&self) -> Result<Vec<RegistryInstance>> {
        let mut request = self.http.get(self.instances_url.clone());
        if let Some(token) = &self.endpoint.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Error::platform)?;
        let body: InstancesResponse = response.json().await.map_err(Error::platform)?;
        Ok(body.instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLL: Duration = Duration::from_secs(1);

    #[test]
    fn test_default_endpoint() {
        let endpoint = RegistryEndpoint::resolve(&VmsOptions::default(), POLL).unwrap();
        assert_eq!(endpoint.url, DEFAULT_REGISTRY_URL);
        assert_eq!(endpoint.token, None);
        assert_eq!(endpoint.poll_interval, POLL);
    }

    #[test]
    fn test_file_then_flag_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[registry]\nurl = \"http://from-file:9000\"\ntoken = \"file-token\"\npoll_secs = 5"
        )
        .unwrap();

        let from_file = VmsOptions {
            config_file: Some(file.path().to_path_buf()),
            ..VmsOptions::default()
        };
        let endpoint = RegistryEndpoint::resolve(&from_file, POLL).unwrap();
        assert_eq!(endpoint.url, "http://from-file:9000");
        assert_eq!(endpoint.token.as_deref(), Some("file-token"));
        assert_eq!(endpoint.poll_interval, Duration::from_secs(5));

        let flags_win = VmsOptions {
            server_url: Some("http://from-flag:9001".into()),
            auth_token: Some("flag-token".into()),
            ..from_file
        };
        let endpoint = RegistryEndpoint::resolve(&flags_win, POLL).unwrap();
        assert_eq!(endpoint.url, "http://from-flag:9001");
        assert_eq!(endpoint.token.as_deref(), Some("flag-token"));
    }

    #[test]
    fn test_unreadable_file_is_config_read_error() {
        let options = VmsOptions {
            config_file: Some("/nonexistent/vms.toml".into()),
            ..VmsOptions::default()
        };
        let err = RegistryEndpoint::resolve(&options, POLL).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_client_url_handling() {
        let client = HttpRegistryClient::new(RegistryEndpoint {
            url: "http://registry:8080/amalgam8".into(),
            token: None,
            poll_interval: POLL,
        })
        .unwrap();
        assert_eq!(
            client.instances_url().as_str(),
            "http://registry:8080/amalgam8/api/v1/instances"
        );

        let err = HttpRegistryClient::new(RegistryEndpoint {
            url: "not a url".into(),
            token: None,
            poll_interval: POLL,
        })
        .err()
        .unwrap();
        assert!(err.to_string().starts_with("failed to create VMs client"));
    }

    #[test]
    fn test_instance_json() {
        let body = r#"{"instances":[{"id":"a1","service_name":"reviews",
            "endpoint":{"type":"http","value":"10.0.0.1:9080"},"tags":["v1"],"status":"UP"}]}"#;
        let parsed: InstancesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.instances.len(), 1);
        assert_eq!(parsed.instances[0].endpoint.kind, "http");
    }
}
