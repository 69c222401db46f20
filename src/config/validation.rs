//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MeshConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::MeshConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Semantic checks on a parsed mesh configuration.
pub fn validate_mesh_config(mesh: &MeshConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(reason) = validate_host_port(&mesh.discovery_address) {
        errors.push(ValidationError::new("discovery_address", reason));
    }
    for (field, value) in [
        ("egress_proxy_address", &mesh.egress_proxy_address),
        ("mixer_address", &mesh.mixer_address),
        ("zipkin_address", &mesh.zipkin_address),
    ] {
        if !value.is_empty() {
            if let Err(reason) = validate_host_port(value) {
                errors.push(ValidationError::new(field, reason));
            }
        }
    }

    if mesh.proxy_listen_port == 0 {
        errors.push(ValidationError::new("proxy_listen_port", "must be non-zero"));
    }
    if mesh.proxy_admin_port == 0 {
        errors.push(ValidationError::new("proxy_admin_port", "must be non-zero"));
    }
    if mesh.proxy_listen_port != 0 && mesh.proxy_listen_port == mesh.proxy_admin_port {
        errors.push(ValidationError::new(
            "proxy_admin_port",
            "must differ from proxy_listen_port",
        ));
    }

    if mesh.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("connect_timeout_secs", "must be positive"));
    }
    if mesh.discovery_refresh_delay_secs == 0 {
        errors.push(ValidationError::new(
            "discovery_refresh_delay_secs",
            "must be positive",
        ));
    }

    if mesh.istio_service_cluster.is_empty() {
        errors.push(ValidationError::new("istio_service_cluster", "must not be empty"));
    }

    if mesh.ingress_controller_mode.is_enabled() {
        if mesh.ingress_class.is_empty() {
            errors.push(ValidationError::new(
                "ingress_class",
                "required when ingress_controller_mode is enabled",
            ));
        }
        if mesh.ingress_service.is_empty() {
            errors.push(ValidationError::new(
                "ingress_service",
                "required when ingress_controller_mode is enabled",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_host_port(value: &str) -> Result<(), String> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("{value:?} is not host:port"))?;
    if host.is_empty() {
        return Err(format!("{value:?} has an empty host"));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(format!("{value:?} has an invalid port")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::IngressControllerMode;

    #[test]
    fn test_default_mesh_is_valid() {
        assert_eq!(validate_mesh_config(&MeshConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mesh = MeshConfig {
            discovery_address: "pilot".to_string(),
            mixer_address: "mixer:notaport".to_string(),
            proxy_listen_port: 15000,
            connect_timeout_secs: 0,
            ..MeshConfig::default()
        };
        let errors = validate_mesh_config(&mesh).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["discovery_address", "mixer_address", "proxy_admin_port", "connect_timeout_secs"]
        );
    }

    #[test]
    fn test_ingress_requires_class() {
        let mesh = MeshConfig {
            ingress_controller_mode: IngressControllerMode::Default,
            ingress_class: String::new(),
            ..MeshConfig::default()
        };
        let errors = validate_mesh_config(&mesh).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "ingress_class");
    }

    #[test]
    fn test_host_port() {
        assert!(validate_host_port("istio-pilot:8080").is_ok());
        assert!(validate_host_port("[::1]:8080").is_ok());
        assert!(validate_host_port(":8080").is_err());
        assert!(validate_host_port("pilot:0").is_err());
    }
}
