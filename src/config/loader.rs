//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{MeshConfig, VmsFileConfig};
use crate::config::validation::validate_mesh_config;
use crate::error::{Error, Result};

fn read_error(what: &'static str, path: &Path, reason: impl ToString) -> Error {
    Error::ConfigRead {
        what,
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Load and validate the mesh configuration from a TOML file.
pub fn load_mesh_config(path: &Path) -> Result<MeshConfig> {
    const WHAT: &str = "mesh configuration";

    let content = fs::read_to_string(path).map_err(|e| read_error(WHAT, path, e))?;
    let mesh: MeshConfig = toml::from_str(&content).map_err(|e| read_error(WHAT, path, e))?;

    validate_mesh_config(&mesh).map_err(|errors| {
        let reason = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        read_error(WHAT, path, format!("validation failed: {reason}"))
    })?;

    Ok(mesh)
}

/// Load the VM registry settings file.
pub fn load_vms_config(path: &Path) -> Result<VmsFileConfig> {
    const WHAT: &str = "VMs config file";

    let content = fs::read_to_string(path).map_err(|e| read_error(WHAT, path, e))?;
    toml::from_str(&content).map_err(|e| read_error(WHAT, path, e))
}
