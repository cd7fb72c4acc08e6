//! Configuration file resolution
//!
//! Locates per-service TOML configuration following the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`~/.config/wfsh/<service>.toml`,
//!    then `/etc/wfsh/<service>.toml` on Linux)

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolve the configuration file path for a service.
///
/// Returns `Ok(None)` when no argument, variable, or platform file exists;
/// the service then runs on built-in defaults.
pub fn resolve_config_path(
    cli_arg: Option<&str>,
    env_var_name: &str,
    service: &str,
) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    // Priority 3: Platform config directory
    Ok(locate_platform_config(service))
}

/// Look up `<service>.toml` in the platform config locations.
fn locate_platform_config(service: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", service);

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("wfsh").join(&file_name)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/wfsh").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and parse a TOML config file into the given type.
pub fn read_toml<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}
