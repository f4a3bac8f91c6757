//! Service configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::UpAxis;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "SCENECOMP_CONFIG";

/// Default TCP port for `tcp-serve`.
pub const DEFAULT_PORT: u16 = 9752;

/// Tunables shared by the service and the authoring operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Up axis for newly created documents.
    pub default_up_axis: UpAxis,
    /// Unit scale for newly created documents.
    pub default_meters_per_unit: f64,
    /// Container root value treated as "not overridden" by `compose_assembly`.
    pub container_root_sentinel: String,
    /// Suffix appended to the stem of flattened package siblings.
    pub flattened_suffix: String,
    /// Port for the TCP line server.
    pub tcp_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_up_axis: UpAxis::Z,
            default_meters_per_unit: 1.0,
            container_root_sentinel: "/Assets".to_string(),
            flattened_suffix: "_flat".to_string(),
            tcp_port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load from an explicit path, then `SCENECOMP_CONFIG`, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Self {
        let env_path = std::env::var(CONFIG_ENV).ok();
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| env_path.map(Into::into));

        match candidate {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_up_axis, UpAxis::Z);
        assert_eq!(config.container_root_sentinel, "/Assets");
        assert_eq!(config.tcp_port, DEFAULT_PORT);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "tcp_port": 7000, "default_up_axis": "Y" }"#).unwrap();

        let config = Config::load(&path).expect("load failed");
        assert_eq!(config.tcp_port, 7000);
        assert_eq!(config.default_up_axis, UpAxis::Y);
        assert_eq!(config.flattened_suffix, "_flat");
    }

    #[test]
    fn test_discover_missing_file() {
        let config = Config::discover(Some(Path::new("/nonexistent/scenecomp.json")));
        assert_eq!(config.default_meters_per_unit, 1.0);
    }
}
