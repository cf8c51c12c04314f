//! Webhook configuration
//!
//! Read once at startup from an optional file named by
//! `SCALE_WEBHOOK_CONFIG`, overlaid by un-prefixed environment variables
//! (`MIN_REPLICAS`, `NETWORKS=a,b`, ...).

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use scaler_lib::{RuntimeKind, ScalingConfig};
use serde::Deserialize;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "SCALE_WEBHOOK_CONFIG";

/// Keys whose values are comma separated lists
const LIST_KEYS: &[&str] = &["networks", "instance_labels", "compose_command"];

/// Process-level settings, separate from the scaling rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// HTTP listen port
    pub port: u16,

    /// Container runtime backing the scaler
    pub runtime: RuntimeKind,

    /// Wait before the bootstrap pass queries the runtime
    pub bootstrap_delay_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 5001,
            runtime: RuntimeKind::Docker,
            bootstrap_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub scaling: ScalingConfig,
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::build(file.as_deref(), None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_map(file: Option<&str>, vars: Map<String, String>) -> Result<Self> {
        Self::build(file, Some(vars))
    }

    fn build(file: Option<&str>, vars: Option<Map<String, String>>) -> Result<Self> {
        let mut env = Environment::default()
            .try_parsing(true)
            .list_separator(",")
            .source(vars);
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(Path::new(path)).required(true));
        }
        let config = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?;

        let server: ServerSettings = config
            .clone()
            .try_deserialize()
            .context("Invalid server settings")?;
        let mut scaling: ScalingConfig = config
            .try_deserialize()
            .context("Invalid scaling configuration")?;

        for list in [
            &mut scaling.networks,
            &mut scaling.instance_labels,
            &mut scaling.compose_command,
        ] {
            list.retain(|entry| !entry.trim().is_empty());
        }
        scaling.validate()?;

        Ok(Self { server, scaling })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_map(None, Map::new()).unwrap();

        assert_eq!(settings.server.port, 5001);
        assert_eq!(settings.server.runtime, RuntimeKind::Docker);
        assert_eq!(settings.scaling.min_replicas, 1);
        assert_eq!(settings.scaling.max_replicas, 10);
        assert_eq!(settings.scaling.service_label, "flask-app");
        assert_eq!(settings.scaling.networks, vec!["monitoring", "traefik_net"]);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_map(
            None,
            vars(&[
                ("MIN_REPLICAS", "2"),
                ("MAX_REPLICAS", "4"),
                ("SCALE_STEP", "2"),
                ("SERVICE_LABEL", "api"),
                ("NETWORKS", "backend"),
                ("COMPOSE_COMMAND", "docker,compose"),
                ("COMPOSE_ENABLED", "false"),
                ("LOW_THROUGHPUT_THRESHOLD", "250.5"),
                ("RUNTIME", "memory"),
                ("PORT", "8080"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.scaling.min_replicas, 2);
        assert_eq!(settings.scaling.max_replicas, 4);
        assert_eq!(settings.scaling.scale_step, 2);
        assert_eq!(settings.scaling.service_label, "api");
        assert_eq!(settings.scaling.networks, vec!["backend"]);
        assert_eq!(settings.scaling.compose_command, vec!["docker", "compose"]);
        assert!(!settings.scaling.compose_enabled);
        assert_eq!(settings.scaling.low_throughput_threshold, 250.5);
        assert_eq!(settings.server.runtime, RuntimeKind::Memory);
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn test_blank_label_list() {
        let settings = Settings::from_map(None, vars(&[("INSTANCE_LABELS", "")])).unwrap();
        assert!(settings.scaling.instance_labels.is_empty());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let result = Settings::from_map(
            None,
            vars(&[("MIN_REPLICAS", "5"), ("MAX_REPLICAS", "2")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"min_replicas": 2, "max_replicas": 6, "image_fallback": "registry/app:2"}}"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let settings = Settings::from_map(Some(&path), vars(&[("MAX_REPLICAS", "8")])).unwrap();

        assert_eq!(settings.scaling.min_replicas, 2);
        assert_eq!(settings.scaling.max_replicas, 8);
        assert_eq!(settings.scaling.image_fallback, "registry/app:2");
    }
}
