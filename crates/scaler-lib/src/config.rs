//! Scaling configuration
//!
//! Process-wide, immutable after startup. The webhook binary deserializes
//! it from the environment; tests build it directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ScalerError};
use crate::policy::ScaleBounds;

/// Standalone compose binary used unless configured otherwise
pub const DEFAULT_COMPOSE_PROGRAM: &str = "docker-compose";

/// Scaling configuration for the managed service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Compose service name, also the value of the identity labels
    pub service_label: String,

    /// Lower bound on the replica count
    pub min_replicas: u32,

    /// Upper bound on the replica count
    pub max_replicas: u32,

    /// Replicas added or removed per alert
    pub scale_step: u32,

    /// Host path bind-mounted into every replica
    pub data_volume_host: String,

    /// Mount point of the shared storage inside the replica
    pub data_volume_container: String,

    /// Environment variable telling the workload where to persist records
    pub storage_env_var: String,

    /// File name appended to the container storage path
    pub storage_file_name: String,

    /// Image used when no replica is running to copy the image from
    pub image_fallback: String,

    /// Networks to attach; the first one is used at creation time
    pub networks: Vec<String>,

    /// Extra `key=value` labels put on imperatively created replicas
    pub instance_labels: Vec<String>,

    /// Measured value below which the last replica is kept on scale-down
    pub low_throughput_threshold: f64,

    /// Grace period given to a replica before it is killed
    pub stop_grace_secs: u64,

    /// Whether the declarative compose path is attempted at all
    pub compose_enabled: bool,

    /// Command words used to invoke compose (e.g. `docker,compose`).
    /// The default falls back to the `docker compose` plugin when the
    /// standalone binary is not installed.
    pub compose_command: Vec<String>,

    /// Working directory for compose; defaults to the process cwd
    pub compose_project_dir: Option<PathBuf>,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            service_label: "flask-app".to_string(),
            min_replicas: 1,
            max_replicas: 10,
            scale_step: 1,
            data_volume_host: "/srv/scale-webhook/data".to_string(),
            data_volume_container: "/data".to_string(),
            storage_env_var: "FILES_STORAGE_PATH".to_string(),
            storage_file_name: "files.json".to_string(),
            image_fallback: "projeto_flask-app:latest".to_string(),
            networks: vec!["monitoring".to_string(), "traefik_net".to_string()],
            instance_labels: default_instance_labels(),
            low_throughput_threshold: 500.0,
            stop_grace_secs: 5,
            compose_enabled: true,
            compose_command: vec![DEFAULT_COMPOSE_PROGRAM.to_string()],
            compose_project_dir: None,
        }
    }
}

fn default_instance_labels() -> Vec<String> {
    vec![
        "traefik.enable=true".to_string(),
        "traefik.http.routers.flask.rule=Host(`localhost`)".to_string(),
        "traefik.http.routers.flask.entrypoints=web".to_string(),
        "traefik.http.services.flask.loadbalancer.server.port=8000".to_string(),
    ]
}

impl ScalingConfig {
    /// Check invariants that the rest of the scaler relies on
    pub fn validate(&self) -> Result<()> {
        if self.service_label.trim().is_empty() {
            return Err(ScalerError::Config("service_label must not be empty".into()));
        }
        if self.min_replicas > self.max_replicas {
            return Err(ScalerError::Config(format!(
                "min_replicas ({}) exceeds max_replicas ({})",
                self.min_replicas, self.max_replicas
            )));
        }
        if self.scale_step == 0 {
            return Err(ScalerError::Config("scale_step must be at least 1".into()));
        }
        if self.networks.is_empty() {
            return Err(ScalerError::Config("at least one network is required".into()));
        }
        if self.compose_enabled && self.compose_command.is_empty() {
            return Err(ScalerError::Config(
                "compose_command must not be empty when compose is enabled".into(),
            ));
        }
        self.extra_labels()?;
        Ok(())
    }

    /// Bounds handed to the decision policy
    pub fn bounds(&self) -> ScaleBounds {
        ScaleBounds {
            min: self.min_replicas,
            max: self.max_replicas,
            step: self.scale_step,
            low_throughput_threshold: self.low_throughput_threshold,
        }
    }

    /// Value of the storage environment variable given to replicas
    pub fn storage_path(&self) -> String {
        format!(
            "{}/{}",
            self.data_volume_container.trim_end_matches('/'),
            self.storage_file_name
        )
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Parse `instance_labels` into a map
    pub fn extra_labels(&self) -> Result<HashMap<String, String>> {
        self.instance_labels
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.to_string()))
                }
                _ => Err(ScalerError::Config(format!(
                    "instance label '{}' is not of the form key=value",
                    entry
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScalingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage_path(), "/data/files.json");
        assert_eq!(config.stop_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_min_above_max_rejected() {
        let config = ScalingConfig {
            min_replicas: 4,
            max_replicas: 3,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds max_replicas"));
    }

    #[test]
    fn test_zero_step_rejected() {
        let config = ScalingConfig {
            scale_step: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_networks_rejected() {
        let config = ScalingConfig {
            networks: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extra_labels_parsing() {
        let config = ScalingConfig::default();
        let labels = config.extra_labels().unwrap();
        assert_eq!(labels.get("traefik.enable").unwrap(), "true");
        assert_eq!(
            labels.get("traefik.http.routers.flask.rule").unwrap(),
            "Host(`localhost`)"
        );

        let bad = ScalingConfig {
            instance_labels: vec!["no-separator".to_string()],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_storage_path_trims_trailing_slash() {
        let config = ScalingConfig {
            data_volume_container: "/mnt/nfs/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.storage_path(), "/mnt/nfs/files.json");
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: ScalingConfig =
            serde_json::from_str(r#"{"min_replicas": 2, "max_replicas": 4}"#).unwrap();
        assert_eq!(config.min_replicas, 2);
        assert_eq!(config.max_replicas, 4);
        assert_eq!(config.service_label, "flask-app");
        assert_eq!(config.low_throughput_threshold, 500.0);
    }
}
