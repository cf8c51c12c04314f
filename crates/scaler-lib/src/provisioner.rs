//! Replica provisioning
//!
//! Creates one replica at a time. The image is copied from a running
//! replica when there is one, so new replicas follow whatever is deployed.
//! Storage and secondary networks are best effort: a replica that cannot
//! get its bind mount still starts (degraded, visible in its mounts), and
//! a network that cannot be joined is logged and skipped.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::census::{
    Census, COMPOSE_SERVICE_LABEL, MANAGED_SERVICE_LABEL, ROLE_LABEL, ROLE_REPLICA,
};
use crate::config::ScalingConfig;
use crate::error::{Result, ScalerError};
use crate::models::{BindMount, ContainerSpec, ManagedInstance};
use crate::runtime::ContainerRuntime;

#[derive(Clone)]
pub struct Provisioner {
    runtime: Arc<dyn ContainerRuntime>,
    census: Census,
    config: Arc<ScalingConfig>,
}

impl Provisioner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        census: Census,
        config: Arc<ScalingConfig>,
    ) -> Self {
        Self {
            runtime,
            census,
            config,
        }
    }

    /// Image for a new replica: first tag of a running replica's image,
    /// else the configured fallback
    pub async fn resolve_image(&self) -> Result<String> {
        let instances = self.census.list_managed().await?;
        if let Some(first) = instances.first() {
            match self.runtime.image_tags(&first.image_id).await {
                Ok(tags) => {
                    if let Some(tag) = tags.into_iter().next() {
                        return Ok(tag);
                    }
                    debug!(instance = %first.name, "Running replica image has no tags");
                }
                Err(e) => {
                    debug!(instance = %first.name, error = %e, "Could not read replica image tags");
                }
            }
        }
        Ok(self.config.image_fallback.clone())
    }

    fn labels(&self) -> Result<HashMap<String, String>> {
        let service = self.config.service_label.clone();
        let mut labels = self.config.extra_labels()?;
        labels.insert(COMPOSE_SERVICE_LABEL.to_string(), service.clone());
        labels.insert(MANAGED_SERVICE_LABEL.to_string(), service);
        labels.insert(ROLE_LABEL.to_string(), ROLE_REPLICA.to_string());
        Ok(labels)
    }

    /// Spec for a new replica, including the bind mount
    pub async fn build_spec(&self) -> Result<ContainerSpec> {
        Ok(ContainerSpec {
            image: self.resolve_image().await?,
            labels: self.labels()?,
            env: vec![(
                self.config.storage_env_var.clone(),
                self.config.storage_path(),
            )],
            bind: Some(BindMount {
                source: self.config.data_volume_host.clone(),
                target: self.config.data_volume_container.clone(),
            }),
            restart_always: true,
            network: self.config.networks.first().cloned(),
        })
    }

    /// Create and start one replica
    pub async fn create(&self) -> Result<ManagedInstance> {
        let spec = self.build_spec().await?;

        let instance = match self.runtime.run(&spec).await {
            Ok(instance) => instance,
            Err(bind_err) => {
                warn!(
                    image = %spec.image,
                    error = %bind_err,
                    "Replica creation with bind mount failed, retrying without storage"
                );
                self.runtime
                    .run(&spec.without_bind())
                    .await
                    .map_err(|e| ScalerError::Provision(e.to_string()))?
            }
        };

        if !instance.has_mount(&self.config.data_volume_container) {
            warn!(
                instance = %instance.name,
                mount = %self.config.data_volume_container,
                "Replica running without shared storage"
            );
        }

        for network in self.config.networks.iter().skip(1) {
            if let Err(e) = self.runtime.connect_network(network, &instance.id).await {
                warn!(
                    instance = %instance.name,
                    network = %network,
                    error = %e,
                    "Failed to attach replica to network"
                );
            }
        }

        info!(instance = %instance.name, image = %instance.image, "Replica created");
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::InMemoryRuntime;

    fn setup(config: ScalingConfig) -> (Arc<InMemoryRuntime>, Provisioner) {
        let runtime = Arc::new(InMemoryRuntime::new());
        let config = Arc::new(config);
        let census = Census::new(runtime.clone(), config.clone());
        let provisioner = Provisioner::new(runtime.clone(), census, config);
        (runtime, provisioner)
    }

    #[tokio::test]
    async fn test_create_with_full_spec() {
        let (runtime, provisioner) = setup(ScalingConfig::default());

        let instance = provisioner.create().await.unwrap();

        assert_eq!(instance.image, "projeto_flask-app:latest");
        assert!(instance.has_mount("/data"));
        assert_eq!(instance.label(COMPOSE_SERVICE_LABEL), Some("flask-app"));
        assert_eq!(instance.label(MANAGED_SERVICE_LABEL), Some("flask-app"));
        assert_eq!(instance.label(ROLE_LABEL), Some(ROLE_REPLICA));
        assert_eq!(instance.label("traefik.enable"), Some("true"));
        assert_eq!(
            runtime.networks_of(&instance.id).await,
            vec!["monitoring", "traefik_net"]
        );
    }

    #[tokio::test]
    async fn test_spec_env_and_restart_policy() {
        let (_runtime, provisioner) = setup(ScalingConfig::default());
        let spec = provisioner.build_spec().await.unwrap();

        assert!(spec.restart_always);
        assert_eq!(
            spec.env,
            vec![(
                "FILES_STORAGE_PATH".to_string(),
                "/data/files.json".to_string()
            )]
        );
        assert_eq!(spec.network.as_deref(), Some("monitoring"));
    }

    #[tokio::test]
    async fn test_image_follows_running_replica() {
        let (runtime, provisioner) = setup(ScalingConfig::default());
        runtime
            .insert(
                "flask-app-1",
                "registry.local/flask-app:2.3",
                HashMap::from([(COMPOSE_SERVICE_LABEL.to_string(), "flask-app".to_string())]),
            )
            .await;

        assert_eq!(
            provisioner.resolve_image().await.unwrap(),
            "registry.local/flask-app:2.3"
        );
        let instance = provisioner.create().await.unwrap();
        assert_eq!(instance.image, "registry.local/flask-app:2.3");
    }

    #[tokio::test]
    async fn test_bind_failure_falls_back_to_no_storage() {
        let (runtime, provisioner) = setup(ScalingConfig::default());
        runtime.set_reject_binds(true);

        let instance = provisioner.create().await.unwrap();

        assert!(!instance.has_mount("/data"));
        assert_eq!(runtime.run_calls(), 2);
    }

    #[tokio::test]
    async fn test_both_attempts_failing_is_an_error() {
        let (runtime, provisioner) = setup(ScalingConfig::default());
        runtime.fail_runs_after(0);

        let err = provisioner.create().await.unwrap_err();
        assert!(matches!(err, ScalerError::Provision(_)));
        assert_eq!(runtime.run_calls(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_does_not_block_creation() {
        let config = ScalingConfig {
            networks: vec![
                "monitoring".to_string(),
                "broken".to_string(),
                "backend".to_string(),
            ],
            ..Default::default()
        };
        let (runtime, provisioner) = setup(config);
        runtime.fail_network("broken").await;

        let instance = provisioner.create().await.unwrap();
        assert_eq!(
            runtime.networks_of(&instance.id).await,
            vec!["monitoring", "backend"]
        );
    }
}
