//! Docker Engine runtime
//!
//! Talks to the local Docker daemon (socket or `DOCKER_HOST`) through
//! bollard. Listing inspects every container so creation times keep
//! sub-second precision, which the reaper relies on for ordering.

use std::collections::HashMap;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, EndpointSettings, HostConfig, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::network::ConnectNetworkOptions;
use bollard::Docker;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{async_trait, ContainerRuntime};
use crate::error::{Result, ScalerError};
use crate::models::{ContainerSpec, ManagedInstance};

/// Runtime backed by the Docker Engine API
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

fn runtime_err(err: bollard::errors::Error) -> ScalerError {
    ScalerError::Runtime(err.to_string())
}

impl DockerRuntime {
    /// Connect using the platform defaults (`/var/run/docker.sock` or `DOCKER_HOST`)
    pub fn connect_local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(runtime_err)?;
        Ok(Self { docker })
    }

    async fn inspect(&self, container_id: &str) -> Result<ManagedInstance> {
        let info = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(runtime_err)?;
        Ok(instance_from_inspect(info, container_id))
    }
}

fn strip_slash(name: &str) -> String {
    name.trim_start_matches('/').to_string()
}

fn instance_from_summary(summary: ContainerSummary) -> ManagedInstance {
    let id = summary.id.unwrap_or_default();
    let name = summary
        .names
        .and_then(|names| names.into_iter().next())
        .map(|n| strip_slash(&n))
        .unwrap_or_else(|| id.chars().take(12).collect());
    let created = summary
        .created
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default();
    ManagedInstance {
        id,
        name,
        created,
        image: summary.image.unwrap_or_default(),
        image_id: summary.image_id.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        mounts: summary
            .mounts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.destination)
            .collect(),
    }
}

fn instance_from_inspect(info: ContainerInspectResponse, fallback_id: &str) -> ManagedInstance {
    let id = info.id.unwrap_or_else(|| fallback_id.to_string());
    let created = info
        .created
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default();
    let (image, labels) = match info.config {
        Some(config) => (
            config.image.unwrap_or_default(),
            config.labels.unwrap_or_default(),
        ),
        None => (String::new(), HashMap::new()),
    };
    ManagedInstance {
        name: info
            .name
            .map(|n| strip_slash(&n))
            .unwrap_or_else(|| id.chars().take(12).collect()),
        id,
        created,
        image,
        image_id: info.image.unwrap_or_default(),
        labels,
        mounts: info
            .mounts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.destination)
            .collect(),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ManagedInstance>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}={}", key, value)]);

        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: false,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(runtime_err)?;

        let mut instances = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id.clone() else {
                continue;
            };
            match self.inspect(&id).await {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    // The container may have gone away between list and inspect
                    debug!(container_id = %id, error = %e, "Inspect failed, using list summary");
                    instances.push(instance_from_summary(summary));
                }
            }
        }
        Ok(instances)
    }

    async fn image_tags(&self, image_id: &str) -> Result<Vec<String>> {
        let image = self
            .docker
            .inspect_image(image_id)
            .await
            .map_err(runtime_err)?;
        Ok(image.repo_tags.unwrap_or_default())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ManagedInstance> {
        let host_config = HostConfig {
            binds: spec
                .bind
                .as_ref()
                .map(|b| vec![format!("{}:{}:rw", b.source, b.target)]),
            restart_policy: spec.restart_always.then(|| RestartPolicy {
                name: Some(RestartPolicyNameEnum::ALWAYS),
                maximum_retry_count: None,
            }),
            network_mode: spec.network.clone(),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(
                spec.env
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            ),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(runtime_err)?;

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Do not leave a created-but-stopped container behind
            let cleanup = self
                .docker
                .remove_container(
                    &created.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            if let Err(cleanup_err) = cleanup {
                warn!(
                    container_id = %created.id,
                    error = %cleanup_err,
                    "Failed to clean up unstarted container"
                );
            }
            return Err(runtime_err(e));
        }

        self.inspect(&created.id).await
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<()> {
        self.docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container_id.to_string(),
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await
            .map_err(runtime_err)
    }

    async fn stop(&self, container_id: &str, grace: Duration) -> Result<()> {
        self.docker
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: grace.as_secs() as i64,
                }),
            )
            .await
            .map_err(runtime_err)
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        self.docker
            .remove_container(container_id, None::<RemoveContainerOptions>)
            .await
            .map_err(runtime_err)
    }

    async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map(|_| ()).map_err(runtime_err)
    }
}
