//! Census of the managed service's live replicas
//!
//! A replica is in scope when it carries either the compose service label
//! (created by `docker-compose --scale`) or the scaler's own
//! management-origin label (created by the provisioner). Nothing here is
//! cached: every call asks the runtime.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ScalingConfig;
use crate::error::{Result, ScalerError};
use crate::models::ManagedInstance;
use crate::runtime::ContainerRuntime;

/// Label set by compose on every service container
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Label set by the provisioner on replicas it creates
pub const MANAGED_SERVICE_LABEL: &str = "scale-webhook.managed-service";

/// Role label set by the provisioner
pub const ROLE_LABEL: &str = "scale-webhook.role";

pub const ROLE_REPLICA: &str = "replica";

#[derive(Clone)]
pub struct Census {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<ScalingConfig>,
}

impl Census {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: Arc<ScalingConfig>) -> Self {
        Self { runtime, config }
    }

    /// Live replicas, oldest first, each listed once
    pub async fn list_managed(&self) -> Result<Vec<ManagedInstance>> {
        let service = self.config.service_label.as_str();
        let mut instances = Vec::new();
        let mut seen = HashSet::new();

        for key in [COMPOSE_SERVICE_LABEL, MANAGED_SERVICE_LABEL] {
            let found = self
                .runtime
                .list_by_label(key, service)
                .await
                .map_err(|e| ScalerError::Census(e.to_string()))?;
            for instance in found {
                if seen.insert(instance.id.clone()) {
                    instances.push(instance);
                }
            }
        }

        instances.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(instances)
    }

    pub async fn count(&self) -> Result<u32> {
        Ok(self.list_managed().await?.len() as u32)
    }
}
