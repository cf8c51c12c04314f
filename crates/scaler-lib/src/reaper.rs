//! Replica removal
//!
//! Removes the most recently created replica. Older replicas are more
//! likely to hold warm connections, so they are kept. Errors never escape:
//! the executor aggregates each removal as an `ok`/`info` pair.

use std::sync::Arc;

use tracing::{info, warn};

use crate::census::Census;
use crate::config::ScalingConfig;
use crate::models::Removal;
use crate::runtime::ContainerRuntime;

pub const MIN_REACHED: &str = "min_reached";

#[derive(Clone)]
pub struct Reaper {
    runtime: Arc<dyn ContainerRuntime>,
    census: Census,
    config: Arc<ScalingConfig>,
}

impl Reaper {
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

    /// Stop and remove the newest replica unless at the minimum
    pub async fn remove_one(&self) -> Removal {
        let instances = match self.census.list_managed().await {
            Ok(instances) => instances,
            Err(e) => return Removal::refused(e.to_string()),
        };

        if instances.len() as u32 <= self.config.min_replicas {
            return Removal::refused(MIN_REACHED);
        }

        // Census is ordered oldest first
        let Some(victim) = instances.last() else {
            return Removal::refused(MIN_REACHED);
        };

        if let Err(e) = self
            .runtime
            .stop(&victim.id, self.config.stop_grace())
            .await
        {
            warn!(instance = %victim.name, error = %e, "Failed to stop replica");
            return Removal::refused(e.to_string());
        }
        if let Err(e) = self.runtime.remove(&victim.id).await {
            warn!(instance = %victim.name, error = %e, "Failed to remove replica");
            return Removal::refused(e.to_string());
        }

        info!(instance = %victim.name, "Replica removed");
        Removal::removed(victim.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::census::MANAGED_SERVICE_LABEL;
    use crate::runtime::InMemoryRuntime;
    use std::collections::HashMap;

    async fn setup(min: u32, replicas: &[&str]) -> (Arc<InMemoryRuntime>, Reaper) {
        let runtime = Arc::new(InMemoryRuntime::new());
        for name in replicas {
            runtime
                .insert(
                    name,
                    "app:1",
                    HashMap::from([(MANAGED_SERVICE_LABEL.to_string(), "flask-app".to_string())]),
                )
                .await;
        }
        let config = Arc::new(ScalingConfig {
            min_replicas: min,
            ..Default::default()
        });
        let census = Census::new(runtime.clone(), config.clone());
        (runtime.clone(), Reaper::new(runtime, census, config))
    }

    #[tokio::test]
    async fn test_removes_newest_first() {
        let (runtime, reaper) = setup(1, &["oldest", "middle", "newest"]).await;

        assert_eq!(reaper.remove_one().await, Removal::removed("newest"));
        assert_eq!(reaper.remove_one().await, Removal::removed("middle"));

        let left: Vec<_> = runtime.containers().await.into_iter().map(|c| c.name).collect();
        assert_eq!(left, vec!["oldest"]);
    }

    #[tokio::test]
    async fn test_stops_before_removing() {
        let (runtime, reaper) = setup(0, &["only"]).await;
        let id = runtime.containers().await[0].id.clone();

        assert!(reaper.remove_one().await.ok);
        assert_eq!(runtime.stopped().await, vec![id]);
    }

    #[tokio::test]
    async fn test_refuses_at_min() {
        let (runtime, reaper) = setup(2, &["a", "b"]).await;

        assert_eq!(reaper.remove_one().await, Removal::refused(MIN_REACHED));
        assert_eq!(runtime.containers().await.len(), 2);
    }

    #[tokio::test]
    async fn test_runtime_errors_are_returned_not_raised() {
        let (runtime, reaper) = setup(1, &["a", "b"]).await;
        runtime.set_fail_stops(true);

        let removal = reaper.remove_one().await;
        assert!(!removal.ok);
        assert!(removal.info.contains("permission denied"));
        assert_eq!(runtime.containers().await.len(), 2);
    }

    #[tokio::test]
    async fn test_census_failure_is_a_refusal() {
        let (runtime, reaper) = setup(1, &["a", "b"]).await;
        runtime.set_unreachable(true);

        let removal = reaper.remove_one().await;
        assert!(!removal.ok);
        assert!(removal.info.contains("Census failed"));
    }
}
