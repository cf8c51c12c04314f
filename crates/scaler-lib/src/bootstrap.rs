//! Startup reconciliation
//!
//! Brings the population up to the configured minimum once, before the
//! webhook reports ready. Nothing here fails the process: every error is
//! logged and recorded in the [`BootstrapReport`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::census::Census;
use crate::config::ScalingConfig;
use crate::health::{components, HealthRegistry};
use crate::observability::StructuredLogger;
use crate::orchestration::{ExecutionPath, OrchestrationBackend};
use crate::provisioner::Provisioner;

/// What the bootstrap pass saw and did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BootstrapReport {
    /// Count before anything was done; `None` if the census failed
    pub before: Option<u32>,
    /// Count once done; `None` if the census failed
    pub after: Option<u32>,
    /// Path that brought the count up, if any
    pub path: Option<ExecutionPath>,
    pub created: Vec<String>,
    pub errors: Vec<String>,
}

impl BootstrapReport {
    pub fn reached(&self, min: u32) -> bool {
        self.after.is_some_and(|count| count >= min)
    }
}

#[derive(Clone)]
pub struct BootstrapReconciler {
    census: Census,
    provisioner: Provisioner,
    declarative: Option<Arc<dyn OrchestrationBackend>>,
    min: u32,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl BootstrapReconciler {
    pub fn new(
        census: Census,
        provisioner: Provisioner,
        declarative: Option<Arc<dyn OrchestrationBackend>>,
        config: &ScalingConfig,
    ) -> Self {
        Self {
            census,
            provisioner,
            declarative,
            min: config.min_replicas,
            logger: StructuredLogger::new(config.service_label.clone()),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Ensure at least `min_replicas` are running
    ///
    /// A population already at or above the minimum is left untouched, so a
    /// restart of the webhook never scales the service down.
    pub async fn run(&self) -> BootstrapReport {
        let mut report = BootstrapReport::default();

        let before = match self.census.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Bootstrap census failed, skipping");
                report.errors.push(e.to_string());
                self.finish(&report).await;
                return report;
            }
        };
        report.before = Some(before);
        report.after = Some(before);

        if before >= self.min {
            info!(current = before, min = self.min, "Minimum already met");
            self.finish(&report).await;
            return report;
        }

        if let Some(backend) = &self.declarative {
            match backend.scale(before, self.min).await {
                Ok(_) => {
                    report.path = Some(backend.path());
                    report.after = self.recount(&mut report).await;
                    if report.reached(self.min) {
                        self.finish(&report).await;
                        return report;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Declarative bootstrap failed, provisioning directly");
                    report.errors.push(e.to_string());
                }
            }
        }

        self.provision(&mut report).await;
        self.finish(&report).await;
        report
    }

    /// Create replicas one by one until the minimum is met
    ///
    /// Stops at the first failure, and after a bounded number of attempts
    /// in case created replicas never show up in the census.
    async fn provision(&self, report: &mut BootstrapReport) {
        let max_attempts = self.min.saturating_mul(2);
        let mut attempts = 0;

        while !report.reached(self.min) && attempts < max_attempts {
            attempts += 1;
            match self.provisioner.create().await {
                Ok(instance) => {
                    report.path = Some(ExecutionPath::Imperative);
                    report.created.push(instance.name);
                }
                Err(e) => {
                    warn!(error = %e, "Bootstrap replica creation failed");
                    report.errors.push(e.to_string());
                    break;
                }
            }
            report.after = self.recount(report).await;
            if report.after.is_none() {
                break;
            }
        }
    }

    async fn recount(&self, report: &mut BootstrapReport) -> Option<u32> {
        match self.census.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Bootstrap census failed");
                report.errors.push(e.to_string());
                None
            }
        }
    }

    async fn finish(&self, report: &BootstrapReport) {
        self.logger.log_bootstrap(
            report.before.unwrap_or(0),
            report.after.unwrap_or(0),
            self.min,
        );
        let Some(health) = &self.health else {
            return;
        };
        if report.reached(self.min) {
            health.set_healthy(components::BOOTSTRAP).await;
        } else {
            let reason = report
                .errors
                .last()
                .cloned()
                .unwrap_or_else(|| "minimum replica count not reached".to_string());
            health.set_degraded(components::BOOTSTRAP, reason).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::census::MANAGED_SERVICE_LABEL;
    use crate::error::{Result, ScalerError};
    use crate::health::ComponentStatus;
    use crate::orchestration::{async_trait, ScaleReport};
    use crate::runtime::InMemoryRuntime;
    use std::collections::HashMap;

    /// Declarative backend that always fails
    struct Unavailable;

    #[async_trait]
    impl OrchestrationBackend for Unavailable {
        fn path(&self) -> ExecutionPath {
            ExecutionPath::Declarative
        }

        async fn scale(&self, _current: u32, _target: u32) -> Result<ScaleReport> {
            Err(ScalerError::OrchestratorUnavailable(
                "docker-compose not found".into(),
            ))
        }
    }

    async fn setup(
        min: u32,
        existing: usize,
        declarative: Option<Arc<dyn OrchestrationBackend>>,
    ) -> (Arc<InMemoryRuntime>, BootstrapReconciler, HealthRegistry) {
        let runtime = Arc::new(InMemoryRuntime::new());
        for i in 0..existing {
            runtime
                .insert(
                    &format!("replica-{}", i),
                    "app:1",
                    HashMap::from([(MANAGED_SERVICE_LABEL.to_string(), "flask-app".to_string())]),
                )
                .await;
        }
        let config = Arc::new(ScalingConfig {
            min_replicas: min,
            max_replicas: min.max(1) * 2,
            ..Default::default()
        });
        let census = Census::new(runtime.clone(), config.clone());
        let provisioner = Provisioner::new(runtime.clone(), census.clone(), config.clone());
        let health = HealthRegistry::new();
        let reconciler = BootstrapReconciler::new(census, provisioner, declarative, &config)
            .with_health(health.clone());
        (runtime, reconciler, health)
    }

    #[tokio::test]
    async fn test_fills_up_to_min_after_compose_failure() {
        let (runtime, reconciler, health) = setup(2, 0, Some(Arc::new(Unavailable))).await;

        let report = reconciler.run().await;

        assert_eq!(report.before, Some(0));
        assert_eq!(report.after, Some(2));
        assert_eq!(report.path, Some(ExecutionPath::Imperative));
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(runtime.containers().await.len(), 2);
        assert_eq!(
            health.status_of(components::BOOTSTRAP).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_leaves_sufficient_population_alone() {
        let (runtime, reconciler, _health) = setup(1, 3, Some(Arc::new(Unavailable))).await;

        let report = reconciler.run().await;

        assert_eq!(report.after, Some(3));
        assert!(report.path.is_none());
        assert!(report.errors.is_empty());
        assert_eq!(runtime.run_calls(), 0);
    }

    #[tokio::test]
    async fn test_creation_failure_is_swallowed() {
        let (runtime, reconciler, health) = setup(3, 0, None).await;
        runtime.fail_runs_after(1);

        let report = reconciler.run().await;

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.after, Some(1));
        assert!(!report.reached(3));
        assert_eq!(
            health.status_of(components::BOOTSTRAP).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[tokio::test]
    async fn test_unreachable_runtime() {
        let (runtime, reconciler, _health) = setup(1, 0, None).await;
        runtime.set_unreachable(true);

        let report = reconciler.run().await;

        assert_eq!(report.before, None);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(runtime.run_calls(), 0);
    }
}
