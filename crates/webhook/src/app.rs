//! Component wiring shared by the binary and the integration tests

use std::sync::Arc;

use anyhow::Result;
use scaler_lib::{
    health::components, AlertClassifier, BootstrapReconciler, Census, ComposeBackend,
    ContainerRuntime, Executor, HealthRegistry, ImperativeBackend, OrchestrationBackend,
    Provisioner, Reaper, ScalerMetrics, ScalingConfig,
};
use tracing::warn;

use crate::api::AppState;

pub struct Webhook {
    pub state: Arc<AppState>,
    pub reconciler: BootstrapReconciler,
    pub runtime: Arc<dyn ContainerRuntime>,
}

impl Webhook {
    pub async fn build(
        runtime: Arc<dyn ContainerRuntime>,
        config: Arc<ScalingConfig>,
    ) -> Result<Self> {
        let census = Census::new(runtime.clone(), config.clone());
        let provisioner = Provisioner::new(runtime.clone(), census.clone(), config.clone());
        let reaper = Reaper::new(runtime.clone(), census.clone(), config.clone());

        let declarative: Option<Arc<dyn OrchestrationBackend>> =
            match ComposeBackend::from_config(&config)? {
                Some(backend) => Some(Arc::new(backend)),
                None => None,
            };
        let imperative = Arc::new(ImperativeBackend::new(provisioner.clone(), reaper));
        let executor = Executor::new(declarative.clone(), imperative);

        let health_registry = HealthRegistry::new();
        health_registry.register(components::RUNTIME).await;
        health_registry.register(components::ORCHESTRATOR).await;
        health_registry.register(components::BOOTSTRAP).await;

        let metrics = ScalerMetrics::new()?;

        let classifier = AlertClassifier::new(census.clone(), executor, &config)
            .with_metrics(metrics.clone())
            .with_health(health_registry.clone());
        let reconciler = BootstrapReconciler::new(census.clone(), provisioner, declarative, &config)
            .with_health(health_registry.clone());

        let state = Arc::new(AppState {
            service_label: config.service_label.clone(),
            census,
            classifier,
            health_registry,
            metrics,
        });

        Ok(Self {
            state,
            reconciler,
            runtime,
        })
    }

    /// Probe the runtime once and record the answer
    pub async fn check_runtime(&self) {
        let health = &self.state.health_registry;
        match self.runtime.ping().await {
            Ok(()) => health.set_healthy(components::RUNTIME).await,
            Err(e) => {
                warn!(error = %e, "Container runtime not reachable");
                health.set_unhealthy(components::RUNTIME, e.to_string()).await;
            }
        }
    }

    /// Run the bootstrap pass, then report ready
    pub async fn bootstrap(&self) {
        let report = self.reconciler.run().await;
        if let Some(count) = report.after {
            self.state.metrics.set_replicas(count);
        }
        self.state.health_registry.set_ready(true).await;
    }
}
