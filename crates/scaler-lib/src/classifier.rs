//! Alert classification and dispatch
//!
//! Each alert in a batch is handled on its own: a failure while handling
//! one alert ends up in that alert's outcome and never aborts the batch.

use std::time::Instant;

use tracing::{debug, warn};

use crate::alerts::AlertmanagerAlert;
use crate::census::Census;
use crate::config::ScalingConfig;
use crate::executor::{Convergence, Executor};
use crate::health::{components, HealthRegistry};
use crate::models::{AlertOutcome, OutcomeAction};
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::orchestration::ExecutionPath;
use crate::policy::{decide, triage, Direction, PolicyAction, ScaleBounds, Triage};

#[derive(Clone)]
pub struct AlertClassifier {
    census: Census,
    executor: Executor,
    bounds: ScaleBounds,
    logger: StructuredLogger,
    metrics: Option<ScalerMetrics>,
    health: Option<HealthRegistry>,
}

impl AlertClassifier {
    pub fn new(census: Census, executor: Executor, config: &ScalingConfig) -> Self {
        Self {
            census,
            executor,
            bounds: config.bounds(),
            logger: StructuredLogger::new(config.service_label.clone()),
            metrics: None,
            health: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ScalerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// One outcome per alert, in batch order
    pub async fn handle(&self, alerts: Vec<AlertmanagerAlert>) -> Vec<AlertOutcome> {
        let mut outcomes = Vec::with_capacity(alerts.len());
        for alert in &alerts {
            outcomes.push(self.handle_one(alert).await);
        }
        outcomes
    }

    pub async fn handle_one(&self, alert: &AlertmanagerAlert) -> AlertOutcome {
        let started = Instant::now();
        let signal = alert.signal();

        let outcome = match triage(&signal.kind, signal.status) {
            Triage::Ignore(action) => {
                debug!(alert = ?signal.name, action = ?action, "Alert ignored");
                AlertOutcome::new(signal.name.clone(), passive_action(action))
            }
            Triage::Evaluate(direction) => {
                self.scale(signal.name.clone(), direction, signal.measured_value)
                    .await
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(&outcome);
            metrics.observe_alert_latency(started.elapsed().as_secs_f64());
        }
        outcome
    }

    async fn scale(
        &self,
        name: Option<String>,
        direction: Direction,
        measured: Option<f64>,
    ) -> AlertOutcome {
        let label = name.clone().unwrap_or_default();

        let current = match self.census.count().await {
            Ok(count) => {
                self.mark(components::RUNTIME, None).await;
                if let Some(metrics) = &self.metrics {
                    metrics.set_replicas(count);
                }
                count
            }
            Err(e) => {
                warn!(alert = %label, error = %e, "Census failed");
                self.mark(components::RUNTIME, Some(e.to_string())).await;
                return AlertOutcome::failed(name, e.to_string());
            }
        };

        let decision = decide(direction, current, measured, &self.bounds);
        self.logger
            .log_decision(&label, decision.action.as_str(), decision.from, decision.to);

        if decision.direction().is_none() {
            let mut outcome = AlertOutcome::new(name, passive_action(decision.action));
            outcome.current = Some(current);
            if decision.action == PolicyAction::KeepLastLowThroughput {
                outcome.value = measured;
            }
            return outcome;
        }

        match self.executor.converge(decision.from, decision.to).await {
            Ok(convergence) => {
                self.record(&label, &convergence).await;
                outcome_of(name, &convergence)
            }
            Err(e) => {
                warn!(alert = %label, error = %e, "Convergence failed");
                AlertOutcome::failed(name, e.to_string())
            }
        }
    }

    async fn record(&self, label: &str, convergence: &Convergence) {
        self.logger.log_convergence(label, convergence);
        if let Some(metrics) = &self.metrics {
            metrics.record_convergence(convergence);
        }
        let Some(health) = &self.health else {
            return;
        };
        match (&convergence.fallback_reason, convergence.path) {
            (Some(reason), _) => {
                health
                    .set_degraded(components::ORCHESTRATOR, reason.clone())
                    .await
            }
            (None, Some(ExecutionPath::Declarative)) => {
                health.set_healthy(components::ORCHESTRATOR).await
            }
            _ => {}
        }
    }

    /// Healthy on `None`, unhealthy with the message otherwise
    async fn mark(&self, component: &str, failure: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };
        match failure {
            None => health.set_healthy(component).await,
            Some(message) => health.set_unhealthy(component, message).await,
        }
    }
}

/// Outcome action reported for a policy action that is not executed
fn passive_action(action: PolicyAction) -> OutcomeAction {
    match action {
        PolicyAction::IgnoredResolved => OutcomeAction::IgnoredResolved,
        PolicyAction::Ignored => OutcomeAction::Ignored,
        PolicyAction::NoChange => OutcomeAction::NoChange,
        PolicyAction::MinReached => OutcomeAction::MinReached,
        PolicyAction::KeepLastLowThroughput => OutcomeAction::KeepLastLowThroughput,
        PolicyAction::ScaleUp => OutcomeAction::ScaledUp,
        PolicyAction::ScaleDown => OutcomeAction::ScaledDown,
    }
}

fn outcome_of(name: Option<String>, convergence: &Convergence) -> AlertOutcome {
    let action = convergence.action();
    let mut outcome = AlertOutcome::new(name, action);
    outcome.from = Some(convergence.from);
    outcome.to = Some(convergence.to);

    match action {
        OutcomeAction::ScaledUp => {
            outcome.created = Some(convergence.report.created.clone());
            if !convergence.report.failures.is_empty() {
                outcome.failures = Some(convergence.report.failures.clone());
            }
        }
        OutcomeAction::ScaledDown => {
            outcome.removed = Some(convergence.report.removed.clone());
        }
        _ => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertBatch;
    use crate::census::MANAGED_SERVICE_LABEL;
    use crate::health::ComponentStatus;
    use crate::orchestration::{ComposeBackend, ImperativeBackend};
    use crate::provisioner::Provisioner;
    use crate::reaper::Reaper;
    use crate::runtime::InMemoryRuntime;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Fixture {
        runtime: Arc<InMemoryRuntime>,
        census: Census,
        classifier: AlertClassifier,
        health: HealthRegistry,
    }

    async fn fixture(config: ScalingConfig, replicas: usize) -> Fixture {
        let runtime = Arc::new(InMemoryRuntime::new());
        for i in 0..replicas {
            runtime
                .insert(
                    &format!("replica-{}", i),
                    "app:1",
                    HashMap::from([(MANAGED_SERVICE_LABEL.to_string(), "flask-app".to_string())]),
                )
                .await;
        }
        let config = Arc::new(config);
        let census = Census::new(runtime.clone(), config.clone());
        let provisioner = Provisioner::new(runtime.clone(), census.clone(), config.clone());
        let reaper = Reaper::new(runtime.clone(), census.clone(), config.clone());
        let declarative = ComposeBackend::from_config(&config)
            .unwrap()
            .map(|b| Arc::new(b) as Arc<dyn crate::orchestration::OrchestrationBackend>);
        let executor = Executor::new(
            declarative,
            Arc::new(ImperativeBackend::new(provisioner, reaper)),
        );
        let health = HealthRegistry::new();
        health.register(components::RUNTIME).await;
        health.register(components::ORCHESTRATOR).await;
        let classifier = AlertClassifier::new(census.clone(), executor, &config)
            .with_health(health.clone())
            .with_metrics(ScalerMetrics::new().unwrap());
        Fixture {
            runtime,
            census,
            classifier,
            health,
        }
    }

    fn imperative_only(min: u32, max: u32) -> ScalingConfig {
        ScalingConfig {
            min_replicas: min,
            max_replicas: max,
            compose_enabled: false,
            ..Default::default()
        }
    }

    fn batch(json: &str) -> Vec<AlertmanagerAlert> {
        AlertBatch::parse(json.as_bytes()).unwrap().into_alerts()
    }

    fn alert(name: &str, status: &str, value: Option<&str>) -> Vec<AlertmanagerAlert> {
        let annotations = match value {
            Some(v) => format!(r#", "annotations": {{"value": "{}"}}"#, v),
            None => String::new(),
        };
        batch(&format!(
            r#"{{"alerts": [{{"status": "{}", "labels": {{"alertname": "{}"}}{}}}]}}"#,
            status, name, annotations
        ))
    }

    #[tokio::test]
    async fn test_scale_up_creates_one_replica() {
        let f = fixture(imperative_only(1, 3), 1).await;

        let outcomes = f
            .classifier
            .handle(alert("ScaleUpNetworkThroughput", "firing", None))
            .await;

        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert_eq!(outcome.action, OutcomeAction::ScaledUp);
        assert_eq!((outcome.from, outcome.to), (Some(1), Some(2)));
        assert_eq!(outcome.created.as_ref().unwrap().len(), 1);
        assert!(outcome.failures.is_none());
        assert_eq!(f.census.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_repeated_scale_up_stops_at_max() {
        let f = fixture(imperative_only(1, 2), 1).await;
        let up = alert("ScaleUpNetworkThroughput", "firing", None);

        assert_eq!(
            f.classifier.handle(up.clone()).await[0].action,
            OutcomeAction::ScaledUp
        );
        let second = f.classifier.handle(up).await;
        assert_eq!(second[0].action, OutcomeAction::NoChange);
        assert_eq!(second[0].current, Some(2));
        assert_eq!(f.census.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_scale_down_at_min() {
        let f = fixture(imperative_only(1, 3), 1).await;

        let outcomes = f
            .classifier
            .handle(alert("ScaleDownNetworkThroughput", "firing", None))
            .await;
        assert_eq!(outcomes[0].action, OutcomeAction::MinReached);
        assert_eq!(outcomes[0].current, Some(1));
    }

    #[tokio::test]
    async fn test_last_replica_kept_under_low_throughput() {
        let f = fixture(imperative_only(1, 3), 1).await;

        let kept = f
            .classifier
            .handle(alert("ScaleDownNetworkThroughput", "firing", Some("4.99e2")))
            .await;
        assert_eq!(kept[0].action, OutcomeAction::KeepLastLowThroughput);
        assert_eq!(kept[0].value, Some(499.0));

        let at_threshold = f
            .classifier
            .handle(alert("ScaleDownNetworkThroughput", "firing", Some("500")))
            .await;
        assert_eq!(at_threshold[0].action, OutcomeAction::MinReached);
    }

    #[tokio::test]
    async fn test_scale_down_removes_newest() {
        let f = fixture(imperative_only(1, 3), 3).await;

        let outcomes = f
            .classifier
            .handle(alert("ScaleDownNetworkThroughput", "firing", Some("10")))
            .await;
        let outcome = &outcomes[0];
        assert_eq!(outcome.action, OutcomeAction::ScaledDown);
        assert_eq!((outcome.from, outcome.to), (Some(3), Some(2)));
        let removed = outcome.removed.as_ref().unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].info, "replica-2");
        assert_eq!(f.census.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_passive_alerts_change_nothing() {
        let f = fixture(imperative_only(1, 3), 1).await;
        let alerts = batch(
            r#"{"alerts": [
                {"status": "resolved", "labels": {"alertname": "ScaleUpNetworkThroughput"}},
                {"status": "firing", "labels": {"alertname": "DiskFull"}},
                {"state": "resolved", "labels": {"alertname": "ScaleDownNetworkThroughput"}}
            ]}"#,
        );

        let outcomes = f.classifier.handle(alerts).await;
        let actions: Vec<_> = outcomes.iter().map(|o| o.action).collect();
        assert_eq!(
            actions,
            vec![
                OutcomeAction::IgnoredResolved,
                OutcomeAction::Ignored,
                OutcomeAction::IgnoredResolved
            ]
        );
        assert_eq!(outcomes[1].alert.as_deref(), Some("DiskFull"));
        assert_eq!(f.runtime.run_calls(), 0);
        assert_eq!(f.census.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partial_creation_reports_failure() {
        let mut config = imperative_only(1, 5);
        config.scale_step = 2;
        let f = fixture(config, 1).await;
        f.runtime.fail_runs_after(1);

        let outcomes = f
            .classifier
            .handle(alert("ScaleUpNetworkThroughput", "firing", None))
            .await;
        let outcome = &outcomes[0];
        assert_eq!(outcome.action, OutcomeAction::ScaledUp);
        assert_eq!(outcome.created.as_ref().unwrap().len(), 1);
        assert_eq!(outcome.failures.as_ref().unwrap().len(), 1);
        assert_eq!(f.census.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_census_failure_is_per_alert() {
        let f = fixture(imperative_only(1, 3), 1).await;
        f.runtime.set_unreachable(true);

        let alerts = batch(
            r#"{"alerts": [
                {"status": "firing", "labels": {"alertname": "ScaleUpNetworkThroughput"}},
                {"status": "resolved", "labels": {"alertname": "ScaleUpNetworkThroughput"}}
            ]}"#,
        );
        let outcomes = f.classifier.handle(alerts).await;

        assert_eq!(outcomes[0].action, OutcomeAction::Error);
        assert!(outcomes[0].error.is_some());
        assert_eq!(outcomes[1].action, OutcomeAction::IgnoredResolved);
        assert_eq!(
            f.health.status_of(components::RUNTIME).await,
            Some(ComponentStatus::Unhealthy)
        );
    }

    #[tokio::test]
    async fn test_compose_failure_falls_back_and_degrades() {
        let config = ScalingConfig {
            min_replicas: 1,
            max_replicas: 3,
            compose_command: vec!["scale-webhook-no-such-compose".to_string()],
            ..Default::default()
        };
        let f = fixture(config, 1).await;

        let outcomes = f
            .classifier
            .handle(alert("ScaleUpNetworkThroughput", "firing", None))
            .await;
        assert_eq!(outcomes[0].action, OutcomeAction::ScaledUp);
        assert_eq!(f.census.count().await.unwrap(), 2);
        assert_eq!(
            f.health.status_of(components::ORCHESTRATOR).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let f = fixture(imperative_only(1, 3), 1).await;
        assert!(f.classifier.handle(Vec::new()).await.is_empty());
    }
}
