//! Observability for the scaler
//!
//! Provides:
//! - Prometheus metrics (alert outcomes, convergences, replica lifecycle, latency)
//! - Structured JSON logging of scaling events with tracing

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::{info, warn};

use crate::error::Result;
use crate::executor::Convergence;
use crate::models::AlertOutcome;

/// Histogram buckets for alert handling latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

const NAMESPACE: &str = "scale_webhook";

/// Scaler metrics for Prometheus exposition
///
/// Clones share the same registry and collectors.
#[derive(Clone)]
pub struct ScalerMetrics {
    registry: Registry,
    alerts_total: IntCounterVec,
    convergences_total: IntCounterVec,
    instances_created: IntCounter,
    instance_create_failures: IntCounter,
    instances_removed: IntCounter,
    replicas: IntGauge,
    alert_latency_seconds: Histogram,
}

impl ScalerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let alerts_total = IntCounterVec::new(
            Opts::new("alerts_total", "Alerts handled, by outcome action").namespace(NAMESPACE),
            &["action"],
        )?;
        let convergences_total = IntCounterVec::new(
            Opts::new("convergences_total", "Replica count changes, by path and direction")
                .namespace(NAMESPACE),
            &["path", "direction"],
        )?;
        let instances_created = IntCounter::with_opts(
            Opts::new("instances_created_total", "Replicas created imperatively")
                .namespace(NAMESPACE),
        )?;
        let instance_create_failures = IntCounter::with_opts(
            Opts::new("instance_create_failures_total", "Replica creations that failed")
                .namespace(NAMESPACE),
        )?;
        let instances_removed = IntCounter::with_opts(
            Opts::new("instances_removed_total", "Replicas stopped and removed imperatively")
                .namespace(NAMESPACE),
        )?;
        let replicas = IntGauge::with_opts(
            Opts::new("replicas", "Replica count seen by the last census").namespace(NAMESPACE),
        )?;
        let alert_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("alert_handling_seconds", "Time spent handling one alert")
                .namespace(NAMESPACE)
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(alerts_total.clone()))?;
        registry.register(Box::new(convergences_total.clone()))?;
        registry.register(Box::new(instances_created.clone()))?;
        registry.register(Box::new(instance_create_failures.clone()))?;
        registry.register(Box::new(instances_removed.clone()))?;
        registry.register(Box::new(replicas.clone()))?;
        registry.register(Box::new(alert_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            alerts_total,
            convergences_total,
            instances_created,
            instance_create_failures,
            instances_removed,
            replicas,
            alert_latency_seconds,
        })
    }

    pub fn record_outcome(&self, outcome: &AlertOutcome) {
        self.alerts_total
            .with_label_values(&[outcome.action.as_str()])
            .inc();
    }

    pub fn record_convergence(&self, convergence: &Convergence) {
        let Some(path) = convergence.path else {
            return;
        };
        let direction = if convergence.to > convergence.from {
            "up"
        } else {
            "down"
        };
        self.convergences_total
            .with_label_values(&[&path.to_string(), direction])
            .inc();

        let report = &convergence.report;
        self.instances_created.inc_by(report.created.len() as u64);
        self.instance_create_failures
            .inc_by(report.failures.len() as u64);
        self.instances_removed
            .inc_by(report.removed.iter().filter(|r| r.ok).count() as u64);
    }

    pub fn set_replicas(&self, count: u32) {
        self.replicas.set(i64::from(count));
    }

    pub fn observe_alert_latency(&self, duration_secs: f64) {
        self.alert_latency_seconds.observe(duration_secs);
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Structured logger for scaling events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, port: u16, min: u32, max: u32) {
        info!(
            event = "webhook_started",
            service = %self.service,
            version = %version,
            port = port,
            min_replicas = min,
            max_replicas = max,
            "Scale webhook started"
        );
    }

    pub fn log_decision(&self, alert: &str, action: &str, from: u32, to: u32) {
        info!(
            event = "scale_decision",
            service = %self.service,
            alert = %alert,
            action = %action,
            from = from,
            to = to,
            "Scale decision made"
        );
    }

    pub fn log_convergence(&self, alert: &str, convergence: &Convergence) {
        let report = &convergence.report;
        let path = convergence
            .path
            .map(|p| p.to_string())
            .unwrap_or_else(|| "none".to_string());

        if report.failures.is_empty() && report.removed.iter().all(|r| r.ok) {
            info!(
                event = "scale_converged",
                service = %self.service,
                alert = %alert,
                path = %path,
                from = convergence.from,
                to = convergence.to,
                fallback_reason = ?convergence.fallback_reason,
                "Replica count converged"
            );
        } else {
            warn!(
                event = "scale_converged",
                service = %self.service,
                alert = %alert,
                path = %path,
                from = convergence.from,
                to = convergence.to,
                created = report.created.len(),
                failures = ?report.failures,
                removed = ?report.removed,
                "Replica count partially converged"
            );
        }
    }

    pub fn log_bootstrap(&self, before: u32, after: u32, min: u32) {
        if after >= min {
            info!(
                event = "bootstrap_completed",
                service = %self.service,
                before = before,
                after = after,
                min_replicas = min,
                "Bootstrap reconciliation completed"
            );
        } else {
            warn!(
                event = "bootstrap_completed",
                service = %self.service,
                before = before,
                after = after,
                min_replicas = min,
                "Bootstrap finished below the minimum"
            );
        }
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "webhook_shutdown",
            service = %self.service,
            reason = %reason,
            "Scale webhook shutting down"
        );
    }
}
