//! HTTP API: alert intake, census, health checks and Prometheus metrics

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scaler_lib::{
    AlertBatch, AlertClassifier, AlertOutcome, Census, ComponentStatus, HealthRegistry,
    ManagedInstance, ScalerMetrics,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "scale-webhook";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service_label: String,
    pub census: Census,
    pub classifier: AlertClassifier,
    pub health_registry: HealthRegistry,
    pub metrics: ScalerMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertResponse {
    pub result: Vec<AlertOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicasResponse {
    pub service: String,
    pub count: usize,
    pub instances: Vec<ManagedInstance>,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn index() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

/// Alertmanager webhook receiver
async fn alert(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(batch) = AlertBatch::parse(&body) else {
        warn!(bytes = body.len(), "Rejected alert payload");
        return error_body(StatusCode::BAD_REQUEST, "bad payload");
    };

    let alerts = batch.into_alerts();
    info!(alerts = alerts.len(), "Received alert batch");
    let result = state.classifier.handle(alerts).await;

    (StatusCode::OK, Json(AlertResponse { result })).into_response()
}

/// Live census of the managed service
async fn replicas(State(state): State<Arc<AppState>>) -> Response {
    match state.census.list_managed().await {
        Ok(instances) => {
            state.metrics.set_replicas(instances.len() as u32);
            Json(ReplicasResponse {
                service: state.service_label.clone(),
                count: instances.len(),
                instances,
            })
            .into_response()
        }
        Err(e) => error_body(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once bootstrap has run
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/alert", post(alert))
        .route("/replicas", get(replicas))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
