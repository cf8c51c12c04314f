//! Scaler library for the alert-driven replica webhook
//!
//! This crate provides the core functionality for:
//! - Counting the live replicas of the managed service (census)
//! - Turning inbound alerts into scaling decisions (policy)
//! - Creating and removing replicas (provisioner, reaper)
//! - Converging towards a target through compose or the runtime API
//! - Health checks and observability

pub mod alerts;
pub mod bootstrap;
pub mod census;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestration;
pub mod policy;
pub mod provisioner;
pub mod reaper;
pub mod runtime;

pub use alerts::{AlertBatch, AlertSignal, AlertStatus, AlertmanagerAlert};
pub use bootstrap::{BootstrapReconciler, BootstrapReport};
pub use census::Census;
pub use classifier::AlertClassifier;
pub use config::ScalingConfig;
pub use error::{Result, ScalerError};
pub use executor::{Convergence, Executor};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use orchestration::{ComposeBackend, ImperativeBackend, OrchestrationBackend};
pub use policy::{AlertKind, PolicyAction, ScaleBounds, ScaleDecision};
pub use provisioner::Provisioner;
pub use reaper::Reaper;
pub use runtime::{create_runtime, ContainerRuntime, DockerRuntime, InMemoryRuntime, RuntimeKind};
