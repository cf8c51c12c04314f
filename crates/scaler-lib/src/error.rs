//! Error types for the scaler

use thiserror::Error;

pub type Result<T, E = ScalerError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ScalerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Census failed: {0}")]
    Census(String),

    #[error("Orchestrator unavailable: {0}")]
    OrchestratorUnavailable(String),

    #[error("Orchestrator command failed: {0}")]
    OrchestratorFailed(String),

    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for ScalerError {
    fn from(err: prometheus::Error) -> Self {
        ScalerError::Metrics(err.to_string())
    }
}

impl ScalerError {
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Runtime(_) => "runtime_error",
            Self::Census(_) => "census_error",
            Self::OrchestratorUnavailable(_) => "orchestrator_unavailable",
            Self::OrchestratorFailed(_) => "orchestrator_failed",
            Self::Provision(_) => "provision_error",
            Self::Metrics(_) => "metrics_error",
        }
    }
}
