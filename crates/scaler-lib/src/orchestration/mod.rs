//! Orchestration backends
//!
//! Two ways to move the replica count:
//! - [`ComposeBackend`]: one declarative `docker-compose up --scale` call
//! - [`ImperativeBackend`]: one provisioner/reaper call per replica
//!
//! The executor only sees [`OrchestrationBackend`].

mod compose;
mod imperative;


pub use compose::ComposeBackend;
pub use imperative::ImperativeBackend;

use serde::Serialize;

use crate::error::Result;
use crate::models::Removal;

pub use async_trait::async_trait;

/// How a backend changes the population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Declarative,
    Imperative,
}

impl std::fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPath::Declarative => write!(f, "declarative"),
            ExecutionPath::Imperative => write!(f, "imperative"),
        }
    }
}

/// Per-replica results of a scale call
///
/// Empty for the declarative backend, which reports success as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleReport {
    pub created: Vec<String>,
    pub removed: Vec<Removal>,
    pub failures: Vec<String>,
}

/// Capability to move the replica count from `current` to `target`
#[async_trait]
pub trait OrchestrationBackend: Send + Sync {
    fn path(&self) -> ExecutionPath;

    /// Declarative backends fail as a whole; imperative ones report
    /// per-replica failures inside the [`ScaleReport`].
    async fn scale(&self, current: u32, target: u32) -> Result<ScaleReport>;
}
