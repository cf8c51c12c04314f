//! Container runtime access
//!
//! The scaler talks to the runtime only through [`ContainerRuntime`]. The
//! Docker Engine implementation is used in production; the in-memory one
//! backs the dry-run mode and the test suites.

mod docker;
mod memory;

pub use docker::DockerRuntime;
pub use memory::InMemoryRuntime;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{ContainerSpec, ManagedInstance};

pub use async_trait::async_trait;

/// Operations the scaler needs from a container runtime
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Running containers carrying `key=value` as a label
    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ManagedInstance>>;

    /// Repository tags of an image, most specific first
    async fn image_tags(&self, image_id: &str) -> Result<Vec<String>>;

    /// Create and start a container
    async fn run(&self, spec: &ContainerSpec) -> Result<ManagedInstance>;

    /// Attach a running container to an additional network
    async fn connect_network(&self, network: &str, container_id: &str) -> Result<()>;

    /// Stop a container, killing it after `grace`
    async fn stop(&self, container_id: &str, grace: Duration) -> Result<()>;

    async fn remove(&self, container_id: &str) -> Result<()>;

    /// Check that the runtime answers at all
    async fn ping(&self) -> Result<()>;
}

/// Which runtime implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    #[default]
    Docker,
    Memory,
}

/// Create the runtime selected by configuration
pub fn create_runtime(kind: RuntimeKind) -> Result<Arc<dyn ContainerRuntime>> {
    match kind {
        RuntimeKind::Docker => {
            tracing::info!("Using Docker Engine runtime");
            Ok(Arc::new(DockerRuntime::connect_local()?))
        }
        RuntimeKind::Memory => {
            tracing::warn!("Using in-memory runtime, no containers will be started");
            Ok(Arc::new(InMemoryRuntime::new()))
        }
    }
}
