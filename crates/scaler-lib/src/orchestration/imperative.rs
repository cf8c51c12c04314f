//! Imperative scaling, one replica at a time

use tracing::warn;

use super::{async_trait, ExecutionPath, OrchestrationBackend, ScaleReport};
use crate::error::Result;
use crate::provisioner::Provisioner;
use crate::reaper::Reaper;

/// Repeats provisioner or reaper calls `|target - current|` times
///
/// Every call runs regardless of earlier failures, so partial success is
/// reported as such and nothing is rolled back.
#[derive(Clone)]
pub struct ImperativeBackend {
    provisioner: Provisioner,
    reaper: Reaper,
}

impl ImperativeBackend {
    pub fn new(provisioner: Provisioner, reaper: Reaper) -> Self {
        Self {
            provisioner,
            reaper,
        }
    }
}

#[async_trait]
impl OrchestrationBackend for ImperativeBackend {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::Imperative
    }

    async fn scale(&self, current: u32, target: u32) -> Result<ScaleReport> {
        let mut report = ScaleReport::default();

        if target > current {
            for _ in current..target {
                match self.provisioner.create().await {
                    Ok(instance) => report.created.push(instance.name),
                    Err(e) => {
                        warn!(error = %e, "Replica creation failed");
                        report.failures.push(e.to_string());
                    }
                }
            }
        } else {
            for _ in target..current {
                report.removed.push(self.reaper.remove_one().await);
            }
        }

        Ok(report)
    }
}
