//! Convergence of the replica count
//!
//! Tries the declarative backend first; if it is missing or fails, the
//! imperative backend does the work replica by replica.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::OutcomeAction;
use crate::orchestration::{ExecutionPath, OrchestrationBackend, ScaleReport};

/// What a convergence did
#[derive(Debug, Clone, PartialEq)]
pub struct Convergence {
    pub from: u32,
    pub to: u32,
    /// Backend that performed the change; `None` for a no-op
    pub path: Option<ExecutionPath>,
    pub report: ScaleReport,
    /// Why the declarative backend was skipped or failed, if it was
    pub fallback_reason: Option<String>,
}

impl Convergence {
    pub fn action(&self) -> OutcomeAction {
        let up = self.to > self.from;
        match (self.path, up) {
            (None, _) => OutcomeAction::NoChange,
            (Some(ExecutionPath::Declarative), true) => OutcomeAction::ScaledUpCompose,
            (Some(ExecutionPath::Declarative), false) => OutcomeAction::ScaledDownCompose,
            (Some(ExecutionPath::Imperative), true) => OutcomeAction::ScaledUp,
            (Some(ExecutionPath::Imperative), false) => OutcomeAction::ScaledDown,
        }
    }
}

#[derive(Clone)]
pub struct Executor {
    declarative: Option<Arc<dyn OrchestrationBackend>>,
    imperative: Arc<dyn OrchestrationBackend>,
}

impl Executor {
    pub fn new(
        declarative: Option<Arc<dyn OrchestrationBackend>>,
        imperative: Arc<dyn OrchestrationBackend>,
    ) -> Self {
        Self {
            declarative,
            imperative,
        }
    }

    pub fn has_declarative(&self) -> bool {
        self.declarative.is_some()
    }

    /// Move the population from `current` to `target`
    pub async fn converge(&self, current: u32, target: u32) -> Result<Convergence> {
        if current == target {
            return Ok(Convergence {
                from: current,
                to: target,
                path: None,
                report: ScaleReport::default(),
                fallback_reason: None,
            });
        }

        let fallback_reason = match &self.declarative {
            Some(backend) => match backend.scale(current, target).await {
                Ok(report) => {
                    info!(from = current, to = target, path = %backend.path(), "Converged");
                    return Ok(Convergence {
                        from: current,
                        to: target,
                        path: Some(backend.path()),
                        report,
                        fallback_reason: None,
                    });
                }
                Err(e) => {
                    warn!(
                        from = current,
                        to = target,
                        error = %e,
                        "Declarative scale failed, falling back to imperative"
                    );
                    Some(e.to_string())
                }
            },
            None => None,
        };

        let report = self.imperative.scale(current, target).await?;
        info!(
            from = current,
            to = target,
            path = %self.imperative.path(),
            created = report.created.len(),
            removed = report.removed.iter().filter(|r| r.ok).count(),
            failures = report.failures.len(),
            "Converged"
        );
        Ok(Convergence {
            from: current,
            to: target,
            path: Some(self.imperative.path()),
            report,
            fallback_reason,
        })
    }
}
