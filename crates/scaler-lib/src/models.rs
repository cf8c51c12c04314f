//! Core data models for the scaler

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A running replica of the managed service, as reported by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedInstance {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    /// Image reference the replica was started from
    pub image: String,
    /// Runtime image identifier, used to look up tags
    pub image_id: String,
    pub labels: HashMap<String, String>,
    /// Mount destinations inside the replica
    pub mounts: Vec<String>,
}

impl ManagedInstance {
    pub fn has_mount(&self, target: &str) -> bool {
        self.mounts.iter().any(|m| m == target)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Host directory bind-mounted into a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
}

/// Everything the runtime needs to start one replica
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub labels: HashMap<String, String>,
    pub env: Vec<(String, String)>,
    pub bind: Option<BindMount>,
    pub restart_always: bool,
    /// Network joined at creation time
    pub network: Option<String>,
}

impl ContainerSpec {
    /// Same spec with the bind mount dropped
    pub fn without_bind(&self) -> Self {
        Self {
            bind: None,
            ..self.clone()
        }
    }
}

/// Result of one reaper call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub ok: bool,
    /// Removed replica name, `min_reached`, or the runtime error text
    pub info: String,
}

impl Removal {
    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            ok: true,
            info: name.into(),
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            info: reason.into(),
        }
    }
}

/// Action reported back to the alert sender for one alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeAction {
    IgnoredResolved,
    Ignored,
    NoChange,
    MinReached,
    KeepLastLowThroughput,
    ScaledUpCompose,
    ScaledDownCompose,
    ScaledUp,
    ScaledDown,
    Error,
}

impl OutcomeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeAction::IgnoredResolved => "ignored_resolved",
            OutcomeAction::Ignored => "ignored",
            OutcomeAction::NoChange => "no_change",
            OutcomeAction::MinReached => "min_reached",
            OutcomeAction::KeepLastLowThroughput => "keep_last_low_throughput",
            OutcomeAction::ScaledUpCompose => "scaled_up_compose",
            OutcomeAction::ScaledDownCompose => "scaled_down_compose",
            OutcomeAction::ScaledUp => "scaled_up",
            OutcomeAction::ScaledDown => "scaled_down",
            OutcomeAction::Error => "error",
        }
    }
}

impl std::fmt::Display for OutcomeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-alert entry of the webhook response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertOutcome {
    pub alert: Option<String>,
    pub action: OutcomeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    /// Measured value that kept the last replica
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<Removal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AlertOutcome {
    pub fn new(alert: Option<String>, action: OutcomeAction) -> Self {
        Self {
            alert,
            action,
            current: None,
            value: None,
            from: None,
            to: None,
            created: None,
            removed: None,
            failures: None,
            error: None,
        }
    }

    pub fn failed(alert: Option<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(alert, OutcomeAction::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_only_present_fields() {
        let mut outcome = AlertOutcome::new(
            Some("ScaleUpNetworkThroughput".to_string()),
            OutcomeAction::NoChange,
        );
        outcome.current = Some(3);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["alert"], "ScaleUpNetworkThroughput");
        assert_eq!(json["action"], "no_change");
        assert_eq!(json["current"], 3);
        assert!(json.get("created").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_action_names_match_serde() {
        for action in [
            OutcomeAction::IgnoredResolved,
            OutcomeAction::KeepLastLowThroughput,
            OutcomeAction::ScaledDownCompose,
            OutcomeAction::Error,
        ] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, action.as_str());
        }
    }

    #[test]
    fn test_spec_without_bind() {
        let spec = ContainerSpec {
            image: "app:1".to_string(),
            labels: HashMap::new(),
            env: vec![("FILES_STORAGE_PATH".to_string(), "/data/files.json".to_string())],
            bind: Some(BindMount {
                source: "/srv".to_string(),
                target: "/data".to_string(),
            }),
            restart_always: true,
            network: Some("monitoring".to_string()),
        };
        let degraded = spec.without_bind();
        assert!(degraded.bind.is_none());
        assert_eq!(degraded.env, spec.env);
        assert_eq!(degraded.network, spec.network);
    }
}
