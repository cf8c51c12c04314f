//! Inbound Alertmanager webhook payloads
//!
//! Handles:
//! - Lenient parsing of the Alertmanager webhook format
//! - Status detection (`status`, falling back to `state`)
//! - Extraction of the measured value from the `value` annotation, or a
//!   `value` field on the alert itself

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::policy::AlertKind;

/// Annotation carrying the measured metric value
pub const VALUE_ANNOTATION: &str = "value";

/// Alert status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert status (firing or resolved)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Older senders use `state` instead of `status`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Alert labels, `alertname` among them
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Alert annotations with details. Values are kept as raw JSON so a
    /// number or `null` in one alert does not reject the batch.
    #[serde(default)]
    pub annotations: HashMap<String, serde_json::Value>,
    /// Measured value some senders put on the alert instead of annotating it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Start time in RFC3339 format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    /// End time (empty for firing alerts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    /// Generator URL for linking back
    #[serde(
        default,
        rename = "generatorURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub generator_url: Option<String>,
}

/// Alertmanager webhook payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertBatch {
    #[serde(default)]
    pub alerts: Option<Vec<AlertmanagerAlert>>,
}

impl AlertBatch {
    /// Parse a request body
    ///
    /// Returns `None` for anything that is not a non-empty JSON object with
    /// a well-formed alert list. A missing `alerts` key is an empty batch.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        match &value {
            serde_json::Value::Object(map) if !map.is_empty() => {}
            _ => return None,
        }
        serde_json::from_value(value).ok()
    }

    pub fn into_alerts(self) -> Vec<AlertmanagerAlert> {
        self.alerts.unwrap_or_default()
    }
}

/// What the scaler needs from one alert
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSignal {
    pub name: Option<String>,
    pub kind: AlertKind,
    pub status: AlertStatus,
    pub measured_value: Option<f64>,
}

impl AlertmanagerAlert {
    pub fn alertname(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str)
    }

    /// `status` wins over `state`; anything but "resolved" counts as firing
    pub fn alert_status(&self) -> AlertStatus {
        let raw = self.status.as_deref().or(self.state.as_deref());
        match raw {
            Some(s) if s.eq_ignore_ascii_case("resolved") => AlertStatus::Resolved,
            _ => AlertStatus::Firing,
        }
    }

    /// The `value` annotation, else the alert-level `value`
    pub fn measured_value(&self) -> Option<f64> {
        self.annotations
            .get(VALUE_ANNOTATION)
            .and_then(json_measured_value)
            .or_else(|| self.value.as_ref().and_then(json_measured_value))
    }

    pub fn signal(&self) -> AlertSignal {
        let name = self.alertname().map(str::to_string);
        AlertSignal {
            kind: AlertKind::from_name(name.as_deref().unwrap_or_default()),
            name,
            status: self.alert_status(),
            measured_value: self.measured_value(),
        }
    }
}

/// Parse an annotation value such as `"412.5"` or `"1.2e+03"`
///
/// Unparseable or non-finite values are treated as absent.
pub fn parse_measured_value(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Numbers are taken as is, strings go through [`parse_measured_value`]
fn json_measured_value(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(n) => n.as_f64().filter(|value| value.is_finite()),
        serde_json::Value::String(s) => parse_measured_value(s),
        _ => None,
    }
}
