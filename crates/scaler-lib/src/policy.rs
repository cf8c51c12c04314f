//! Scaling decision policy
//!
//! Pure functions: no I/O, no clock. Given the alert, the live replica
//! count and the configured bounds they produce a target count and an
//! action category. Targets are clamped to `[min, max]`, so repeating an
//! alert converges instead of overshooting.

use serde::{Deserialize, Serialize};

use crate::alerts::AlertStatus;

pub const SCALE_UP_ALERT: &str = "ScaleUpNetworkThroughput";
pub const SCALE_DOWN_ALERT: &str = "ScaleDownNetworkThroughput";

/// Alerts the scaler reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertKind {
    ScaleUpNetworkThroughput,
    ScaleDownNetworkThroughput,
    Unrecognized(String),
}

impl AlertKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            SCALE_UP_ALERT => AlertKind::ScaleUpNetworkThroughput,
            SCALE_DOWN_ALERT => AlertKind::ScaleDownNetworkThroughput,
            other => AlertKind::Unrecognized(other.to_string()),
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::ScaleUpNetworkThroughput => write!(f, "{}", SCALE_UP_ALERT),
            AlertKind::ScaleDownNetworkThroughput => write!(f, "{}", SCALE_DOWN_ALERT),
            AlertKind::Unrecognized(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Action category chosen by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    IgnoredResolved,
    Ignored,
    NoChange,
    MinReached,
    KeepLastLowThroughput,
    ScaleUp,
    ScaleDown,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::IgnoredResolved => "ignored_resolved",
            PolicyAction::Ignored => "ignored",
            PolicyAction::NoChange => "no_change",
            PolicyAction::MinReached => "min_reached",
            PolicyAction::KeepLastLowThroughput => "keep_last_low_throughput",
            PolicyAction::ScaleUp => "scale_up",
            PolicyAction::ScaleDown => "scale_down",
        }
    }
}

/// Bounds the policy clamps to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBounds {
    pub min: u32,
    pub max: u32,
    pub step: u32,
    /// A lone replica is kept while the measured value stays below this
    pub low_throughput_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDecision {
    pub action: PolicyAction,
    pub from: u32,
    pub to: u32,
}

impl ScaleDecision {
    fn unchanged(action: PolicyAction, current: u32) -> Self {
        Self {
            action,
            from: current,
            to: current,
        }
    }

    /// Direction of the change, if the decision changes anything
    pub fn direction(&self) -> Option<Direction> {
        match self.action {
            PolicyAction::ScaleUp => Some(Direction::Up),
            PolicyAction::ScaleDown => Some(Direction::Down),
            _ => None,
        }
    }
}

/// First pass over an alert, before the replica count is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triage {
    /// Nothing to do; the census need not be consulted
    Ignore(PolicyAction),
    Evaluate(Direction),
}

pub fn triage(kind: &AlertKind, status: AlertStatus) -> Triage {
    if status == AlertStatus::Resolved {
        return Triage::Ignore(PolicyAction::IgnoredResolved);
    }
    match kind {
        AlertKind::ScaleUpNetworkThroughput => Triage::Evaluate(Direction::Up),
        AlertKind::ScaleDownNetworkThroughput => Triage::Evaluate(Direction::Down),
        AlertKind::Unrecognized(_) => Triage::Ignore(PolicyAction::Ignored),
    }
}

/// Target count for a firing scale alert
pub fn decide(
    direction: Direction,
    current: u32,
    measured: Option<f64>,
    bounds: &ScaleBounds,
) -> ScaleDecision {
    match direction {
        Direction::Up => {
            let target = current.saturating_add(bounds.step).min(bounds.max);
            if target <= current {
                ScaleDecision::unchanged(PolicyAction::NoChange, current)
            } else {
                ScaleDecision {
                    action: PolicyAction::ScaleUp,
                    from: current,
                    to: target,
                }
            }
        }
        Direction::Down => {
            // Checked before the minimum: a lone replica under low but
            // nonzero load is reported as kept, even when min also holds it.
            if current == 1
                && measured.is_some_and(|value| value < bounds.low_throughput_threshold)
            {
                return ScaleDecision::unchanged(PolicyAction::KeepLastLowThroughput, current);
            }
            if current <= bounds.min {
                return ScaleDecision::unchanged(PolicyAction::MinReached, current);
            }
            let target = current.saturating_sub(bounds.step).max(bounds.min);
            if target >= current {
                ScaleDecision::unchanged(PolicyAction::NoChange, current)
            } else {
                ScaleDecision {
                    action: PolicyAction::ScaleDown,
                    from: current,
                    to: target,
                }
            }
        }
    }
}

/// Full policy: triage followed by the decision for `current`
pub fn evaluate(
    kind: &AlertKind,
    status: AlertStatus,
    current: u32,
    measured: Option<f64>,
    bounds: &ScaleBounds,
) -> ScaleDecision {
    match triage(kind, status) {
        Triage::Ignore(action) => ScaleDecision::unchanged(action, current),
        Triage::Evaluate(direction) => decide(direction, current, measured, bounds),
    }
}
