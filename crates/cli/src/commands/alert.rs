//! `scalectl alert`: send a synthetic alert to the webhook

use std::collections::BTreeMap;

use anyhow::Result;
use tabled::Tabled;

use crate::client::{Alert, AlertBatch, AlertOutcome, AlertResult, ApiClient};
use crate::output::{color_status, print_error, print_json, print_success, OutputFormat};

const SCALE_UP_ALERT: &str = "ScaleUpNetworkThroughput";
const SCALE_DOWN_ALERT: &str = "ScaleDownNetworkThroughput";

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Alert")]
    alert: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// `up` and `down` expand to the throughput alerts; anything else is sent as is
pub fn alert_name(name: &str) -> &str {
    match name {
        "up" => SCALE_UP_ALERT,
        "down" => SCALE_DOWN_ALERT,
        other => other,
    }
}

pub fn build_batch(name: &str, resolved: bool, value: Option<&str>) -> AlertBatch {
    let mut annotations = BTreeMap::new();
    if let Some(value) = value {
        annotations.insert("value".to_string(), value.to_string());
    }

    AlertBatch {
        alerts: vec![Alert {
            status: if resolved { "resolved" } else { "firing" }.to_string(),
            labels: BTreeMap::from([("alertname".to_string(), alert_name(name).to_string())]),
            annotations,
        }],
    }
}

fn replicas(outcome: &AlertOutcome) -> String {
    match (outcome.from, outcome.to, outcome.current) {
        (Some(from), Some(to), _) => format!("{} -> {}", from, to),
        (_, _, Some(current)) => current.to_string(),
        _ => "-".to_string(),
    }
}

fn details(outcome: &AlertOutcome) -> String {
    let mut parts = Vec::new();
    if let Some(created) = &outcome.created {
        parts.push(format!("created: {}", created.join(", ")));
    }
    if let Some(removed) = &outcome.removed {
        let items: Vec<String> = removed
            .iter()
            .map(|r| {
                if r.ok {
                    r.info.clone()
                } else {
                    format!("{} (refused)", r.info)
                }
            })
            .collect();
        parts.push(format!("removed: {}", items.join(", ")));
    }
    if let Some(failures) = &outcome.failures {
        parts.push(format!("failures: {}", failures.join("; ")));
    }
    if let Some(value) = outcome.value {
        parts.push(format!("value: {}", value));
    }
    if let Some(error) = &outcome.error {
        parts.push(format!("error: {}", error));
    }
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(" | ")
    }
}

pub async fn send_alert(
    client: &ApiClient,
    name: &str,
    resolved: bool,
    value: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let batch = build_batch(name, resolved, value);
    let result: AlertResult = client.post("alert", &batch).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<OutcomeRow> = result
                .result
                .iter()
                .map(|o| OutcomeRow {
                    alert: o.alert.clone().unwrap_or_else(|| "-".to_string()),
                    action: color_status(&o.action),
                    replicas: replicas(o),
                    details: details(o),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            if result.result.iter().any(|o| o.action == "error") {
                print_error("The webhook could not handle the alert");
            } else {
                print_success("Alert delivered");
            }
        }
    }

    Ok(())
}
