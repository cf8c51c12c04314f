//! `scalectl status`

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthReport, Readiness, ServiceInfo};
use crate::output::{color_status, print_json, print_warning, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct StatusReport {
    service: ServiceInfo,
    health: HealthReport,
    readiness: Readiness,
}

pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let service: ServiceInfo = client.get("").await?;
    let (_, health): (u16, HealthReport) = client.get_with_status("healthz").await?;
    let (_, readiness): (u16, Readiness) = client.get_with_status("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&StatusReport {
            service,
            health,
            readiness,
        })?,
        OutputFormat::Table => {
            println!("{}", "Scale Webhook".bold());
            println!("{}", "=".repeat(40));
            println!("URL:     {}", client.base_url().as_str().cyan());
            println!("Service: {} ({})", service.service, color_status(&service.status));
            println!("Health:  {}", color_status(&health.status));
            println!(
                "Ready:   {}",
                if readiness.ready {
                    "yes".green().to_string()
                } else {
                    "no".red().to_string()
                }
            );
            println!();

            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
