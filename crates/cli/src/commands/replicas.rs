//! `scalectl replicas`

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ReplicaList};
use crate::output::{format_timestamp, print_json, print_warning, short_id, OutputFormat};

#[derive(Tabled)]
struct ReplicaRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Mounts")]
    mounts: String,
}

pub async fn list_replicas(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let list: ReplicaList = client.get("replicas").await?;

    match format {
        OutputFormat::Json => print_json(&list)?,
        OutputFormat::Table => {
            println!(
                "{} {} ({} running)",
                "Replicas of".bold(),
                list.service.cyan(),
                list.count
            );

            if list.instances.is_empty() {
                print_warning("No replicas running");
                return Ok(());
            }

            let rows: Vec<ReplicaRow> = list
                .instances
                .iter()
                .map(|r| ReplicaRow {
                    id: short_id(&r.id).to_string(),
                    name: r.name.clone(),
                    image: r.image.clone(),
                    created: format_timestamp(&r.created),
                    mounts: if r.mounts.is_empty() {
                        "none".yellow().to_string()
                    } else {
                        r.mounts.join(", ")
                    },
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
