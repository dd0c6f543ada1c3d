//! Service health commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthReport, Readiness};
use crate::output::{color_status, format_unix, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last Check (UTC)")]
    last_check: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show component health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthReport) = client.get_status("healthz").await?;
    let (_, readiness): (_, Readiness) = client.get_status("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            let ready = if readiness.ready { "ready" } else { "not ready" };

            println!("{}", "Monitor Health".bold());
            println!("{}", "=".repeat(50));
            println!("Overall:    {}", color_status(&health.status));
            println!("Readiness:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:     {}", reason.dimmed());
            }
            println!();

            let mut rows: Vec<ComponentRow> = health
                .components
                .into_iter()
                .map(|(name, c)| ComponentRow {
                    name,
                    status: color_status(&c.status),
                    last_check: format_unix(c.last_check_timestamp),
                    message: c.message.unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));

            print_table(rows);
        }
    }

    Ok(())
}
