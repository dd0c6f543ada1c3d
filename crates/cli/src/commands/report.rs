//! Report and size history commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, MaxSize, Snapshot, TriggerResponse};
use crate::output::{
    format_bytes, format_unix, print_info, print_json, print_success, print_table, print_warning,
    OutputFormat,
};

/// Row for the snapshot table
#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "Total Size")]
    total_size: String,
    #[tabled(rename = "Bytes")]
    bytes: u64,
    #[tabled(rename = "Objects")]
    objects: u64,
}

/// Trigger a chart render and upload
pub async fn trigger_plot(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: TriggerResponse = client.post("plot").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.body.starts_with("No data") {
                print_warning(&result.body);
            } else {
                print_success(&result.body);
            }
        }
    }

    Ok(())
}

/// List snapshots taken in the last `since` seconds
pub async fn list_snapshots(client: &ApiClient, since: u64, format: OutputFormat) -> Result<()> {
    let snapshots: Vec<Snapshot> = client.get(&format!("snapshots?since={}", since)).await?;

    match format {
        OutputFormat::Json => print_json(&snapshots)?,
        OutputFormat::Table => {
            println!("{}", format!("Size Snapshots (last {}s)", since).bold());
            println!("{}", "=".repeat(60));

            if snapshots.is_empty() {
                print_warning("No snapshots in this window");
                return Ok(());
            }

            let count = snapshots.len();
            let rows: Vec<SnapshotRow> = snapshots
                .into_iter()
                .map(|s| SnapshotRow {
                    time: format_unix(s.timestamp),
                    total_size: format_bytes(s.total_size),
                    bytes: s.total_size,
                    objects: s.object_count,
                })
                .collect();

            print_table(rows);
            println!("\nTotal: {} snapshots", count);
        }
    }

    Ok(())
}

/// Show the largest size ever recorded
pub async fn show_max(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: MaxSize = client.get("snapshots/max").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.max_size == 0 {
                print_info(&format!("No size recorded yet for {}", result.source_name.cyan()));
            } else {
                println!(
                    "Max size of {}: {} ({} bytes)",
                    result.source_name.cyan(),
                    format_bytes(result.max_size).bold(),
                    result.max_size
                );
            }
        }
    }

    Ok(())
}
