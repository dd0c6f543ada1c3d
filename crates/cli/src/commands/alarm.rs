//! Alarm commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{AlarmEvaluation, ApiClient};
use crate::output::{
    color_status, format_delta, format_unix, print_info, print_json, print_warning, OutputFormat,
};

/// Evaluate the growth alarm now
pub async fn evaluate(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: AlarmEvaluation = client.post("alarm").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let state = match (result.fired, result.breached) {
                (true, _) => "fired",
                (false, true) => "breached",
                (false, false) => "normal",
            };

            println!("{}", "Alarm Evaluation".bold());
            println!("{}", "=".repeat(50));
            println!("Bucket:        {}", result.source_name.cyan());
            println!("Evaluated at:  {}", format_unix(result.evaluated_at));
            println!("Window sum:    {}", format_delta(result.window_sum));
            println!("Samples:       {}", result.sample_count);
            println!("State:         {}", color_status(state));

            match result.eviction {
                Some(eviction) if eviction.result == "evicted" => {
                    print_warning(&format!(
                        "Evicted {} ({} bytes)",
                        eviction.key.unwrap_or_default(),
                        eviction.size.unwrap_or_default()
                    ));
                }
                Some(_) => print_info("Bucket was empty, nothing evicted"),
                None => {}
            }
        }
    }

    Ok(())
}
