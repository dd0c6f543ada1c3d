//! Object upload and delete commands

use std::path::Path;

use anyhow::{Context, Result};

use crate::client::ApiClient;
use crate::output::{format_bytes, print_json, print_success, OutputFormat};

/// Content type guessed from the file extension
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("txt") | Some("log") => "text/plain",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Object key for an upload: the explicit key, or the file name
pub fn object_key(path: &Path, key: Option<String>) -> Result<String> {
    match key {
        Some(key) => Ok(key),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("Cannot derive an object key from the file path"),
    }
}

/// Upload a local file into the source bucket
pub async fn upload(
    client: &ApiClient,
    file: &Path,
    key: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let key = object_key(file, key)?;
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let size = bytes.len() as u64;

    client
        .put_bytes(&format!("objects/{}", key), bytes, content_type_for(file))
        .await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "key": key, "size": size }))?,
        OutputFormat::Table => {
            print_success(&format!("Uploaded {} ({})", key, format_bytes(size)))
        }
    }

    Ok(())
}

/// Delete an object from the source bucket
pub async fn delete(client: &ApiClient, key: &str, format: OutputFormat) -> Result<()> {
    client.delete(&format!("objects/{}", key)).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "key": key, "deleted": true }))?,
        OutputFormat::Table => print_success(&format!("Deleted {}", key)),
    }

    Ok(())
}
