//! Response rendering and writing.
//!
//! A response is always validated before it is rendered, so nothing that
//! fails the output schema or the secret scan reaches a file or stdout.

use anyhow::{Context, Result};
use cdp_inventory_core::models::InventoryResponse;
use cdp_inventory_core::validation::validate_response;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Validates a response and renders it as JSON.
///
/// # Errors
/// Fails when the response does not pass output validation.
pub fn render_response(response: &InventoryResponse, compact: bool) -> Result<String> {
    let value = validate_response(response).context("Inventory output failed validation")?;
    tracing::debug!("Output validation passed");

    let rendered = if compact {
        serde_json::to_string(&value)
    } else {
        serde_json::to_string_pretty(&value)
    }
    .context("Failed to serialize inventory output")?;
    Ok(rendered)
}

/// Writes rendered output to a file, or to stdout when no path is given.
///
/// # Errors
/// Fails when the file or stdout cannot be written.
pub async fn write_output(rendered: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, format!("{rendered}\n"))
                .await
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            tracing::info!("✓ Inventory saved to {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(rendered.as_bytes())
                .await
                .context("Failed to write to stdout")?;
            stdout.write_all(b"\n").await.context("Failed to write to stdout")?;
            stdout.flush().await.context("Failed to flush stdout")?;
        }
    }
    Ok(())
}
