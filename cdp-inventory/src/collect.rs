//! The `collect` and `list` commands.
//!
//! `collect` is the only path that resolves `env:VAR` credential references:
//! the request comes from the operator running the binary, so reading the
//! local environment on its behalf is expected.

use anyhow::{Context, Result};
use cdp_inventory_core::adapters::AdapterRegistry;
use cdp_inventory_core::models::{InventoryRequest, InventoryResponse};
use cdp_inventory_core::InventoryAggregator;
use std::fmt::Write as _;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::CollectArgs;
use crate::output;

/// Reads and parses a request from a file, or stdin for `-`.
///
/// # Errors
/// Fails when the source cannot be read or does not contain a request body.
pub async fn read_request(source: &Path) -> Result<InventoryRequest> {
    let body = if source.as_os_str() == "-" {
        let mut body = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut body)
            .await
            .context("Failed to read request from stdin")?;
        body
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read request file {}", source.display()))?
    };

    Ok(InventoryRequest::from_slice(&body)?)
}

/// Replaces `env:VAR` credential values in every connection.
///
/// # Errors
/// Fails on the first reference to an unset variable.
pub fn resolve_env_references(request: &mut InventoryRequest) -> Result<()> {
    if let Some(user) = request.user.as_mut() {
        for connection in &mut user.connections {
            connection.resolve_env_references()?;
        }
    }
    Ok(())
}

/// Runs the `collect` command end to end.
///
/// Per-connection failures land in `_errors` and still count as success.
///
/// # Errors
/// Fails on unreadable input, an invalid request, or output that cannot be
/// validated or written.
pub async fn run_collect(args: &CollectArgs, aggregator: &InventoryAggregator) -> Result<()> {
    let mut request = read_request(&args.request).await?;
    resolve_env_references(&mut request)?;

    let response = aggregator.run_request(request).await?;
    report_summary(&response);

    let rendered = output::render_response(&response, args.compact)?;
    output::write_output(&rendered, args.output.as_deref()).await
}

fn report_summary(response: &InventoryResponse) {
    info!(
        "✓ Inventory completed: {} inventories, {} errors",
        response.inventory_count(),
        response.error_count()
    );
    for (platform, message) in &response.errors {
        tracing::warn!("{platform}: {message}");
    }
}

/// A supported platform as shown by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSummary {
    /// Connection discriminator
    pub key: &'static str,
    /// Label used in response keys
    pub label: &'static str,
    /// Credential fields the connection must carry
    pub credential_fields: &'static [&'static str],
}

/// Describes every registered platform.
///
/// # Errors
/// Fails when an adapter cannot be constructed.
pub async fn list_platforms(registry: &AdapterRegistry) -> Result<Vec<PlatformSummary>> {
    let mut summaries = Vec::new();
    for platform in registry.platforms() {
        let adapter = registry.resolve(platform).await?;
        let descriptor = adapter.platform();
        summaries.push(PlatformSummary {
            key: descriptor.key,
            label: descriptor.label,
            credential_fields: descriptor.credential_kind.required_fields(),
        });
    }
    Ok(summaries)
}

/// Renders the `list` output.
pub fn render_platform_list(platforms: &[PlatformSummary]) -> String {
    let mut out = String::from("Supported Platforms:\n\n");
    for platform in platforms {
        let _ = writeln!(out, "{}:", platform.label);
        let _ = writeln!(out, "  Connection: {{\"name\": \"{}\", ...}}", platform.key);
        let _ = writeln!(out, "  Credential: {}", platform.credential_fields.join(", "));
        out.push('\n');
    }
    out.push_str("Credential values may be written as \"env:VARIABLE\" in request files.\n");
    out
}
