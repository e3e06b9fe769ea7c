//! Fan-out of one inventory request across its connections.
//!
//! Every connection runs its own pipeline (resolve adapter, build
//! credential, authenticate, discover, profile) under its own deadline.
//! Pipelines run concurrently up to `AggregatorConfig::max_concurrency`
//! and are merged in connection order, so a later connection for the same
//! platform deterministically replaces an earlier one's entries.
//!
//! Only request validation aborts the whole request; every other failure
//! becomes one `_errors` entry for its connection.

#[cfg(test)]
mod tests;

use crate::adapters::{AdapterRegistry, AdapterSettings, AggregatorConfig};
use crate::error::{InventoryError, Result};
use crate::models::{Connection, InventoryRequest, InventoryResponse, PlatformInventory, User};
use crate::options::Options;
use crate::security::Credential;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

/// Result of one connection's pipeline.
struct PipelineOutcome {
    /// Position of the connection in the request
    index: usize,
    /// Key for `_errors`: the platform label, or the raw discriminator when unresolved
    platform: String,
    result: Result<Vec<PlatformInventory>>,
}

/// Runs inventory requests against a shared adapter registry.
///
/// # Example
/// ```rust,no_run
/// use cdp_inventory_core::aggregator::InventoryAggregator;
/// use cdp_inventory_core::models::InventoryRequest;
///
/// # async fn example() -> cdp_inventory_core::Result<()> {
/// let aggregator = InventoryAggregator::with_default_platforms(
///     Default::default(),
///     Default::default(),
/// );
/// let request = InventoryRequest::from_slice(br#"{"user": {"connections": [
///     {"name": "hubspot", "access_token": "pat-na1-..."}
/// ]}}"#)?;
/// let response = aggregator.run_request(request).await?;
/// println!("{}", serde_json::to_string_pretty(&response).unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InventoryAggregator {
    registry: Arc<AdapterRegistry>,
    config: AggregatorConfig,
}

impl InventoryAggregator {
    /// Creates an aggregator over an existing registry.
    pub fn new(registry: Arc<AdapterRegistry>, config: AggregatorConfig) -> Self {
        Self { registry, config }
    }

    /// Creates an aggregator with the built-in platforms registered.
    pub fn with_default_platforms(settings: AdapterSettings, config: AggregatorConfig) -> Self {
        Self::new(
            Arc::new(AdapterRegistry::with_default_platforms(settings)),
            config,
        )
    }

    /// The adapter registry.
    pub const fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Scheduling configuration.
    pub const fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Runs a parsed request body.
    ///
    /// # Errors
    /// Returns `InventoryError::Validation` when the request has no user,
    /// plus everything [`InventoryAggregator::run`] returns.
    pub async fn run_request(&self, request: InventoryRequest) -> Result<InventoryResponse> {
        let user = request
            .user
            .ok_or_else(|| InventoryError::validation("request has no user"))?;
        self.run(user, &request.options).await
    }

    /// Inventories every connection of `user`.
    ///
    /// Per-connection failures are reported inside the response; a response
    /// where every connection failed is still `Ok`.
    ///
    /// # Errors
    /// Returns `InventoryError::Validation` when the request shape is
    /// invalid, and `InventoryError::Configuration` when the aggregator
    /// configuration is unusable. No connection is attempted in either case.
    pub async fn run(&self, user: User, options: &Options) -> Result<InventoryResponse> {
        self.config.validate()?;
        let platforms = validate_request(&user, options)?;

        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "inventory",
            %request_id,
            connections = platforms.len()
        );

        async move {
            tracing::info!("Starting inventory collection");
            let started = Instant::now();

            let pipelines = user
                .connections
                .into_iter()
                .zip(platforms)
                .enumerate()
                .map(|(index, (connection, platform))| {
                    self.run_pipeline(index, platform, connection, options)
                });
            let mut outcomes: Vec<PipelineOutcome> = stream::iter(pipelines)
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;
            outcomes.sort_by_key(|outcome| outcome.index);

            let response = merge_outcomes(outcomes);
            tracing::info!(
                inventories = response.inventory_count(),
                errors = response.error_count(),
                duration_ms = elapsed_ms(started),
                "Inventory collection finished"
            );
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(
        &self,
        index: usize,
        platform: String,
        connection: Connection,
        options: &Options,
    ) -> PipelineOutcome {
        let adapter = match self.registry.resolve(&platform).await {
            Ok(adapter) => adapter,
            Err(error) => {
                tracing::warn!(connection = index, platform = %platform, "{error}");
                return PipelineOutcome {
                    index,
                    platform,
                    result: Err(error),
                };
            }
        };
        let descriptor = adapter.platform();

        let credential = match Credential::from_secrets(
            descriptor.credential_kind,
            connection.into_secrets(),
        ) {
            Ok(credential) => credential,
            Err(error) => {
                tracing::warn!(connection = index, platform = descriptor.key, "{error}");
                return PipelineOutcome {
                    index,
                    platform: descriptor.label.to_string(),
                    result: Err(error),
                };
            }
        };

        let collected_at = Utc::now();
        let started = Instant::now();
        let timeout = self.config.pipeline_timeout;

        let result = match tokio::time::timeout(
            timeout,
            adapter.collect_inventory(credential, options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(InventoryError::timed_out(timeout)),
        };
        let duration_ms = elapsed_ms(started);

        let result = match result {
            Ok(mut inventories) => {
                for inventory in &mut inventories {
                    inventory.metadata.collected_at = collected_at;
                    inventory.metadata.collection_duration_ms = duration_ms;
                }
                tracing::info!(
                    connection = index,
                    platform = descriptor.key,
                    views = inventories.len(),
                    duration_ms,
                    "✓ Connection inventoried"
                );
                Ok(inventories)
            }
            Err(error) => {
                tracing::warn!(
                    connection = index,
                    platform = descriptor.key,
                    duration_ms,
                    "Connection failed: {error}"
                );
                Err(error)
            }
        };

        PipelineOutcome {
            index,
            platform: descriptor.label.to_string(),
            result,
        }
    }
}

/// Checks the request shape and returns each connection's discriminator.
fn validate_request(user: &User, options: &Options) -> Result<Vec<String>> {
    if user.connections.is_empty() {
        return Err(InventoryError::validation("user has no connections"));
    }

    let platforms = user
        .connections
        .iter()
        .enumerate()
        .map(|(index, connection)| {
            connection
                .platform_key()
                .map(str::to_string)
                .ok_or_else(|| {
                    InventoryError::validation(format!(
                        "connection {index} has no platform 'name' or 'type'"
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    options.validate()?;
    Ok(platforms)
}

/// Folds outcomes, in connection order, into one response.
fn merge_outcomes(outcomes: Vec<PipelineOutcome>) -> InventoryResponse {
    let mut response = InventoryResponse::default();
    for outcome in outcomes {
        match outcome.result {
            Ok(inventories) => {
                for inventory in inventories {
                    let key = inventory.response_key();
                    if response.insert_inventory(inventory).is_some() {
                        tracing::debug!(key = %key, "Later connection replaced an earlier inventory");
                    }
                }
            }
            Err(error) => response.record_error(outcome.platform, error.to_string()),
        }
    }
    response
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
