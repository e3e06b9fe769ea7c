//! Configuration for running many connection pipelines in one request.

use std::time::Duration;

/// Controls how the aggregator schedules connection pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Deadline for one connection's authenticate, discover and profile steps.
    ///
    /// A pipeline that exceeds it is recorded as a failure for that
    /// connection only. Default: 120 seconds
    pub pipeline_timeout: Duration,

    /// Maximum number of pipelines in flight at once.
    ///
    /// Default: 8
    pub max_concurrency: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            pipeline_timeout: Duration::from_secs(120),
            max_concurrency: 8,
        }
    }
}

impl AggregatorConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-connection pipeline deadline.
    pub const fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    /// Sets the maximum number of concurrent pipelines.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1); // Ensure at least 1
        self
    }

    /// Validates configuration values.
    ///
    /// # Errors
    /// Returns `InventoryError::Configuration` for a zero timeout or concurrency.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pipeline_timeout.is_zero() {
            return Err(crate::error::InventoryError::configuration(
                "pipeline_timeout must be greater than 0",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(crate::error::InventoryError::configuration(
                "max_concurrency must be greater than 0",
            ));
        }
        Ok(())
    }
}
