//! HTTP and endpoint settings shared by every platform adapter.
//!
//! Adapters are built from these settings and cached by the registry; a
//! settings change invalidates the cache on the next lookup.

use std::time::Duration;
use url::Url;

/// Upper bound on concurrent per-field queries within one connection.
pub const MAX_FIELD_CONCURRENCY: usize = 16;

/// Settings used to construct platform adapters.
///
/// # Security
/// This struct never holds credentials; it is safe to log.
///
/// # Example
/// ```rust
/// use cdp_inventory_core::adapters::AdapterSettings;
/// use std::time::Duration;
///
/// let settings = AdapterSettings::default()
///     .with_request_timeout(Duration::from_secs(30))
///     .with_field_concurrency(2);
///
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    /// TCP/TLS connect timeout for platform calls
    pub connect_timeout: Duration,
    /// Timeout for a single platform HTTP call
    pub request_timeout: Duration,
    /// `User-Agent` header sent to every platform
    pub user_agent: String,
    /// Concurrent per-field queries within one connection
    pub field_concurrency: usize,
    /// Base URL overrides, used for sandboxes and tests
    pub endpoints: PlatformEndpoints,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: concat!("cdp-inventory/", env!("CARGO_PKG_VERSION")).to_string(),
            field_concurrency: 4,
            endpoints: PlatformEndpoints::default(),
        }
    }
}

impl AdapterSettings {
    /// Validates settings values.
    ///
    /// # Errors
    /// Returns `InventoryError::Configuration` for zero timeouts or an
    /// out-of-range field concurrency.
    pub fn validate(&self) -> crate::Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(crate::error::InventoryError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(crate::error::InventoryError::configuration(
                "request_timeout must be greater than 0",
            ));
        }

        if !(1..=MAX_FIELD_CONCURRENCY).contains(&self.field_concurrency) {
            return Err(crate::error::InventoryError::configuration(format!(
                "field_concurrency must be between 1 and {MAX_FIELD_CONCURRENCY}"
            )));
        }

        if self.user_agent.trim().is_empty() {
            return Err(crate::error::InventoryError::configuration(
                "user_agent cannot be empty",
            ));
        }

        Ok(())
    }

    /// Builder method to set the connect timeout.
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the per-call timeout.
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder method to set per-field query concurrency (clamped to the allowed range).
    pub fn with_field_concurrency(mut self, concurrency: usize) -> Self {
        self.field_concurrency = concurrency.clamp(1, MAX_FIELD_CONCURRENCY);
        self
    }

    /// Builder method to set endpoint overrides.
    pub fn with_endpoints(mut self, endpoints: PlatformEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

/// Optional base URL overrides per platform API.
///
/// `None` means the platform's public endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformEndpoints {
    /// Replaces `https://{domain}.salesforce.com` for the SOAP login
    pub salesforce_login: Option<Url>,
    /// Replaces `https://api.hubapi.com`
    pub hubspot_api: Option<Url>,
    /// Replaces the service-account token endpoint
    pub google_token: Option<Url>,
    /// Replaces `https://analyticsdata.googleapis.com`
    pub google_analytics_data: Option<Url>,
}

impl PlatformEndpoints {
    /// Points every platform at one base URL.
    pub fn all(base: &Url) -> Self {
        Self {
            salesforce_login: Some(base.clone()),
            hubspot_api: Some(base.clone()),
            google_token: base.join("token").ok(),
            google_analytics_data: Some(base.clone()),
        }
    }
}
