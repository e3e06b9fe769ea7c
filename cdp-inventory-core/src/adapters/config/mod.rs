//! Configuration types for platform adapters and aggregation.
//!
//! - `AdapterSettings`: HTTP timeouts, user agent, endpoint overrides
//! - `AggregatorConfig`: pipeline deadline and concurrency
//!
//! # Security
//! These configuration structs intentionally do NOT store credentials.
//! Credentials arrive per request through the security module.

mod aggregation;
mod settings;

pub use aggregation::AggregatorConfig;
pub use settings::{AdapterSettings, MAX_FIELD_CONCURRENCY, PlatformEndpoints};
