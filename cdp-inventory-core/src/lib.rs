//! Core engine for CDP inventory collection.
//!
//! Given a user's platform connections, this crate authenticates against
//! each platform, discovers the entity schema, and reports per-field
//! completeness. Results from every connection are merged into a single
//! response; a failing connection is reported under `_errors` without
//! affecting the others.
//!
//! # Security Guarantees
//! - Credentials are zeroized after use and never serialized or logged
//! - All platform calls are read-only
//! - Responses are schema-validated and scanned for secret material
//!
//! # Architecture
//! - `adapters`: one adapter per platform behind a common trait, built
//!   lazily by a registry
//! - `aggregator`: concurrent per-connection pipelines with deadlines
//! - `validation`: output schema and secret scan
//! - `security`: credential extraction from connection payloads

pub mod adapters;
pub mod aggregator;
pub mod error;
pub mod logging;
pub mod models;
pub mod options;
pub mod security;
pub mod validation;

// Re-export commonly used types
pub use adapters::{
    AdapterRegistry, AdapterSettings, AggregatorConfig, InventoryAdapter, PlatformAdapter,
    PlatformDescriptor, PlatformEndpoints,
};
pub use aggregator::InventoryAggregator;
pub use error::{InventoryError, Result};
pub use models::{
    Connection, FieldDescriptor, InventoryMetadata, InventoryRequest, InventoryResponse,
    PlatformInventory, User,
};
pub use options::{DateRange, MetricView, Options};

pub use validation::{
    OutputValidationError, initialize_output_validator, validate_inventory_output,
    validate_response,
};
