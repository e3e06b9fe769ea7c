//! Platform adapter traits, shared helpers, and the adapter registry.
//!
//! Each platform adapter implements [`PlatformAdapter`], a three-step
//! pipeline: authenticate, discover the entity schema, compute per-field
//! metrics. The pipeline is exposed to the aggregator through the
//! object-safe [`InventoryAdapter`] trait, which every `PlatformAdapter`
//! gets for free.
//!
//! # Module Structure
//! - `config`: `AdapterSettings` and `AggregatorConfig`
//! - `http`: shared request/response plumbing
//! - `registry`: lazy, cached adapter construction
//! - Platform modules (`salesforce`, `hubspot`, `google_analytics`)

use crate::error::{InventoryError, Result};
use crate::models::{EntityView, FieldDefinition, FieldDescriptor, PlatformInventory};
use crate::options::Options;
use crate::security::{Credential, CredentialKind};
use async_trait::async_trait;

pub mod config;
pub mod google_analytics;
pub(crate) mod http;
pub mod hubspot;
pub mod registry;
pub mod salesforce;

pub use config::{AdapterSettings, AggregatorConfig, MAX_FIELD_CONCURRENCY, PlatformEndpoints};
pub use registry::{AdapterFactory, AdapterRegistry, normalize_platform_key};

/// Static identity of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// Registry key / connection discriminator
    pub key: &'static str,
    /// Label used in response keys
    pub label: &'static str,
    /// Credential shape the platform expects
    pub credential_kind: CredentialKind,
}

/// A platform adapter's authenticate → discover → profile pipeline.
///
/// # Security Guarantees
/// - The credential is consumed by `authenticate` and never stored
/// - Sessions live only as long as one connection's pipeline
/// - All platform calls are read-only
#[async_trait]
pub trait PlatformAdapter: Send + Sync + 'static {
    /// Authenticated handle produced by `authenticate`.
    type Session: Send + Sync;

    /// Discovered schema consumed by `compute_field_metrics`.
    type Schema: Send + Sync;

    /// Static identity of the platform.
    fn descriptor(&self) -> &'static PlatformDescriptor;

    /// Exchanges a credential for a session.
    ///
    /// # Errors
    /// Returns `InventoryError::Authentication` when the credential is
    /// rejected or the platform cannot be reached.
    async fn authenticate(&self, credential: Credential, options: &Options) -> Result<Self::Session>;

    /// Looks up the entities and fields to profile.
    ///
    /// # Errors
    /// Returns `InventoryError::SchemaDiscovery` when an entity is unknown,
    /// not accessible, or named with an invalid identifier.
    async fn discover_schema(&self, session: &Self::Session, options: &Options) -> Result<Self::Schema>;

    /// Counts total records and non-null values per field, one inventory per view.
    ///
    /// # Errors
    /// Returns `InventoryError::MetricsFetch` when any count or report fails.
    async fn compute_field_metrics(
        &self,
        session: &Self::Session,
        schema: &Self::Schema,
        options: &Options,
    ) -> Result<Vec<PlatformInventory>>;
}

/// Object-safe adapter interface used by the registry and aggregator.
///
/// # Object Safety
/// Implemented for every [`PlatformAdapter`]; stored as
/// `Arc<dyn InventoryAdapter>`.
#[async_trait]
pub trait InventoryAdapter: Send + Sync {
    /// Static identity of the platform.
    fn platform(&self) -> &'static PlatformDescriptor;

    /// Runs the full pipeline for one connection.
    ///
    /// Returns at least one inventory on success.
    async fn collect_inventory(
        &self,
        credential: Credential,
        options: &Options,
    ) -> Result<Vec<PlatformInventory>>;
}

#[async_trait]
impl<A> InventoryAdapter for A
where
    A: PlatformAdapter,
{
    fn platform(&self) -> &'static PlatformDescriptor {
        self.descriptor()
    }

    async fn collect_inventory(
        &self,
        credential: Credential,
        options: &Options,
    ) -> Result<Vec<PlatformInventory>> {
        let descriptor = self.descriptor();
        if credential.kind() != descriptor.credential_kind {
            return Err(InventoryError::authentication(format!(
                "{} expects a {} credential, got {}",
                descriptor.label,
                descriptor.credential_kind,
                credential.kind()
            )));
        }

        let session = self.authenticate(credential, options).await?;
        tracing::debug!(platform = descriptor.key, "Authenticated");

        let schema = self.discover_schema(&session, options).await?;
        tracing::debug!(platform = descriptor.key, "Schema discovered");

        let inventories = self.compute_field_metrics(&session, &schema, options).await?;
        if inventories.is_empty() {
            return Err(InventoryError::metrics_fetch(
                "no entities were profiled for this connection",
            ));
        }
        Ok(inventories)
    }
}

/// Entities a connection should inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ViewTargets {
    /// Entity identifiers in request order, without duplicates
    pub(crate) entities: Vec<String>,
    /// Whether the caller asked for a list, which names every view
    pub(crate) named: bool,
}

impl ViewTargets {
    /// Resolves a list option, a single-entity option, and a default.
    ///
    /// A non-empty list wins and names every view, even a list of one.
    pub(crate) fn resolve(list: &[String], single: Option<&str>, default: &str) -> Self {
        let mut entities: Vec<String> = Vec::new();
        for entry in list.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            if !entities.iter().any(|existing| existing == entry) {
                entities.push(entry.to_string());
            }
        }

        if entities.is_empty() {
            let entity = single
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default);
            return Self {
                entities: vec![entity.to_string()],
                named: false,
            };
        }

        Self {
            entities,
            named: true,
        }
    }

    /// View name for `entity` when views are named.
    pub(crate) fn view_name(&self, entity: &str) -> Option<String> {
        self.named.then(|| entity.to_string())
    }
}

/// Fields to profile: the caller's list, or the platform defaults for `entity`.
pub(crate) fn requested_fields(options: &Options, defaults: &[&str]) -> Vec<String> {
    let requested: Vec<String> = options
        .fields
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    if requested.is_empty() {
        defaults.iter().map(|f| (*f).to_string()).collect()
    } else {
        requested
    }
}

/// Assembles an inventory for one view from its counts.
///
/// Requested fields the platform did not report become warnings.
pub(crate) fn build_inventory(
    descriptor: &PlatformDescriptor,
    view: &EntityView,
    total_records: u64,
    counts: Vec<(&FieldDefinition, Option<u64>)>,
    options: &Options,
) -> PlatformInventory {
    let mut inventory = PlatformInventory::new(descriptor.label, view.entity.as_str());
    inventory.total_records = total_records;
    inventory.view = view.name.clone();
    inventory.display_name = view.display_name.clone();
    inventory.fields = counts
        .into_iter()
        .map(|(definition, count)| {
            FieldDescriptor::new(definition, count, total_records)
                .with_mapped_name(options.mapped_name(&definition.name))
        })
        .collect();

    for missing in view.missing_fields() {
        tracing::warn!(
            platform = descriptor.key,
            entity = %view.entity,
            field = missing,
            "Requested field not found; skipping"
        );
        inventory.add_warning(format!(
            "field '{missing}' does not exist on {} and was skipped",
            view.entity
        ));
    }

    inventory
}
