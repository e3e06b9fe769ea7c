//! Request and response models for inventory collection.
//!
//! The request side (`InventoryRequest`, `User`, `Connection`) is
//! deserialize-only: connection payloads carry secrets and must never be
//! echoed back. The response side (`InventoryResponse`, `PlatformInventory`,
//! `FieldDescriptor`) is what callers receive.

use crate::error::{InventoryError, Result};
use crate::options::{Options, nullable};
use crate::security::SecretFields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Discriminator assumed for connections that carry only an access token.
pub const TOKEN_ONLY_PLATFORM: &str = "hubspot";

/// Top-level request body: a user with connections plus shared options.
#[derive(Debug, Default, Deserialize)]
pub struct InventoryRequest {
    /// Requesting user; absent users are rejected during validation
    #[serde(default)]
    pub user: Option<User>,
    /// Options shared by every connection
    #[serde(default, deserialize_with = "nullable")]
    pub options: Options,
}

impl InventoryRequest {
    /// Parses a request body, mapping malformed JSON to a validation error.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| InventoryError::validation(format!("malformed request body: {e}")))
    }

    /// Parses a request from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| InventoryError::validation(format!("malformed request body: {e}")))
    }
}

/// The requesting principal and the platform connections to inventory.
#[derive(Debug, Default, Deserialize)]
pub struct User {
    /// Given name, informational only
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name, informational only
    #[serde(default)]
    pub last_name: Option<String>,
    /// Contact address, informational only
    #[serde(default)]
    pub email: Option<String>,
    /// Contact number, informational only
    #[serde(default)]
    pub phone: Option<String>,
    /// Connections in caller order
    #[serde(default, deserialize_with = "nullable")]
    pub connections: Vec<Connection>,
}

/// One platform connection: a discriminator plus platform-specific secrets.
///
/// `name` wins over `type` when both are present. Every other key is treated
/// as credential material and only leaves this struct by being moved into a
/// [`crate::security::Credential`].
#[derive(Default, Deserialize)]
pub struct Connection {
    /// Primary platform discriminator
    #[serde(default)]
    pub name: Option<String>,
    /// Secondary platform discriminator
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    secrets: SecretFields,
}

impl Connection {
    /// Builds a connection from a discriminator and secret fields.
    pub fn new(name: impl Into<String>, secrets: SecretFields) -> Self {
        Self {
            name: Some(name.into()),
            kind: None,
            secrets,
        }
    }

    /// Returns the platform discriminator for this connection.
    ///
    /// Falls back to HubSpot for legacy payloads that carry only an access
    /// token and no discriminator.
    pub fn platform_key(&self) -> Option<&str> {
        let named = [self.name.as_deref(), self.kind.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty());

        named.or_else(|| {
            self.secrets
                .has_access_token()
                .then_some(TOKEN_ONLY_PLATFORM)
        })
    }

    /// Read-only view of the secret fields.
    pub const fn secrets(&self) -> &SecretFields {
        &self.secrets
    }

    /// Replaces `env:VAR` secret values with the named environment variables.
    ///
    /// # Errors
    /// Returns `InventoryError::Validation` naming the first unset variable.
    pub fn resolve_env_references(&mut self) -> Result<()> {
        self.secrets.resolve_env_references()
    }

    /// Consumes the connection, yielding its secret fields.
    pub fn into_secrets(self) -> SecretFields {
        self.secrets
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("platform", &self.platform_key())
            .field("secret_fields", &self.secrets.field_names())
            .finish()
    }
}

/// A field reported by a platform's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Platform field identifier
    pub name: String,
    /// Platform-reported data type
    pub data_type: Option<String>,
    /// Human-readable label
    pub label: Option<String>,
    /// Whether the platform can count non-null values for this field
    pub filterable: bool,
}

impl FieldDefinition {
    /// Creates a filterable field with no type or label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            label: None,
            filterable: true,
        }
    }

    /// Sets the platform data type.
    pub fn with_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Sets the human-readable label.
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Sets whether non-null counts can be queried.
    pub const fn with_filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }
}

/// One entity to profile, optionally tagged with a view name.
///
/// A view name is present only when the caller requested a list of objects,
/// object types, or metric views; it becomes the suffix of the response key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityView {
    /// View name used as the response key suffix
    pub name: Option<String>,
    /// Caller-supplied label echoed as `_display_name`
    pub display_name: Option<String>,
    /// Platform entity identifier (object name, object type, "users")
    pub entity: String,
    /// Fields the platform reports for the entity
    pub fields: Vec<FieldDefinition>,
    /// Fields to profile, in caller order; empty means every reported field
    pub requested_fields: Vec<String>,
}

impl EntityView {
    /// Creates an unnamed view over `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Self::default()
        }
    }

    /// Field definitions to profile, in requested order.
    ///
    /// Lookup is exact first, then case-insensitive. Repeated requests for
    /// the same field are collapsed.
    pub fn profiled_fields(&self) -> Vec<&FieldDefinition> {
        if self.requested_fields.is_empty() {
            return self.fields.iter().collect();
        }

        let mut selected: Vec<&FieldDefinition> = Vec::new();
        for requested in &self.requested_fields {
            if let Some(field) = self.find_field(requested)
                && !selected.iter().any(|s| s.name == field.name)
            {
                selected.push(field);
            }
        }
        selected
    }

    /// Requested fields the platform did not report.
    pub fn missing_fields(&self) -> Vec<&str> {
        self.requested_fields
            .iter()
            .filter(|requested| self.find_field(requested).is_none())
            .map(String::as_str)
            .collect()
    }

    fn find_field(&self, requested: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.name == requested)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(requested))
            })
    }
}

/// Discovered schema: one view per requested entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySchema {
    /// Views in request order
    pub views: Vec<EntityView>,
}

/// Completeness of a single field within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Platform field identifier
    pub name: String,
    /// Records with a non-empty value; null when the platform cannot count it
    pub non_null_count: Option<u64>,
    /// Platform-reported data type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Caller-supplied name mapping for this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_name: Option<String>,
    /// `non_null_count / total_records`, rounded to four decimals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness_pct: Option<f64>,
}

impl FieldDescriptor {
    /// Creates a descriptor from a field definition and its non-null count.
    pub fn new(definition: &FieldDefinition, non_null_count: Option<u64>, total_records: u64) -> Self {
        Self {
            name: definition.name.clone(),
            non_null_count,
            data_type: definition.data_type.clone(),
            label: definition.label.clone(),
            mapped_name: None,
            completeness_pct: non_null_count
                .and_then(|count| completeness_ratio(&definition.name, count, total_records)),
        }
    }

    /// Sets the caller-supplied mapping for this field.
    pub fn with_mapped_name(mut self, mapped_name: Option<String>) -> Self {
        self.mapped_name = mapped_name;
        self
    }
}

/// Ratio of non-null to total records, clamped to [0, 1].
///
/// Undefined when the entity has no records.
#[allow(clippy::cast_precision_loss)]
fn completeness_ratio(field: &str, non_null: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }

    if non_null > total {
        tracing::debug!(
            field,
            non_null,
            total,
            "Non-null count exceeds total records; clamping completeness"
        );
    }

    let ratio = (non_null as f64 / total as f64).clamp(0.0, 1.0);
    Some((ratio * 10_000.0).round() / 10_000.0)
}

/// Collection details attached to every inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMetadata {
    /// When collection for this connection started
    pub collected_at: DateTime<Utc>,
    /// Wall time spent in the connection's pipeline
    pub collection_duration_ms: u64,
    /// Platform scope details (object, property, date ranges)
    #[serde(flatten)]
    pub scope: BTreeMap<String, Value>,
    /// Non-fatal notes such as dropped fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Default for InventoryMetadata {
    fn default() -> Self {
        Self {
            collected_at: Utc::now(),
            collection_duration_ms: 0,
            scope: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }
}

impl InventoryMetadata {
    /// Adds a scope entry.
    pub fn with_scope(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope.insert(key.into(), value.into());
        self
    }
}

/// Inventory of one entity view on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInventory {
    /// Platform entity identifier
    pub entity: String,
    /// Total record count for the entity
    pub total_records: u64,
    /// Profiled fields in requested order
    pub fields: Vec<FieldDescriptor>,
    /// Platform label ("Salesforce", "HubSpot", "Google Analytics")
    pub platform: String,
    /// Caller-supplied view label
    #[serde(rename = "_display_name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Collection details
    pub metadata: InventoryMetadata,
    /// View name used to build the response key
    #[serde(skip)]
    pub view: Option<String>,
}

impl PlatformInventory {
    /// Creates an empty inventory for `entity` on `platform`.
    pub fn new(platform: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            total_records: 0,
            fields: Vec::new(),
            platform: platform.into(),
            display_name: None,
            metadata: InventoryMetadata::default(),
            view: None,
        }
    }

    /// Key under which this inventory appears in the response.
    ///
    /// The platform label alone, or `"{label}-{view}"` for named views.
    pub fn response_key(&self) -> String {
        match &self.view {
            Some(view) => format!("{}-{}", self.platform, view),
            None => self.platform.clone(),
        }
    }

    /// Appends a non-fatal warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.metadata.warnings.push(warning.into());
    }
}

/// Merged result of one inventory request.
///
/// Serializes as a flat object of response keys plus an `_errors` object
/// that is omitted when no connection failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventoryResponse {
    /// Successful inventories by response key
    #[serde(flatten)]
    pub inventories: BTreeMap<String, PlatformInventory>,
    /// Failure messages by platform key
    #[serde(rename = "_errors", skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl InventoryResponse {
    /// Inserts an inventory under its response key, returning any inventory it replaced.
    pub fn insert_inventory(&mut self, inventory: PlatformInventory) -> Option<PlatformInventory> {
        self.inventories.insert(inventory.response_key(), inventory)
    }

    /// Records a failure message for a platform key.
    pub fn record_error(&mut self, platform: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(platform.into(), message.into());
    }

    /// Looks up an inventory by response key.
    pub fn get(&self, key: &str) -> Option<&PlatformInventory> {
        self.inventories.get(key)
    }

    /// Number of successful inventories.
    pub fn inventory_count(&self) -> usize {
        self.inventories.len()
    }

    /// Number of failed connections.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// True when neither inventories nor errors were recorded.
    pub fn is_empty(&self) -> bool {
        self.inventories.is_empty() && self.errors.is_empty()
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
