//! JSON Schema validation for inventory responses.
//!
//! Every response leaving the process is checked against an embedded JSON
//! Schema and then scanned for secret material. A response that fails
//! either check is never written or returned.
//!
//! # Security Guarantees
//! - No credential-bearing key (`password`, `access_token`, ...) appears anywhere
//! - No PEM private key block appears in any string value
//!
//! # Example
//! ```rust
//! use cdp_inventory_core::validation::validate_inventory_output;
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let response = json!({
//!     "HubSpot": {
//!         "entity": "contacts",
//!         "total_records": 2,
//!         "fields": [{"name": "email", "non_null_count": 1}],
//!         "platform": "HubSpot",
//!         "metadata": {"collected_at": "2024-01-15T10:30:00Z", "collection_duration_ms": 120}
//!     },
//!     "_errors": {"Salesforce": "Authentication failed: credential rejected (HTTP 401)"}
//! });
//!
//! validate_inventory_output(&response)?;
//! # Ok(())
//! # }
//! ```

use crate::models::InventoryResponse;
use jsonschema::Validator;
use serde_json::Value;
use regex::Regex;
use std::sync::{LazyLock, OnceLock};
use thiserror::Error;

/// Output validation failures.
#[derive(Debug, Error)]
pub enum OutputValidationError {
    /// The embedded schema failed to compile
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// The response does not match the schema
    #[error("Output validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// The response carries secret material
    #[error("Security validation failed: {reason}")]
    SecurityViolation { reason: String },

    /// The response could not be converted to JSON
    #[error("JSON serialization failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

/// Most schema errors reported for one response.
const MAX_REPORTED_ERRORS: usize = 10;

/// Object keys that only ever hold credentials.
const SECRET_KEYS: &[&str] = &[
    "password",
    "security_token",
    "private_key",
    "access_token",
    "accesstoken",
    "client_secret",
    "session_id",
    "sessionid",
    "refresh_token",
    "assertion",
    "service_account_info",
];

/// PEM header of any private key flavour (PKCS#8, RSA, EC, encrypted).
static PRIVATE_KEY_PEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-----BEGIN (?:[A-Z0-9]+ )*PRIVATE KEY-----").expect("Invalid PEM pattern")
});

/// Embedded JSON Schema for the response format.
const RESPONSE_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "CDP Inventory Response",
  "type": "object",
  "properties": {
    "_errors": {
      "type": "object",
      "additionalProperties": { "type": "string", "minLength": 1 }
    }
  },
  "additionalProperties": { "$ref": "#/$defs/inventory" },
  "$defs": {
    "inventory": {
      "type": "object",
      "required": ["entity", "total_records", "fields", "platform", "metadata"],
      "properties": {
        "entity": { "type": "string", "minLength": 1 },
        "total_records": { "type": "integer", "minimum": 0 },
        "platform": { "type": "string", "minLength": 1 },
        "_display_name": { "type": "string" },
        "fields": { "type": "array", "items": { "$ref": "#/$defs/field" } },
        "metadata": { "$ref": "#/$defs/metadata" }
      }
    },
    "field": {
      "type": "object",
      "required": ["name", "non_null_count"],
      "properties": {
        "name": { "type": "string", "minLength": 1 },
        "non_null_count": { "type": ["integer", "null"], "minimum": 0 },
        "type": { "type": "string" },
        "label": { "type": "string" },
        "mapped_name": { "type": "string" },
        "completeness_pct": { "type": "number", "minimum": 0, "maximum": 1 }
      }
    },
    "metadata": {
      "type": "object",
      "required": ["collected_at", "collection_duration_ms"],
      "properties": {
        "collected_at": { "type": "string", "format": "date-time" },
        "collection_duration_ms": { "type": "integer", "minimum": 0 },
        "warnings": { "type": "array", "items": { "type": "string" } }
      }
    }
  }
}"##;

static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Compiles the embedded schema once. Later calls are no-ops.
///
/// # Errors
/// Returns `OutputValidationError::SchemaCompilation` if the embedded schema is invalid.
pub fn initialize_output_validator() -> Result<(), OutputValidationError> {
    if COMPILED_SCHEMA.get().is_some() {
        return Ok(());
    }

    let schema_json = get_schema_definition()?;
    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        OutputValidationError::SchemaCompilation {
            message: format!("Schema compilation error: {e}"),
        }
    })?;

    // A concurrent initializer may have won; either instance is equivalent.
    let _ = COMPILED_SCHEMA.set(compiled);
    Ok(())
}

/// Validates a serialized response against the schema and the secret scan.
///
/// # Errors
/// Returns `ValidationFailed` listing schema violations, or
/// `SecurityViolation` naming the path that carries secret material.
pub fn validate_inventory_output(json_value: &Value) -> Result<(), OutputValidationError> {
    initialize_output_validator()?;
    let schema = COMPILED_SCHEMA
        .get()
        .ok_or_else(|| OutputValidationError::SchemaCompilation {
            message: "Output validator is not initialized".to_string(),
        })?;

    let errors: Vec<String> = schema
        .iter_errors(json_value)
        .map(|error| error.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(OutputValidationError::ValidationFailed {
            error_count: errors.len(),
            errors: errors.into_iter().take(MAX_REPORTED_ERRORS).collect(),
        });
    }

    scan_for_secrets(json_value, "")
}

/// Serializes and validates a response.
///
/// # Errors
/// Same as [`validate_inventory_output`], plus `JsonParsing` if serialization fails.
pub fn validate_response(response: &InventoryResponse) -> Result<Value, OutputValidationError> {
    let value = serde_json::to_value(response)?;
    validate_inventory_output(&value)?;
    Ok(value)
}

/// The embedded schema as a JSON value.
pub fn get_schema_definition() -> Result<Value, OutputValidationError> {
    serde_json::from_str(RESPONSE_SCHEMA).map_err(|e| OutputValidationError::SchemaCompilation {
        message: format!("Failed to parse embedded schema: {e}"),
    })
}

fn scan_for_secrets(value: &Value, path: &str) -> Result<(), OutputValidationError> {
    match value {
        Value::String(s) => {
            if PRIVATE_KEY_PEM.is_match(s) {
                return Err(OutputValidationError::SecurityViolation {
                    reason: format!("private key material found at '{path}'"),
                });
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                if path.is_empty() && key == "_errors" {
                    scan_error_messages(item, &child)?;
                    continue;
                }
                if SECRET_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                    return Err(OutputValidationError::SecurityViolation {
                        reason: format!("credential field found at '{child}'"),
                    });
                }
                scan_for_secrets(item, &child)?;
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                scan_for_secrets(item, &format!("{path}[{index}]"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// `_errors` keys are caller-supplied platform names, so only the messages are scanned.
fn scan_error_messages(errors: &Value, path: &str) -> Result<(), OutputValidationError> {
    match errors {
        Value::Object(map) => map
            .iter()
            .try_for_each(|(key, message)| scan_for_secrets(message, &format!("{path}.{key}"))),
        other => scan_for_secrets(other, path),
    }
}
