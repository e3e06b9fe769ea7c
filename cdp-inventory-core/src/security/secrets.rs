//! Secret fields carried by a connection payload.
//!
//! Everything in a connection other than its discriminator lands here.
//! Values are moved (never copied) into `Zeroizing` containers when an
//! adapter's credential is built, and whatever is left over is wiped when
//! the container drops.

use crate::error::{InventoryError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use zeroize::{Zeroize, Zeroizing};

/// Prefix marking a value to be read from the process environment.
pub const ENV_REFERENCE_PREFIX: &str = "env:";

/// Secret key/value pairs from a connection payload.
#[derive(Default, Deserialize)]
#[serde(transparent)]
pub struct SecretFields(Map<String, Value>);

impl SecretFields {
    /// Creates an empty set of fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Names of the fields present, for diagnostics.
    pub fn field_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// True when a non-empty field with this name is present.
    pub fn contains(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    /// True when an access token is present under either accepted spelling.
    pub fn has_access_token(&self) -> bool {
        self.contains("access_token") || self.contains("accessToken")
    }

    /// Removes a field and returns its value as a zeroizing string.
    ///
    /// Empty strings and nulls count as absent. Non-string scalars are
    /// rendered with their JSON text; objects and arrays are re-serialized.
    pub fn take(&mut self, key: &str) -> Option<Zeroizing<String>> {
        let mut value = self.0.remove(key)?;
        let taken = match &mut value {
            Value::Null => None,
            Value::String(s) => {
                let s = Zeroizing::new(std::mem::take(s));
                (!s.trim().is_empty()).then_some(s)
            }
            other => Some(Zeroizing::new(other.to_string())),
        };
        zeroize_value(&mut value);
        taken
    }

    /// Removes the first present field among `keys`.
    ///
    /// Remaining aliases are removed as well so no copy lingers.
    pub fn take_any(&mut self, keys: &[&str]) -> Option<Zeroizing<String>> {
        let mut found = None;
        for key in keys {
            let value = self.take(key);
            if found.is_none() {
                found = value;
            }
        }
        found
    }

    /// Replaces `env:NAME` string values with the value of environment variable `NAME`.
    ///
    /// # Errors
    /// Returns `InventoryError::Validation` naming the field and variable when
    /// the variable is unset or not valid Unicode.
    pub fn resolve_env_references(&mut self) -> Result<()> {
        for (key, value) in &mut self.0 {
            let Value::String(text) = value else {
                continue;
            };
            let Some(variable) = text.strip_prefix(ENV_REFERENCE_PREFIX) else {
                continue;
            };
            let variable = variable.trim();

            let resolved = std::env::var(variable).map_err(|_| {
                InventoryError::validation(format!(
                    "connection field '{key}' references environment variable '{variable}', which is not set"
                ))
            })?;
            text.zeroize();
            *text = resolved;
        }
        Ok(())
    }
}

impl Drop for SecretFields {
    fn drop(&mut self) {
        for value in self.0.values_mut() {
            zeroize_value(value);
        }
    }
}

fn zeroize_value(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(zeroize_value),
        Value::Object(map) => map.values_mut().for_each(zeroize_value),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> SecretFields {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_take_treats_empty_as_absent() {
        let mut secrets = fields(json!({"username": "", "password": null, "token": "abc"}));
        assert!(secrets.take("username").is_none());
        assert!(secrets.take("password").is_none());
        assert_eq!(secrets.take("token").as_deref().map(String::as_str), Some("abc"));
        assert!(secrets.take("token").is_none());
    }

    #[test]
    fn test_take_any_prefers_first_alias_and_clears_rest() {
        let mut secrets = fields(json!({"access_token": "snake", "accessToken": "camel"}));
        let token = secrets.take_any(&["access_token", "accessToken"]).unwrap();
        assert_eq!(token.as_str(), "snake");
        assert!(secrets.field_names().is_empty());

        let mut camel_only = fields(json!({"accessToken": "camel"}));
        assert!(camel_only.has_access_token());
        let token = camel_only.take_any(&["access_token", "accessToken"]).unwrap();
        assert_eq!(token.as_str(), "camel");
    }

    #[test]
    fn test_take_renders_non_string_values() {
        let mut secrets = fields(json!({"client_id": 1234, "bundle": {"a": "b"}}));
        assert_eq!(secrets.take("client_id").unwrap().as_str(), "1234");
        assert_eq!(secrets.take("bundle").unwrap().as_str(), r#"{"a":"b"}"#);
    }

    #[test]
    fn test_credential_env_reference_resolution() {
        // Unique names keep this test independent of the process environment.
        let mut missing = fields(json!({"password": "env:CDP_INVENTORY_TEST_UNSET_SECRET_9F3A"}));
        let err = missing.resolve_env_references().unwrap_err();
        assert!(err.is_request_fatal());
        assert!(err.to_string().contains("CDP_INVENTORY_TEST_UNSET_SECRET_9F3A"));

        let mut plain = fields(json!({"password": "literal", "port": 5}));
        plain.resolve_env_references().unwrap();
        assert_eq!(plain.take("password").unwrap().as_str(), "literal");
    }
}
