//! Typed platform credentials with automatic memory zeroing.
//!
//! A `Credential` is built from a connection's secret fields right before an
//! adapter authenticates, and is consumed by that call. Secret strings live
//! in `Zeroizing` containers and never appear in `Debug` output.

use super::secrets::SecretFields;
use crate::error::{InventoryError, Result};
use std::fmt;
use zeroize::Zeroizing;

const REDACTED: &str = "[REDACTED]";

/// Shape of credential a platform expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Service-account key bundle (Google Analytics)
    ServiceAccount,
    /// Username, password and security token (Salesforce)
    UsernamePassword,
    /// Bearer access token (HubSpot)
    AccessToken,
}

impl CredentialKind {
    /// Fields that must be present and non-empty.
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::ServiceAccount => &["private_key", "client_email"],
            Self::UsernamePassword => &["username", "password", "security_token"],
            Self::AccessToken => &["access_token"],
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServiceAccount => "service account",
            Self::UsernamePassword => "username/password",
            Self::AccessToken => "access token",
        })
    }
}

/// A platform credential.
pub enum Credential {
    /// Service-account key bundle
    ServiceAccount(ServiceAccountKey),
    /// Username, password and security token
    UsernamePassword(PasswordCredential),
    /// Bearer access token
    AccessToken(AccessToken),
}

impl Credential {
    /// Builds a credential of `kind` from a connection's secret fields.
    ///
    /// Runs before any network call, so incomplete payloads fail fast.
    ///
    /// # Errors
    /// Returns `InventoryError::Authentication` listing every missing field,
    /// or describing why a field is malformed.
    pub fn from_secrets(kind: CredentialKind, mut secrets: SecretFields) -> Result<Self> {
        match kind {
            CredentialKind::UsernamePassword => {
                let username = secrets.take("username");
                let password = secrets.take("password");
                let security_token = secrets.take("security_token");
                match (username, password, security_token) {
                    (Some(username), Some(password), Some(security_token)) => {
                        Ok(Self::UsernamePassword(PasswordCredential {
                            username,
                            password,
                            security_token,
                        }))
                    }
                    (username, password, security_token) => Err(missing_fields(&[
                        ("username", username.is_none()),
                        ("password", password.is_none()),
                        ("security_token", security_token.is_none()),
                    ])),
                }
            }
            CredentialKind::AccessToken => secrets
                .take_any(&["access_token", "accessToken"])
                .map(|token| Self::AccessToken(AccessToken { token }))
                .ok_or_else(|| missing_fields(&[("access_token", true)])),
            CredentialKind::ServiceAccount => {
                ServiceAccountKey::from_secrets(secrets).map(Self::ServiceAccount)
            }
        }
    }

    /// Kind of this credential.
    pub const fn kind(&self) -> CredentialKind {
        match self {
            Self::ServiceAccount(_) => CredentialKind::ServiceAccount,
            Self::UsernamePassword(_) => CredentialKind::UsernamePassword,
            Self::AccessToken(_) => CredentialKind::AccessToken,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
            Self::UsernamePassword(password) => {
                f.debug_tuple("UsernamePassword").field(password).finish()
            }
            Self::AccessToken(token) => f.debug_tuple("AccessToken").field(token).finish(),
        }
    }
}

fn missing_fields(checks: &[(&str, bool)]) -> InventoryError {
    let missing: Vec<&str> = checks
        .iter()
        .filter(|(_, missing)| *missing)
        .map(|(name, _)| *name)
        .collect();
    InventoryError::authentication(format!(
        "missing required credential field(s): {}",
        missing.join(", ")
    ))
}

/// Salesforce-style username, password and security token.
pub struct PasswordCredential {
    username: Zeroizing<String>,
    password: Zeroizing<String>,
    security_token: Zeroizing<String>,
}

impl PasswordCredential {
    /// Login username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password with the security token appended, as the SOAP login expects.
    pub fn password_with_token(&self) -> Zeroizing<String> {
        let mut combined = Zeroizing::new(String::with_capacity(
            self.password.len().saturating_add(self.security_token.len()),
        ));
        combined.push_str(&self.password);
        combined.push_str(&self.security_token);
        combined
    }
}

impl fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCredential")
            .field("username", &self.username.as_str())
            .field("password", &REDACTED)
            .field("security_token", &REDACTED)
            .finish()
    }
}

/// Bearer access token.
pub struct AccessToken {
    token: Zeroizing<String>,
}

impl AccessToken {
    /// The raw token for an `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.token
    }

    /// Moves the token out, still zeroized on drop.
    pub fn into_secret(self) -> Zeroizing<String> {
        self.token
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken").field("token", &REDACTED).finish()
    }
}

/// Service-account key bundle used to mint OAuth tokens.
pub struct ServiceAccountKey {
    /// Service account identity (JWT issuer)
    pub client_email: String,
    /// Identifier of the signing key, sent as the JWT `kid`
    pub private_key_id: Option<String>,
    /// Owning project, informational only
    pub project_id: Option<String>,
    /// Token endpoint named by the bundle
    pub token_uri: Option<String>,
    private_key: Zeroizing<String>,
}

impl ServiceAccountKey {
    fn from_secrets(mut secrets: SecretFields) -> Result<Self> {
        // A bundle pasted as one JSON string takes precedence over inline fields.
        if let Some(bundle) = secrets.take("service_account_info") {
            let inner: SecretFields = serde_json::from_str(&bundle).map_err(|_| {
                InventoryError::authentication("service_account_info is not a valid JSON object")
            })?;
            return Self::from_fields(inner);
        }
        Self::from_fields(secrets)
    }

    fn from_fields(mut fields: SecretFields) -> Result<Self> {
        let private_key = fields.take("private_key");
        let client_email = fields.take("client_email");

        let (private_key, client_email) = match (private_key, client_email) {
            (Some(private_key), Some(client_email)) => (private_key, client_email),
            (private_key, client_email) => {
                return Err(missing_fields(&[
                    ("private_key", private_key.is_none()),
                    ("client_email", client_email.is_none()),
                ]));
            }
        };

        let private_key = normalize_private_key(&private_key);
        if !private_key.contains("-----BEGIN") || !private_key.contains("PRIVATE KEY-----") {
            return Err(InventoryError::authentication(
                "private_key is not a PEM-encoded private key",
            ));
        }

        Ok(Self {
            client_email: client_email.to_string(),
            private_key_id: fields.take("private_key_id").map(|v| v.to_string()),
            project_id: fields.take("project_id").map(|v| v.to_string()),
            token_uri: fields.take("token_uri").map(|v| v.to_string()),
            private_key,
        })
    }

    /// PEM-encoded private key with real line breaks.
    pub fn private_key_pem(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .field("private_key", &REDACTED)
            .finish()
    }
}

/// Converts escaped line breaks in a PEM key back into real ones.
///
/// Keys pasted through web forms or environment variables often arrive with
/// literal `\n` sequences. Base64 never contains a backslash, so the
/// replacement cannot corrupt key material. The result always ends with a
/// single newline after the END marker.
pub fn normalize_private_key(raw: &str) -> Zeroizing<String> {
    let unescaped = raw
        .trim()
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\r\n", "\n");
    let mut normalized = Zeroizing::new(unescaped);
    let trimmed_len = normalized.trim_end().len();
    normalized.truncate(trimmed_len);
    normalized.push('\n');
    normalized
}
