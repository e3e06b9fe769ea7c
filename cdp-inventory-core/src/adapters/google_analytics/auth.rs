//! Service-account OAuth: a signed RS256 JWT assertion exchanged for an access token.

use crate::adapters::http::{self, Stage};
use crate::error::{InventoryError, Result};
use crate::security::ServiceAccountKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

/// Read-only Analytics scope requested for every token.
pub(crate) const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// Google's OAuth token endpoint, also the assertion audience.
pub(crate) const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime; Google rejects anything longer than an hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Token endpoints a key bundle may name.
const TRUSTED_TOKEN_HOSTS: &[&str] = &["oauth2.googleapis.com", "accounts.google.com", "www.googleapis.com"];

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub(crate) iss: String,
    pub(crate) scope: String,
    pub(crate) aud: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Token URI the assertion is addressed to.
///
/// A bundle's `token_uri` is honored only when it points at a Google token
/// host over HTTPS; anything else falls back to the public endpoint so a
/// request cannot send signed assertions to an arbitrary server.
pub(crate) fn token_audience(key: &ServiceAccountKey) -> String {
    let Some(raw) = key.token_uri.as_deref() else {
        return DEFAULT_TOKEN_URI.to_string();
    };

    match Url::parse(raw) {
        Ok(url)
            if url.scheme() == "https"
                && url.host_str().is_some_and(|host| TRUSTED_TOKEN_HOSTS.contains(&host)) =>
        {
            url.to_string()
        }
        _ => {
            tracing::warn!(
                token_uri = %crate::error::redact_url(raw),
                "Ignoring untrusted token_uri in service account bundle"
            );
            DEFAULT_TOKEN_URI.to_string()
        }
    }
}

/// Signs the OAuth assertion for `key`, valid from `issued_at` for one hour.
///
/// # Errors
/// Returns `InventoryError::Authentication` when the private key cannot be
/// parsed as an RSA key.
pub(crate) fn sign_assertion(
    key: &ServiceAccountKey,
    audience: &str,
    issued_at: i64,
) -> Result<Zeroizing<String>> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key_pem().as_bytes()).map_err(|e| {
        InventoryError::authentication(format!("private_key is not a usable RSA key ({e})"))
    })?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: ANALYTICS_READONLY_SCOPE.to_string(),
        aud: audience.to_string(),
        iat: issued_at,
        exp: issued_at.saturating_add(ASSERTION_LIFETIME_SECS),
    };

    jsonwebtoken::encode(&header, &claims, &encoding_key)
        .map(Zeroizing::new)
        .map_err(|e| InventoryError::authentication(format!("failed to sign assertion ({e})")))
}

/// Exchanges a signed assertion for an access token at `token_url`.
pub(crate) async fn exchange_assertion(
    client: &reqwest::Client,
    token_url: Url,
    assertion: &str,
) -> Result<Zeroizing<String>> {
    let request = client
        .post(token_url)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)]);
    let token: TokenResponse =
        http::send_json(request, Stage::Authenticate, "exchange service account assertion").await?;

    if token.access_token.is_empty() {
        return Err(InventoryError::authentication(
            "token endpoint returned an empty access token",
        ));
    }
    Ok(Zeroizing::new(token.access_token))
}
