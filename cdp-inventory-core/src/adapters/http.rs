//! Shared HTTP plumbing for platform adapters.
//!
//! Every platform call goes through `send`/`read_json` so that failures are
//! mapped to the error variant of the pipeline stage that issued them, and
//! so that no request URL (which may carry identifiers) or header leaks into
//! a message.

use super::AdapterSettings;
use crate::error::{InventoryError, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Longest platform error detail kept in a message.
const MAX_DETAIL_CHARS: usize = 300;

/// Pipeline stage an HTTP call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Authenticate,
    DiscoverSchema,
    FetchMetrics,
}

impl Stage {
    /// Wraps a message in this stage's error variant.
    pub(crate) fn error(self, context: impl Into<String>) -> InventoryError {
        match self {
            Self::Authenticate => InventoryError::authentication(context),
            Self::DiscoverSchema => InventoryError::schema_discovery(context),
            Self::FetchMetrics => InventoryError::metrics_fetch(context),
        }
    }
}

/// Builds the HTTP client an adapter uses for its whole lifetime.
pub(crate) fn build_client(settings: &AdapterSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .user_agent(settings.user_agent.as_str())
        .build()
        .map_err(|e| {
            InventoryError::configuration(format!(
                "Failed to build HTTP client: {}",
                describe_transport_error(e)
            ))
        })
}

/// Sends a request, mapping transport failures to `stage`.
pub(crate) async fn send(request: RequestBuilder, stage: Stage, action: &str) -> Result<Response> {
    request
        .send()
        .await
        .map_err(|e| stage.error(format!("{action}: {}", describe_transport_error(e))))
}

/// Fails with a stage error unless the response status is 2xx.
pub(crate) async fn expect_success(response: Response, stage: Stage, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(stage.error(format!("{action}: {}", describe_status(status, &body))))
}

/// Checks the status and decodes a JSON body.
pub(crate) async fn read_json<T>(response: Response, stage: Stage, action: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let response = expect_success(response, stage, action).await?;
    response.json::<T>().await.map_err(|e| {
        stage.error(format!(
            "{action}: unexpected response body ({})",
            e.without_url()
        ))
    })
}

/// Sends a request and decodes its JSON body.
pub(crate) async fn send_json<T>(request: RequestBuilder, stage: Stage, action: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let response = send(request, stage, action).await?;
    read_json(response, stage, action).await
}

/// Human-readable status summary with the platform's own error detail when present.
pub(crate) fn describe_status(status: StatusCode, body: &str) -> String {
    let phrase = match status.as_u16() {
        401 => "credential rejected",
        403 => "permission denied",
        404 => "not found",
        429 => "rate limit exceeded",
        500..=599 => "platform error",
        _ => "request failed",
    };

    let mut message = format!("{phrase} (HTTP {})", status.as_u16());
    if let Some(detail) = platform_error_detail(body) {
        message.push_str(": ");
        message.push_str(&detail);
    }
    message
}

/// Extracts the error message a platform put in a JSON error body.
///
/// Understands Salesforce error arrays, Google `{"error": {...}}` envelopes,
/// OAuth `error`/`error_description` pairs, and HubSpot `category`/`message`.
pub(crate) fn platform_error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let detail = extract_message(&value)?;

    if detail.chars().count() > MAX_DETAIL_CHARS {
        let truncated: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
        Some(format!("{truncated}..."))
    } else {
        Some(detail)
    }
}

fn extract_message(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(extract_message),
        Value::Object(map) => {
            if let Some(inner @ Value::Object(_)) = map.get("error") {
                return extract_message(inner);
            }

            let message = ["message", "error_description"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str));
            let code = ["errorCode", "category", "error", "status"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str));

            match (code, message) {
                (Some(code), Some(message)) => Some(format!("{code}: {message}")),
                (None, Some(message)) => Some(message.to_string()),
                (Some(code), None) => Some(code.to_string()),
                (None, None) => None,
            }
        }
        _ => None,
    }
}

/// Describes a transport error without its URL.
fn describe_transport_error(error: reqwest::Error) -> String {
    if error.is_timeout() {
        return "request timed out".to_string();
    }

    let error = error.without_url();
    let mut message = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
