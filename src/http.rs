//! Shared HTTP plumbing for provider clients

use std::time::Duration;

use crate::error::ProviderStatus;
use crate::{Error, Result};

/// Build a client with a bounded per-request timeout
///
/// # Errors
///
/// Returns error if the TLS backend cannot be initialized
pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to build http client: {e}")))
}

/// Pass 2xx responses through, turn anything else into a provider error
///
/// The upstream body is kept in the error message for diagnostics.
///
/// # Errors
///
/// Returns `Provider` with the HTTP status for non-2xx responses
pub async fn ensure_success(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(provider, %status, body, "provider rejected request");

    Err(Error::provider(
        ProviderStatus::Http(status.as_u16()),
        format!("{provider} error {status}: {body}"),
    ))
}
