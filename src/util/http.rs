//! Shared HTTP client and auth header utilities.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};

use crate::auth::error::AuthError;
use crate::config::DEFAULT_HTTP_TIMEOUT_SECS;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Build a client whose requests give up after `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {e}")))
}

/// Get (or create) the shared client used when no client is supplied.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        build_client(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)).unwrap_or_default()
    })
}

/// Overwrite the `Authorization` header of a request.
pub fn set_authorization(request: &mut reqwest::Request, value: &str) -> Result<(), AuthError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        AuthError::InvalidResponse("credential contains characters not valid in a header".to_string())
    })?;
    header.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, header);
    Ok(())
}

/// Read the `Authorization` header a request was sent with.
pub fn authorization_of(request: &reqwest::Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

/// Status and raw body of a response, read to the end.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<(u16, String), AuthError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok((status, body))
}
