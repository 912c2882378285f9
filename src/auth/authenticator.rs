use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::error::AuthError;
use crate::util::http::authorization_of;

/// Credential injection for outgoing cloud print requests.
///
/// Implementors set the `Authorization` header in [`apply`](Self::apply) and
/// say whether a `403 Forbidden` is worth one retry with new credentials.
/// [`send`](Self::send) ties the two together: it is the single place where
/// a rejected response may be replaced by a retried one.
///
/// # Example
/// ```no_run
/// use cloudprinting::auth::{Authenticator, OAuth2Auth, TokenState};
///
/// # async fn example() -> Result<(), cloudprinting::auth::AuthError> {
/// let auth = OAuth2Auth::new(
///     TokenState::builder()
///         .access_token("ya29.token")
///         .token_type("Bearer")
///         .expires_in(3600)
///         .build()?,
/// );
/// let client = reqwest::Client::new();
/// let request = client
///     .get("https://www.google.com/cloudprint/search")
///     .build()?;
/// let response = auth.send(&client, request).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Set the `Authorization` header, obtaining fresh credentials first if
    /// needed. An error means the request must not be sent.
    async fn apply(&self, request: &mut reqwest::Request) -> Result<(), AuthError>;

    /// Whether a 403 response should trigger one retry.
    fn retries_forbidden(&self) -> bool;

    /// Drop the `rejected` credential so the next [`apply`](Self::apply)
    /// uses a new one. A credential already replaced by another caller is
    /// left alone.
    async fn invalidate(&self, rejected: Option<&str>) -> Result<(), AuthError>;

    /// Authenticate and send `request`, retrying exactly once on 403.
    ///
    /// A 403 on the retry, and every other status, is returned unchanged.
    async fn send(
        &self,
        client: &reqwest::Client,
        mut request: reqwest::Request,
    ) -> Result<reqwest::Response, AuthError> {
        self.apply(&mut request).await?;
        let replay = if self.retries_forbidden() {
            request.try_clone()
        } else {
            None
        };
        let rejected = authorization_of(&request);
        let response = client.execute(request).await?;
        if response.status() != StatusCode::FORBIDDEN || !self.retries_forbidden() {
            return Ok(response);
        }
        let Some(mut retry) = replay else {
            warn!("request body cannot be replayed; returning 403 without retry");
            return Ok(response);
        };

        warn!(url = %retry.url(), "request forbidden; renewing credentials and retrying once");
        self.invalidate(rejected.as_deref()).await?;
        self.apply(&mut retry).await?;
        let response = client.execute(retry).await?;
        debug!(status = %response.status(), "retried request completed");
        Ok(response)
    }
}
