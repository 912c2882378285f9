use tracing::{debug, warn};

use super::error::AuthError;
use super::token::{TokenSet, TokenState};
use crate::config::DEFAULT_TOKEN_ENDPOINT;
use crate::util::http::read_body;

/// Exchanges refresh tokens for fresh access tokens.
///
/// # Example
/// ```no_run
/// use cloudprinting::auth::{TokenRefresher, TokenState};
///
/// # async fn example() -> Result<(), cloudprinting::auth::AuthError> {
/// let refresher = TokenRefresher::new(reqwest::Client::new());
/// let mut state = TokenState::builder()
///     .refresh_token("1/xyz")
///     .client_id("client")
///     .client_secret("secret")
///     .build()?;
/// refresher.refresh(&mut state).await?;
/// println!("{:?}", state.authorization());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    client: reqwest::Client,
    token_endpoint: String,
}

impl TokenRefresher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
        }
    }

    pub fn with_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = url.into();
        self
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Refresh `state` if it has expired; a fresh state is left untouched.
    ///
    /// Fails with [`AuthError::Configuration`] when the state carries no
    /// refresh credentials and with [`AuthError::Refresh`] when the server
    /// rejects the exchange or answers with something other than a token set
    /// with a lifetime.
    pub async fn refresh(&self, state: &mut TokenState) -> Result<(), AuthError> {
        let credentials = state.refresh_credentials().cloned().ok_or_else(|| {
            AuthError::configuration(
                "refresh_token, client_id and client_secret are required to refresh",
            )
        })?;
        if !state.is_expired() {
            debug!("access token still valid; skipping refresh");
            return Ok(());
        }

        debug!(endpoint = %self.token_endpoint, client_id = %credentials.client_id, "refreshing access token");
        let resp = self
            .client
            .post(&self.token_endpoint)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let (status, body) = read_body(resp).await?;
        if !(200..300).contains(&status) {
            warn!(status, "token refresh rejected");
            return Err(AuthError::Refresh { status, body });
        }
        let tokens: TokenSet = match serde_json::from_str(&body) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(status, error = %e, "token refresh returned an unreadable body");
                return Err(AuthError::Refresh { status, body });
            }
        };
        if tokens.expires_in.is_none() {
            warn!(status, "token refresh response carries no expires_in");
            return Err(AuthError::Refresh { status, body });
        }
        state.apply_token_set(&tokens);
        debug!(expires_at = ?state.expires_at(), "access token refreshed");
        Ok(())
    }
}
