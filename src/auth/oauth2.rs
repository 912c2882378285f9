use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::authenticator::Authenticator;
use super::error::AuthError;
use super::refresh::TokenRefresher;
use super::token::{TokenSnapshot, TokenState};
use crate::config::OAuthConfig;
use crate::util::http::{build_client, set_authorization, shared_client};

/// OAuth2 request authenticator for Google Cloud Print.
///
/// Shares one [`TokenState`] between any number of concurrent requests. The
/// expiry check, refresh and header construction for a request all happen
/// under one lock, so a burst of requests on an expired token performs a
/// single refresh. When the state carries refresh credentials, a 403 reply
/// triggers one refresh and one retry through [`Authenticator::send`].
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use cloudprinting::auth::{OAuth2Auth, TokenState};
/// use cloudprinting::config::OAuthConfig;
///
/// let config = OAuthConfig::new("client-id", "client-secret");
/// let state = TokenState::builder()
///     .refresh_token("1/xyz")
///     .client_id(config.client_id.clone())
///     .client_secret(config.client_secret.clone())
///     .build()?;
/// let auth = Arc::new(OAuth2Auth::from_config(state, &config)?);
/// # Ok::<(), cloudprinting::auth::AuthError>(())
/// ```
pub struct OAuth2Auth {
    refresher: TokenRefresher,
    state: Mutex<TokenState>,
    auto_refresh: bool,
}

impl OAuth2Auth {
    /// Authenticator talking to the default token endpoint.
    pub fn new(state: TokenState) -> Self {
        Self::with_refresher(state, TokenRefresher::new(shared_client().clone()))
    }

    pub fn from_config(state: TokenState, config: &OAuthConfig) -> Result<Self, AuthError> {
        let client = build_client(config.http_timeout())?;
        let refresher = TokenRefresher::new(client).with_token_endpoint(&config.token_endpoint);
        Ok(Self::with_refresher(state, refresher))
    }

    pub fn with_refresher(state: TokenState, refresher: TokenRefresher) -> Self {
        let auto_refresh = state.can_refresh();
        Self {
            refresher,
            state: Mutex::new(state),
            auto_refresh,
        }
    }

    /// Whether 403 responses are retried after a refresh.
    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub async fn is_expired(&self) -> bool {
        self.state.lock().await.is_expired()
    }

    /// Refresh the access token if it has expired.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        self.refresher.refresh(&mut state).await
    }

    pub async fn snapshot(&self) -> TokenSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Header value for the next request, refreshing first if expired.
    ///
    /// Takes the already-held guard so the proactive and reactive paths
    /// share it without locking twice.
    async fn authorization_locked(&self, state: &mut TokenState) -> Result<String, AuthError> {
        if state.is_expired() {
            self.refresher.refresh(state).await?;
        }
        state
            .authorization()
            .ok_or_else(|| AuthError::configuration("no access token available"))
    }
}

#[async_trait]
impl Authenticator for OAuth2Auth {
    async fn apply(&self, request: &mut reqwest::Request) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        let authorization = self.authorization_locked(&mut state).await?;
        set_authorization(request, &authorization)
    }

    fn retries_forbidden(&self) -> bool {
        self.auto_refresh
    }

    async fn invalidate(&self, rejected: Option<&str>) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        let current = state.authorization();
        if rejected.is_none() || current.as_deref() == rejected {
            state.mark_expired();
        } else {
            debug!("rejected token already replaced; not expiring again");
        }
        self.authorization_locked(&mut state).await.map(|_| ())
    }
}
