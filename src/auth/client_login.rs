//! Legacy ClientLogin authentication.
//!
//! Google's deprecated email/password token API. Kept for accounts that
//! never moved to OAuth2.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::authenticator::Authenticator;
use super::error::AuthError;
use crate::config::OAuthConfig;
use crate::util::http::{build_client, read_body, set_authorization};

const SERVICE: &str = "cloudprint";
const ACCOUNT_TYPE: &str = "HOSTED_OR_GOOGLE";
const SOURCE: &str = concat!("cloudprinting-", env!("CARGO_PKG_VERSION"));

/// Source of opaque ClientLogin tokens.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn fetch_token(&self) -> Result<String, AuthError>;
}

/// [`CredentialExchange`] against the ClientLogin endpoint.
pub struct GoogleClientLogin {
    client: reqwest::Client,
    endpoint: String,
    email: String,
    password: String,
}

impl fmt::Debug for GoogleClientLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleClientLogin")
            .field("endpoint", &self.endpoint)
            .field("email", &self.email)
            .field("password", &"..")
            .finish()
    }
}

impl GoogleClientLogin {
    pub fn new(
        config: &OAuthConfig,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            client: build_client(config.http_timeout())?,
            endpoint: config.client_login_endpoint.clone(),
            email: email.into(),
            password: password.into(),
        })
    }
}

#[async_trait]
impl CredentialExchange for GoogleClientLogin {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        debug!(endpoint = %self.endpoint, email = %self.email, "requesting ClientLogin token");
        let resp = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("accountType", ACCOUNT_TYPE),
                ("Email", self.email.as_str()),
                ("Passwd", self.password.as_str()),
                ("service", SERVICE),
                ("source", SOURCE),
            ])
            .send()
            .await?;
        let (status, body) = read_body(resp).await?;
        if !(200..300).contains(&status) {
            warn!(status, "ClientLogin rejected credentials");
            return Err(AuthError::Login { status, body });
        }
        parse_auth_line(&body).ok_or_else(|| {
            AuthError::InvalidResponse("ClientLogin response missing Auth line".to_string())
        })
    }
}

/// Authenticator for the legacy ClientLogin scheme.
///
/// With caching on (the default) one token is reused across requests and a
/// 403 discards it and retries once with a new one. With caching off every
/// request fetches its own token and 403s pass through.
///
/// # Example
/// ```no_run
/// use cloudprinting::auth::{ClientLoginAuth, GoogleClientLogin};
/// use cloudprinting::config::OAuthConfig;
///
/// let exchange = GoogleClientLogin::new(&OAuthConfig::default(), "user@example.com", "password")?;
/// let auth = ClientLoginAuth::new(exchange).with_caching(false);
/// # Ok::<(), cloudprinting::auth::AuthError>(())
/// ```
pub struct ClientLoginAuth {
    exchange: Arc<dyn CredentialExchange>,
    caching: bool,
    cached: Mutex<Option<String>>,
}

impl ClientLoginAuth {
    pub fn new(exchange: impl CredentialExchange + 'static) -> Self {
        Self::from_exchange(Arc::new(exchange))
    }

    pub fn from_exchange(exchange: Arc<dyn CredentialExchange>) -> Self {
        Self {
            exchange,
            caching: true,
            cached: Mutex::new(None),
        }
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn caching(&self) -> bool {
        self.caching
    }

    async fn token(&self) -> Result<String, AuthError> {
        if !self.caching {
            return self.exchange.fetch_token().await;
        }
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.exchange.fetch_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl Authenticator for ClientLoginAuth {
    async fn apply(&self, request: &mut reqwest::Request) -> Result<(), AuthError> {
        let token = self.token().await?;
        set_authorization(request, &header_value(&token))
    }

    fn retries_forbidden(&self) -> bool {
        self.caching
    }

    async fn invalidate(&self, rejected: Option<&str>) -> Result<(), AuthError> {
        let mut cached = self.cached.lock().await;
        let stale = match (cached.as_deref(), rejected) {
            (Some(token), Some(rejected)) => header_value(token) == rejected,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if stale {
            debug!("discarding stale ClientLogin token");
            *cached = None;
        }
        Ok(())
    }
}

fn header_value(token: &str) -> String {
    format!("GoogleLogin auth={token}")
}

fn parse_auth_line(body: &str) -> Option<String> {
    body.lines()
        .filter_map(|line| line.trim().strip_prefix("Auth="))
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(ToString::to_string)
}
