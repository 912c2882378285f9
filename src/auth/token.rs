use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Token set returned by the authorization server's token endpoint.
///
/// # Example
/// ```
/// use cloudprinting::auth::TokenSet;
///
/// let tokens: TokenSet = serde_json::from_str(
///     r#"{"access_token":"ya29.abc","token_type":"Bearer","expires_in":3600,"refresh_token":"1/xyz"}"#,
/// ).unwrap();
/// assert_eq!(tokens.refresh_token.as_deref(), Some("1/xyz"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Credentials needed to exchange a refresh token for a new access token.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshCredentials {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for RefreshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCredentials")
            .field("refresh_token", &"..")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .finish()
    }
}

/// Read-only copy of a [`TokenState`], safe to hand out or persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
}

/// Credential state of one authenticated session.
///
/// Either an access token with its type, or a full set of refresh
/// credentials, must be supplied; the builder rejects anything less.
/// `expires_in` (seconds from now) is ignored when `expires_at` is given.
///
/// # Example
/// ```
/// use cloudprinting::auth::TokenState;
///
/// let state = TokenState::builder()
///     .refresh_token("1/xyz")
///     .client_id("client")
///     .client_secret("secret")
///     .build()?;
/// assert!(state.is_expired());
/// assert!(state.can_refresh());
/// # Ok::<(), cloudprinting::auth::AuthError>(())
/// ```
#[derive(Clone)]
pub struct TokenState {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    refresh: Option<RefreshCredentials>,
}

#[bon::bon]
impl TokenState {
    #[builder]
    pub fn new(
        #[builder(into)] access_token: Option<String>,
        #[builder(into)] token_type: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        expires_in: Option<u64>,
        #[builder(into)] refresh_token: Option<String>,
        #[builder(into)] client_id: Option<String>,
        #[builder(into)] client_secret: Option<String>,
    ) -> Result<Self, AuthError> {
        let refresh = match (refresh_token, client_id, client_secret) {
            (Some(refresh_token), Some(client_id), Some(client_secret)) => {
                Some(RefreshCredentials {
                    refresh_token,
                    client_id,
                    client_secret,
                })
            }
            (None, None, None) => None,
            _ => {
                tracing::debug!("partial refresh credentials supplied; auto-refresh disabled");
                None
            }
        };
        let has_token = access_token.is_some() && token_type.is_some();
        if !has_token && refresh.is_none() {
            return Err(AuthError::configuration(
                "either access_token and token_type, or refresh_token, client_id and client_secret are required",
            ));
        }
        let expires_at = expires_at.or_else(|| expires_in.map(expiry_from_now));
        Ok(Self {
            access_token,
            token_type,
            expires_at,
            refresh,
        })
    }
}

impl TokenState {
    /// Build a state from the token set a device flow produced.
    pub fn from_token_set(
        tokens: TokenSet,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let refresh = tokens.refresh_token.clone().map(|refresh_token| RefreshCredentials {
            refresh_token,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        });
        let mut state = Self {
            access_token: None,
            token_type: None,
            expires_at: None,
            refresh,
        };
        state.apply_token_set(&tokens);
        state
    }

    /// True when the expiry is unknown or already reached.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// `Authorization` header value, once both token and type are known.
    pub fn authorization(&self) -> Option<String> {
        match (&self.token_type, &self.access_token) {
            (Some(token_type), Some(access_token)) => Some(format!("{token_type} {access_token}")),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            access_token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
            refresh_token: self.refresh.as_ref().map(|r| r.refresh_token.clone()),
        }
    }

    pub(crate) fn refresh_credentials(&self) -> Option<&RefreshCredentials> {
        self.refresh.as_ref()
    }

    pub(crate) fn mark_expired(&mut self) {
        self.expires_at = Some(DateTime::<Utc>::from(std::time::UNIX_EPOCH));
    }

    pub(crate) fn apply_token_set(&mut self, tokens: &TokenSet) {
        self.access_token = Some(tokens.access_token.clone());
        self.token_type = Some(tokens.token_type.clone());
        self.expires_at = tokens.expires_in.map(expiry_from_now);
        if let (Some(refresh), Some(rotated)) = (self.refresh.as_mut(), &tokens.refresh_token) {
            refresh.refresh_token = rotated.clone();
        }
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &self.access_token.as_ref().map(|_| ".."))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("refresh", &self.refresh)
            .finish()
    }
}

fn expiry_from_now(expires_in: u64) -> DateTime<Utc> {
    i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
