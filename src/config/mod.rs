//! Configuration (layered: code > env > config file > defaults).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::error::AuthError;

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/token";
pub const DEFAULT_DEVICE_CODE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/device/code";
pub const DEFAULT_CLIENT_LOGIN_ENDPOINT: &str = "https://www.google.com/accounts/ClientLogin";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloudprint";
pub const DEFAULT_DEVICE_GRANT_TYPE: &str = "http://oauth.net/grant_type/device/1.0";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Endpoints and client credentials for the authorization server.
///
/// # Example
/// ```
/// use cloudprinting::config::OAuthConfig;
///
/// let config = OAuthConfig::new("client-id", "client-secret")
///     .with_token_endpoint("http://127.0.0.1:8080/token");
/// assert_eq!(config.token_endpoint, "http://127.0.0.1:8080/token");
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
    pub device_code_endpoint: String,
    pub client_login_endpoint: String,
    pub scope: String,
    pub device_grant_type: String,
    pub http_timeout_secs: u64,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .field("token_endpoint", &self.token_endpoint)
            .field("device_code_endpoint", &self.device_code_endpoint)
            .field("client_login_endpoint", &self.client_login_endpoint)
            .field("scope", &self.scope)
            .field("device_grant_type", &self.device_grant_type)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            device_code_endpoint: DEFAULT_DEVICE_CODE_ENDPOINT.to_string(),
            client_login_endpoint: DEFAULT_CLIENT_LOGIN_ENDPOINT.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            device_grant_type: DEFAULT_DEVICE_GRANT_TYPE.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// Environment variables read by [`OAuthConfig::from_env`].
const ENV_MAPPINGS: &[&str] = &[
    "CLOUDPRINT_CLIENT_ID",
    "CLOUDPRINT_CLIENT_SECRET",
    "CLOUDPRINT_TOKEN_ENDPOINT",
    "CLOUDPRINT_DEVICE_CODE_ENDPOINT",
    "CLOUDPRINT_CLIENT_LOGIN_ENDPOINT",
    "CLOUDPRINT_SCOPE",
    "CLOUDPRINT_HTTP_TIMEOUT_SECS",
];

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = url.into();
        self
    }

    pub fn with_device_code_endpoint(mut self, url: impl Into<String>) -> Self {
        self.device_code_endpoint = url.into();
        self
    }

    pub fn with_client_login_endpoint(mut self, url: impl Into<String>) -> Self {
        self.client_login_endpoint = url.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_device_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.device_grant_type = grant_type.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout_secs = timeout.as_secs();
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Default config file path (~/.cloudprinting/config.toml).
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".cloudprinting"))
            .unwrap_or_else(|| PathBuf::from(".cloudprinting"))
            .join("config.toml")
    }

    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, AuthError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a TOML config file. A missing file yields the defaults.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }

    /// Load the default config file, then apply `.env` and environment overrides.
    pub fn from_env() -> Result<Self, AuthError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let config = Self::load_from_path(Self::default_path())?;
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AuthError> {
        for key in ENV_MAPPINGS {
            let Some(value) = lookup(key) else {
                continue;
            };
            match *key {
                "CLOUDPRINT_CLIENT_ID" => self.client_id = value,
                "CLOUDPRINT_CLIENT_SECRET" => self.client_secret = value,
                "CLOUDPRINT_TOKEN_ENDPOINT" => self.token_endpoint = value,
                "CLOUDPRINT_DEVICE_CODE_ENDPOINT" => self.device_code_endpoint = value,
                "CLOUDPRINT_CLIENT_LOGIN_ENDPOINT" => self.client_login_endpoint = value,
                "CLOUDPRINT_SCOPE" => self.scope = value,
                "CLOUDPRINT_HTTP_TIMEOUT_SECS" => {
                    self.http_timeout_secs = value.trim().parse().map_err(|_| {
                        AuthError::configuration(format!(
                            "CLOUDPRINT_HTTP_TIMEOUT_SECS must be a number of seconds, got {value:?}"
                        ))
                    })?;
                }
                _ => {}
            }
        }
        Ok(self)
    }

    /// Fails unless both client credentials are set.
    pub fn require_client_credentials(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(AuthError::configuration(
                "client_id and client_secret are required",
            ));
        }
        Ok(())
    }
}
