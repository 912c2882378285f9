use thiserror::Error;

/// Errors raised while authenticating cloud print requests.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Not enough credentials to build a token state or to refresh one.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The authorization server rejected a refresh-token exchange.
    ///
    /// Carries the raw response status and body for inspection.
    #[error("Token refresh failed with status {status}: {body}")]
    Refresh { status: u16, body: String },
    /// The ClientLogin endpoint rejected the account credentials.
    #[error("ClientLogin failed with status {status}: {body}")]
    Login { status: u16, body: String },
    #[error("URL expired prior to user verification")]
    FlowExpired,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the error is fatal for the credentials involved, as opposed
    /// to a transport hiccup the caller might retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Refresh { .. }
                | Self::Login { .. }
                | Self::FlowExpired
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
