//! OAuth2 device flow, token refresh and request authentication.

pub mod authenticator;
pub mod client_login;
pub mod device_code;
pub mod error;
pub mod oauth2;
pub mod refresh;
pub mod token;

pub use authenticator::Authenticator;
pub use client_login::{ClientLoginAuth, CredentialExchange, GoogleClientLogin};
pub use device_code::{
    DeviceAuthorizationFlow, DeviceCodePoll, DeviceCodeSession, DeviceFlowStep, FlowPhase,
};
pub use error::AuthError;
pub use oauth2::OAuth2Auth;
pub use refresh::TokenRefresher;
pub use token::{RefreshCredentials, TokenSet, TokenSnapshot, TokenState};
