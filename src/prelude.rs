//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, Authenticator, ClientLoginAuth, DeviceAuthorizationFlow, DeviceFlowStep,
    OAuth2Auth, TokenSet, TokenState,
};
pub use crate::config::OAuthConfig;
