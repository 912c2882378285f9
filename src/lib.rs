//! cloudprinting: authenticated access to a cloud print service.
//!
//! Provides the credential side of a cloud print client: the OAuth2 device
//! authorization flow used to obtain refresh credentials once, a token
//! lifecycle manager that refreshes access tokens as they expire, and
//! authenticators that stamp outgoing `reqwest` requests and retry once when
//! the server rejects a stale credential.
//!
//! # Quick Start
//!
//! ```no_run
//! use cloudprinting::prelude::*;
//!
//! # async fn example() -> Result<(), AuthError> {
//! let config = OAuthConfig::from_env()?;
//! let state = TokenState::builder()
//!     .refresh_token("1/refresh-token")
//!     .client_id(config.client_id.clone())
//!     .client_secret(config.client_secret.clone())
//!     .build()?;
//! let auth = OAuth2Auth::from_config(state, &config)?;
//!
//! let client = reqwest::Client::new();
//! let request = client.get("https://www.google.com/cloudprint/search").build()?;
//! let response = auth.send(&client, request).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod prelude;
pub mod util;
