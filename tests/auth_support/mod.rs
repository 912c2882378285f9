#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cloudprinting::auth::{AuthError, CredentialExchange, TokenState};
use cloudprinting::config::OAuthConfig;
use serde_json::{json, Value};
use wiremock::MockServer;

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";
pub const REFRESH_TOKEN: &str = "1/refresh-token";

pub fn config_for(server: &MockServer) -> OAuthConfig {
    OAuthConfig::new(CLIENT_ID, CLIENT_SECRET)
        .with_token_endpoint(format!("{}/o/oauth2/token", server.uri()))
        .with_device_code_endpoint(format!("{}/o/oauth2/device/code", server.uri()))
        .with_client_login_endpoint(format!("{}/accounts/ClientLogin", server.uri()))
}

pub fn token_body(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

/// Refresh credentials only; the first request has to refresh.
pub fn refreshable_state() -> TokenState {
    TokenState::builder()
        .refresh_token(REFRESH_TOKEN)
        .client_id(CLIENT_ID)
        .client_secret(CLIENT_SECRET)
        .build()
        .expect("refreshable state")
}

/// A still-valid access token that can also be refreshed.
pub fn valid_refreshable_state(access_token: &str) -> TokenState {
    TokenState::builder()
        .access_token(access_token)
        .token_type("Bearer")
        .expires_in(3600)
        .refresh_token(REFRESH_TOKEN)
        .client_id(CLIENT_ID)
        .client_secret(CLIENT_SECRET)
        .build()
        .expect("valid refreshable state")
}

pub async fn requests_to(server: &MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == path)
        .count()
}

/// Hands out `token-1`, `token-2`, ... and counts how often it was asked.
#[derive(Default)]
pub struct CountingExchange {
    fetches: AtomicUsize,
}

impl CountingExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialExchange for CountingExchange {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{fetch}"))
    }
}
