use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::AuthError;
use super::token::TokenSet;
use crate::config::OAuthConfig;
use crate::util::http::{build_client, read_body};

/// Poll period used when the device-code response omits `interval`.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Added to the poll period each time the server answers `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Device-code session details returned by the first step of the flow.
///
/// # Example
/// ```
/// use cloudprinting::auth::DeviceCodeSession;
///
/// let session = DeviceCodeSession::new(
///     "https://www.google.com/device",
///     "ABCD-EFGH",
///     "4/device-code",
///     5,
///     1800,
/// );
/// assert_eq!(session.interval.as_secs(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct DeviceCodeSession {
    pub verification_url: String,
    pub user_code: String,
    pub device_code: String,
    pub interval: Duration,
    pub expires_at: DateTime<Utc>,
    deadline: Instant,
}

impl DeviceCodeSession {
    pub fn new(
        verification_url: impl Into<String>,
        user_code: impl Into<String>,
        device_code: impl Into<String>,
        interval_secs: u64,
        expires_in_secs: u64,
    ) -> Self {
        let lifetime = Duration::from_secs(expires_in_secs);
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            verification_url: verification_url.into(),
            user_code: user_code.into(),
            device_code: device_code.into(),
            interval: Duration::from_secs(interval_secs),
            expires_at,
            deadline: far_deadline(lifetime),
        }
    }

    /// True once the user can no longer approve this code.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.deadline
    }
}

/// Outcome of a single poll of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCodePoll {
    /// The server answered with an `error`; the user has not approved yet.
    Pending { error: String },
    Authorized { tokens: TokenSet },
}

/// Value produced by each [`DeviceAuthorizationFlow::advance`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFlowStep {
    /// Show these to the user, then advance again to wait for approval.
    Prompt {
        verification_url: String,
        user_code: String,
    },
    Authorized(TokenSet),
}

/// Where a [`DeviceAuthorizationFlow`] currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FlowPhase {
    AwaitingCodeRequest,
    AwaitingApproval,
    Completed,
    Expired,
}

#[derive(Debug)]
enum FlowState {
    AwaitingCodeRequest,
    AwaitingApproval {
        session: DeviceCodeSession,
        last_poll: Option<Instant>,
    },
    Completed,
    Expired,
}

/// OAuth2 device authorization flow for the cloud print scope.
///
/// The first [`advance`](Self::advance) requests a device code and returns
/// the URL and code to show the user. The second blocks, polling at the
/// server's rate limit, until the user approves (yielding the token set) or
/// the code expires. The flow cannot be restarted; drop it to cancel.
///
/// # Example
/// ```no_run
/// use cloudprinting::auth::{DeviceAuthorizationFlow, DeviceFlowStep};
/// use cloudprinting::config::OAuthConfig;
///
/// # async fn example() -> Result<(), cloudprinting::auth::AuthError> {
/// let mut flow = DeviceAuthorizationFlow::new(OAuthConfig::new("client-id", "client-secret"))?;
/// if let DeviceFlowStep::Prompt { verification_url, user_code } = flow.advance().await? {
///     println!("Browse to {verification_url} and enter {user_code}");
/// }
/// if let DeviceFlowStep::Authorized(tokens) = flow.advance().await? {
///     println!("refresh token: {:?}", tokens.refresh_token);
/// }
/// # Ok(())
/// # }
/// ```
pub struct DeviceAuthorizationFlow {
    client: reqwest::Client,
    config: OAuthConfig,
    state: FlowState,
}

impl DeviceAuthorizationFlow {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        config.require_client_credentials()?;
        let client = build_client(config.http_timeout())?;
        Ok(Self {
            client,
            config,
            state: FlowState::AwaitingCodeRequest,
        })
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn phase(&self) -> FlowPhase {
        match self.state {
            FlowState::AwaitingCodeRequest => FlowPhase::AwaitingCodeRequest,
            FlowState::AwaitingApproval { .. } => FlowPhase::AwaitingApproval,
            FlowState::Completed => FlowPhase::Completed,
            FlowState::Expired => FlowPhase::Expired,
        }
    }

    /// The active session, while waiting for approval.
    pub fn session(&self) -> Option<&DeviceCodeSession> {
        match &self.state {
            FlowState::AwaitingApproval { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Run the next step of the flow.
    ///
    /// Network failures leave the flow where it was, so the same step can be
    /// advanced again. Expiry is final.
    pub async fn advance(&mut self) -> Result<DeviceFlowStep, AuthError> {
        match self.state {
            FlowState::AwaitingCodeRequest => {
                let session = self.request_code().await?;
                let step = DeviceFlowStep::Prompt {
                    verification_url: session.verification_url.clone(),
                    user_code: session.user_code.clone(),
                };
                self.state = FlowState::AwaitingApproval {
                    session,
                    last_poll: None,
                };
                Ok(step)
            }
            FlowState::AwaitingApproval { .. } => self.await_approval().await,
            FlowState::Completed => Err(AuthError::InvalidState(
                "device flow already completed".to_string(),
            )),
            FlowState::Expired => Err(AuthError::InvalidState(
                "device flow expired; start a new flow".to_string(),
            )),
        }
    }

    /// Request a device code and user code.
    pub async fn request_code(&self) -> Result<DeviceCodeSession, AuthError> {
        debug!(endpoint = %self.config.device_code_endpoint, "requesting device code");
        let resp = self
            .client
            .post(&self.config.device_code_endpoint)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await?;
        let (status, body) = read_body(resp).await?;
        if !(200..300).contains(&status) {
            return Err(AuthError::InvalidResponse(format!(
                "Device code request failed with status {status}"
            )));
        }
        let payload: DeviceCodeResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::InvalidResponse(format!("Device code response is malformed: {e}"))
        })?;
        Ok(DeviceCodeSession::new(
            payload.verification_url,
            payload.user_code,
            payload.device_code,
            payload.interval,
            payload.expires_in,
        ))
    }

    /// Ask the token endpoint once whether `session` has been approved.
    pub async fn poll_once(&self, session: &DeviceCodeSession) -> Result<DeviceCodePoll, AuthError> {
        let resp = self
            .client
            .post(&self.config.token_endpoint)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", session.device_code.as_str()),
                ("grant_type", self.config.device_grant_type.as_str()),
            ])
            .send()
            .await?;
        let (status, body) = read_body(resp).await?;
        let payload: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            AuthError::InvalidResponse(format!(
                "Device token poll returned status {status} with a non-JSON body"
            ))
        })?;
        if let Some(error) = payload.get("error") {
            let error = error
                .as_str()
                .map(ToString::to_string)
                .unwrap_or_else(|| error.to_string());
            return Ok(DeviceCodePoll::Pending { error });
        }
        let tokens: TokenSet = serde_json::from_value(payload).map_err(|e| {
            AuthError::InvalidResponse(format!("Device token response missing fields: {e}"))
        })?;
        Ok(DeviceCodePoll::Authorized { tokens })
    }

    async fn await_approval(&mut self) -> Result<DeviceFlowStep, AuthError> {
        loop {
            let FlowState::AwaitingApproval { session, last_poll } = &mut self.state else {
                return Err(AuthError::InvalidState(
                    "device flow is not awaiting approval".to_string(),
                ));
            };
            let now = Instant::now();
            if now > session.deadline {
                warn!(user_code = %session.user_code, "device code expired before approval");
                self.state = FlowState::Expired;
                return Err(AuthError::FlowExpired);
            }
            if let Some(previous) = *last_poll {
                let wait = session.interval.saturating_sub(now.duration_since(previous));
                tokio::time::sleep(wait).await;
            }
            *last_poll = Some(Instant::now());
            let session = session.clone();

            match self.poll_once(&session).await? {
                DeviceCodePoll::Pending { error } => {
                    debug!(%error, "device authorization pending");
                    if error == "slow_down" {
                        if let FlowState::AwaitingApproval { session, .. } = &mut self.state {
                            session.interval = slowed_interval(session.interval);
                        }
                    }
                }
                DeviceCodePoll::Authorized { tokens } => {
                    debug!("device authorization granted");
                    self.state = FlowState::Completed;
                    return Ok(DeviceFlowStep::Authorized(tokens));
                }
            }
        }
    }
}

fn far_deadline(lifetime: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(lifetime)
        .unwrap_or_else(|| now + Duration::from_secs(u64::from(u32::MAX)))
}

fn slowed_interval(interval: Duration) -> Duration {
    interval + SLOW_DOWN_STEP
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_uri")]
    verification_url: String,
    expires_in: u64,
    #[serde(default = "default_poll_interval")]
    interval: u64,
}
