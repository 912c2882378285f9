mod auth_support;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cloudprinting::auth::{
    Authenticator, AuthError, DeviceAuthorizationFlow, DeviceCodePoll, DeviceCodeSession,
    DeviceFlowStep, FlowPhase, OAuth2Auth, TokenState,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use auth_support::{config_for, requests_to, CLIENT_ID, CLIENT_SECRET};

const TOKEN_PATH: &str = "/o/oauth2/token";
const DEVICE_CODE_PATH: &str = "/o/oauth2/device/code";

async fn mount_device_code(server: &MockServer, interval: u64, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path(DEVICE_CODE_PATH))
        .and(body_string_contains("client_id=client-id"))
        .and(body_string_contains(
            "scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcloudprint",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "4/device-code",
            "user_code": "GQVQ-JKEC",
            "verification_url": "https://www.google.com/device",
            "expires_in": expires_in,
            "interval": interval
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn device_tokens() -> serde_json::Value {
    json!({
        "access_token": "ya29.device",
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": "1/device-refresh"
    })
}

fn flow_for(server: &MockServer) -> DeviceAuthorizationFlow {
    DeviceAuthorizationFlow::new(config_for(server)).expect("flow")
}

#[tokio::test]
async fn first_step_returns_verification_url_and_user_code() {
    let server = MockServer::start().await;
    mount_device_code(&server, 5, 1800).await;

    let mut flow = flow_for(&server);
    let step = flow.advance().await.expect("prompt");

    assert_eq!(
        step,
        DeviceFlowStep::Prompt {
            verification_url: "https://www.google.com/device".to_string(),
            user_code: "GQVQ-JKEC".to_string(),
        }
    );
    assert_eq!(flow.phase(), FlowPhase::AwaitingApproval);
    let session = flow.session().expect("session");
    assert_eq!(session.device_code, "4/device-code");
    assert_eq!(session.interval, Duration::from_secs(5));
    assert!(!session.is_expired());
}

/// Answers each poll with the next scripted pending error, then with tokens,
/// and records when every poll arrived.
struct ScriptedPolls {
    pending: Vec<&'static str>,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedPolls {
    fn new(pending: Vec<&'static str>) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let responder = Self {
            pending,
            arrivals: arrivals.clone(),
        };
        (responder, arrivals)
    }
}

impl Respond for ScriptedPolls {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.push(Instant::now());
        match self.pending.get(arrivals.len() - 1) {
            Some(error) => ResponseTemplate::new(400).set_body_json(json!({ "error": error })),
            None => ResponseTemplate::new(200).set_body_json(device_tokens()),
        }
    }
}

fn gaps(arrivals: &Mutex<Vec<Instant>>) -> Vec<Duration> {
    let arrivals = arrivals.lock().unwrap();
    arrivals
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]))
        .collect()
}

#[tokio::test]
async fn second_step_polls_at_interval_until_authorized() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1, 1800).await;
    let (responder, arrivals) =
        ScriptedPolls::new(vec!["authorization_pending", "authorization_pending"]);
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("code=4%2Fdevice-code"))
        .and(body_string_contains("client_secret=client-secret"))
        .and(body_string_contains(
            "grant_type=http%3A%2F%2Foauth.net%2Fgrant_type%2Fdevice%2F1.0",
        ))
        .respond_with(responder)
        .expect(3)
        .mount(&server)
        .await;

    let mut flow = flow_for(&server);
    flow.advance().await.expect("prompt");
    let step = flow.advance().await.expect("tokens");

    match step {
        DeviceFlowStep::Authorized(tokens) => {
            assert_eq!(tokens.access_token, "ya29.device");
            assert_eq!(tokens.refresh_token.as_deref(), Some("1/device-refresh"));
            assert_eq!(tokens.expires_in, Some(3600));
        }
        other => panic!("expected Authorized, got {other:?}"),
    }
    let gaps = gaps(&arrivals);
    assert_eq!(gaps.len(), 2);
    for gap in gaps {
        assert!(gap >= Duration::from_secs(1), "polls only {gap:?} apart");
    }
    assert_eq!(flow.phase(), FlowPhase::Completed);
}

#[tokio::test]
async fn slow_down_widens_spacing_of_later_polls() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1, 1800).await;
    let (responder, arrivals) = ScriptedPolls::new(vec!["slow_down"]);
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(responder)
        .expect(2)
        .mount(&server)
        .await;

    let mut flow = flow_for(&server);
    flow.advance().await.expect("prompt");
    let step = flow.advance().await.expect("tokens");

    assert!(matches!(step, DeviceFlowStep::Authorized(_)));
    let gaps = gaps(&arrivals);
    assert_eq!(gaps.len(), 1);
    assert!(
        gaps[0] >= Duration::from_secs(6),
        "poll after slow_down came {:?} later",
        gaps[0]
    );
}

#[tokio::test]
async fn second_step_fails_once_code_expires_without_approval() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1, 1).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(428).set_body_json(json!({
            "error": "authorization_pending"
        })))
        .mount(&server)
        .await;

    let mut flow = flow_for(&server);
    flow.advance().await.expect("prompt");
    let result = flow.advance().await;

    assert!(matches!(result, Err(AuthError::FlowExpired)));
    assert_eq!(flow.phase(), FlowPhase::Expired);
    let polls = requests_to(&server, TOKEN_PATH).await;
    assert!((1..=2).contains(&polls), "polled {polls} times");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(requests_to(&server, TOKEN_PATH).await, polls);
    assert!(matches!(
        flow.advance().await,
        Err(AuthError::InvalidState(_))
    ));
}

#[tokio::test]
async fn completed_flow_cannot_be_advanced_again() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1, 1800).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_tokens()))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = flow_for(&server);
    flow.advance().await.expect("prompt");
    flow.advance().await.expect("tokens");

    let result = flow.advance().await;
    assert!(matches!(result, Err(AuthError::InvalidState(message)) if message.contains("completed")));
    assert!(flow.session().is_none());
}

#[tokio::test]
async fn failed_device_code_request_keeps_flow_at_first_step() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICE_CODE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = flow_for(&server);
    let result = flow.advance().await;

    assert!(matches!(result, Err(AuthError::InvalidResponse(message)) if message.contains("401")));
    assert_eq!(flow.phase(), FlowPhase::AwaitingCodeRequest);
}

#[tokio::test]
async fn malformed_device_code_response_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICE_CODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_code": "GQVQ-JKEC"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = flow_for(&server);
    let result = flow.advance().await;

    assert!(matches!(result, Err(AuthError::InvalidResponse(message)) if message.contains("malformed")));
    assert_eq!(flow.phase(), FlowPhase::AwaitingCodeRequest);
}

#[tokio::test]
async fn poll_once_reports_pending_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "slow_down"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow_for(&server);
    let session = DeviceCodeSession::new("https://www.google.com/device", "GQVQ-JKEC", "4/x", 5, 600);
    let poll = flow.poll_once(&session).await.expect("poll");

    assert_eq!(
        poll,
        DeviceCodePoll::Pending {
            error: "slow_down".to_string()
        }
    );
}

#[tokio::test]
async fn poll_once_rejects_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow_for(&server);
    let session = DeviceCodeSession::new("https://www.google.com/device", "GQVQ-JKEC", "4/x", 5, 600);
    let result = flow.poll_once(&session).await;

    assert!(matches!(result, Err(AuthError::InvalidResponse(message)) if message.contains("502")));
}

#[tokio::test]
async fn device_tokens_bootstrap_an_authenticator() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1, 1800).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_tokens()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cloudprint/search"))
        .and(header("authorization", "Bearer ya29.device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "printers": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let mut flow = flow_for(&server);
    flow.advance().await.expect("prompt");
    let DeviceFlowStep::Authorized(tokens) = flow.advance().await.expect("tokens") else {
        panic!("expected tokens");
    };

    let state = TokenState::from_token_set(tokens, CLIENT_ID, CLIENT_SECRET);
    let auth = OAuth2Auth::from_config(state, &config).expect("auth");
    assert!(auth.auto_refresh());

    let client = reqwest::Client::new();
    let request = client
        .get(format!("{}/cloudprint/search", server.uri()))
        .build()
        .unwrap();
    let response = auth.send(&client, request).await.expect("send");
    assert_eq!(response.status().as_u16(), 200);
}
