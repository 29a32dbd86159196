mod support;

use std::sync::Arc;
use std::time::Duration;

use openo_connect::error::{ConnectError, CredentialFailure};
use openo_connect::oauth::{SessionPhase, TokenPair};
use openo_connect::session::{AuthSession, PROVIDER_IDENTITY_ENDPOINT};
use openo_connect::store::ClientCredentials;
use pretty_assertions::assert_eq;
use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{config, configured_secrets, memory_secrets, user_credentials, StubBridge, CALLBACK};

async fn mount_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oscar/ws/oauth/initiate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("oauth_token=abc&oauth_token_secret=xyz"))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oscar/ws/oauth/token"))
        .and(body_string_contains("oauth_verifier=verifier123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("oauth_token=AT1&oauth_token_secret=ATS1"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/oscar/ws/services/{PROVIDER_IDENTITY_ENDPOINT}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"providerNo": "999998", "firstName": "Doc"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn unauthorized_response_demotes_access_token_but_keeps_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oscar/ws/services/schedule/day/2024-01-01"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let secrets = configured_secrets(&server);
    secrets.save_user_credentials(&user_credentials());
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
    let session = AuthSession::new(secrets.clone(), config());
    let mut updates = session.subscribe();
    assert!(updates.borrow_and_update().has_access_token);

    let response = session
        .authorized_request(Method::GET, "schedule/day/2024-01-01", None)
        .await;

    assert_eq!(response.code, Some(401));
    let snapshot = updates.borrow_and_update().clone();
    assert!(!snapshot.has_access_token);
    assert!(snapshot.has_user_credentials);
    assert!(!snapshot.loading);
    assert!(!secrets.has_access_token());
}

#[tokio::test]
async fn late_unauthorized_response_spares_newer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oscar/ws/services/schedule/day/2024-01-01"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    let secrets = configured_secrets(&server);
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
    let session = Arc::new(AuthSession::new(secrets.clone(), config()));

    let pending = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .authorized_request(Method::GET, "schedule/day/2024-01-01", None)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    secrets.save_access_token(&TokenPair::new("AT2", "ATS2"));

    let response = pending.await.expect("task completes");
    assert_eq!(response.code, Some(401));
    assert_eq!(secrets.access_token(), Some(TokenPair::new("AT2", "ATS2")));
    assert!(session.snapshot().has_access_token);
}

#[tokio::test]
async fn loading_stays_set_while_any_request_is_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oscar/ws/services/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oscar/ws/services/fast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let secrets = configured_secrets(&server);
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
    let session = Arc::new(AuthSession::new(secrets, config()));

    let slow = tokio::spawn({
        let session = session.clone();
        async move { session.authorized_request(Method::GET, "slow", None).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.snapshot().loading);

    let fast = session.authorized_request(Method::GET, "fast", None).await;
    assert!(fast.is_success());
    assert!(session.snapshot().loading, "slow request is still running");

    assert!(slow.await.expect("task completes").is_success());
    assert!(!session.snapshot().loading);
}

#[tokio::test]
async fn successful_request_keeps_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oscar/ws/services/providerService/providers_json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"providerNo": "1"}])))
        .mount(&server)
        .await;
    let secrets = configured_secrets(&server);
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
    let session = AuthSession::new(secrets, config());

    let response = session
        .authorized_request(Method::GET, "providerService/providers_json", None)
        .await;
    assert!(response.is_success());
    assert!(session.snapshot().has_access_token);
}

#[tokio::test]
async fn manual_authorization_stores_token_and_loads_provider() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;
    let session = AuthSession::new(configured_secrets(&server), config());

    let url = session.begin_authorization().await.expect("request token");
    assert!(url.ends_with("/ws/oauth/authorize?oauth_token=abc"));

    let response = session
        .complete_authorization(&format!("{CALLBACK}?oauth_token=abc&oauth_verifier=verifier123"))
        .await
        .expect("exchange attempted");

    assert!(response.is_success());
    let snapshot = session.snapshot();
    assert!(snapshot.has_access_token);
    assert!(!snapshot.loading);
    assert_eq!(snapshot.provider, Some(json!({"providerNo": "999998", "firstName": "Doc"})));
}

#[tokio::test]
async fn begin_authorization_surfaces_server_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oscar/ws/oauth/initiate"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let session = AuthSession::new(configured_secrets(&server), config());

    let err = session.begin_authorization().await.expect_err("server down");
    assert_eq!(err.status(), Some(503));
    assert!(!session.snapshot().loading);
}

#[tokio::test]
async fn begin_authorization_keeps_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oscar/ws/oauth/initiate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Unknown consumer key"})))
        .mount(&server)
        .await;
    let session = AuthSession::new(configured_secrets(&server), config());

    let err = session.begin_authorization().await.expect_err("key rejected");
    assert!(matches!(
        err,
        ConnectError::Server { status: 500, ref message } if message == "Unknown consumer key"
    ));
}

#[tokio::test]
async fn authorization_without_client_key_is_a_configuration_error() {
    let session = AuthSession::new(memory_secrets(), config());
    assert!(session.manager().is_none());
    assert!(matches!(
        session.begin_authorization().await,
        Err(ConnectError::Configuration(_))
    ));
}

#[tokio::test]
async fn connect_runs_full_silent_reauthorization() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;
    let secrets = memory_secrets();
    secrets
        .set_base_url(&support::base_url(&server))
        .expect("valid URL");
    secrets.save_user_credentials(&user_credentials());
    let session = AuthSession::new(secrets.clone(), config());
    assert!(session.manager().is_none(), "no client key yet");

    let bridge = StubBridge::succeeding("verifier123");
    let response = session.connect(&bridge).await.expect("connect");

    assert!(response.is_success());
    assert_eq!(secrets.client_credentials(), Some(support::client_credentials()));
    assert!(session.snapshot().has_access_token);
    assert_eq!(
        session.manager().map(|m| m.phase()),
        Some(SessionPhase::AccessTokenObtained)
    );
    let authorized = bridge.authorized_urls.lock().unwrap();
    assert_eq!(authorized.len(), 1);
    assert!(authorized[0].ends_with("oauth_token=abc"));
}

#[tokio::test]
async fn rejected_login_clears_user_credentials() {
    let server = MockServer::start().await;
    let secrets = configured_secrets(&server);
    secrets.save_user_credentials(&user_credentials());
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
    let session = AuthSession::new(secrets.clone(), config());

    let bridge = StubBridge::failing(ConnectError::Credential(CredentialFailure::LoginRejected));
    let err = session.connect(&bridge).await.expect_err("rejected");

    assert!(matches!(err, ConnectError::Credential(CredentialFailure::LoginRejected)));
    assert!(!session.snapshot().has_user_credentials);
    assert!(secrets.user_credentials().is_none());
}

#[tokio::test]
async fn provisioning_failure_keeps_user_credentials() {
    let server = MockServer::start().await;
    let secrets = configured_secrets(&server);
    secrets.save_user_credentials(&user_credentials());
    let session = AuthSession::new(secrets.clone(), config());

    let bridge = StubBridge::failing(ConnectError::Provisioning("no key after 3 attempts".into()));
    let err = session.connect(&bridge).await.expect_err("provisioning");

    assert!(matches!(err, ConnectError::Provisioning(_)));
    assert!(session.snapshot().has_user_credentials);
    assert!(!session.snapshot().loading);
}

#[tokio::test]
async fn connect_without_user_credentials_is_invalid_state() {
    let server = MockServer::start().await;
    let session = AuthSession::new(configured_secrets(&server), config());
    let bridge = StubBridge::succeeding("verifier123");
    assert!(matches!(
        session.connect(&bridge).await,
        Err(ConnectError::InvalidState(_))
    ));
}

#[tokio::test]
async fn base_url_change_drops_session_and_client_key() {
    let server = MockServer::start().await;
    let secrets = configured_secrets(&server);
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
    secrets.save_user_credentials(&user_credentials());
    let session = AuthSession::new(secrets.clone(), config());
    assert!(session.manager().is_some());

    session
        .update_base_url("https://other.example.com/oscar/")
        .expect("valid URL");

    assert!(session.manager().is_none());
    assert!(secrets.client_credentials().is_none());
    assert!(!secrets.has_access_token());
    assert_eq!(secrets.base_url().as_deref(), Some("https://other.example.com/oscar"));
    let snapshot = session.snapshot();
    assert!(!snapshot.has_access_token);
    assert!(snapshot.has_user_credentials);

    session.install_client_credentials(&ClientCredentials {
        key: "ck-2".into(),
        secret: "cs-2".into(),
    });
    assert!(session.manager().is_some());
}

#[tokio::test]
async fn lock_gate_is_independent_of_tokens() {
    let server = MockServer::start().await;
    let secrets = configured_secrets(&server);
    secrets.save_access_token(&TokenPair::new("AT1", "ATS1"));
    let session = AuthSession::new(secrets, config());

    session.set_authenticated(true);
    assert!(session.snapshot().is_authenticated);
    session.lock();
    let snapshot = session.snapshot();
    assert!(!snapshot.is_authenticated);
    assert!(snapshot.has_access_token);
}

#[tokio::test]
async fn terms_acceptance_persists() {
    let secrets = memory_secrets();
    let session = AuthSession::new(secrets.clone(), config());
    assert!(!session.has_accepted_terms());
    session.accept_terms();
    assert!(AuthSession::new(secrets, config()).has_accepted_terms());
}
