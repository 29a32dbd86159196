//! OAuth 1.0a session manager: the three-legged handshake plus signed API calls.

use std::sync::{Mutex, MutexGuard};

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use super::response::ApiResponse;
use super::signer::RequestSigner;
use super::token::{parse_token_response, TokenPair};
use crate::config::ConnectConfig;
use crate::endpoints::Endpoints;
use crate::error::ConnectError;
use crate::store::{ClientCredentials, Secrets};

const UNKNOWN_SERVER_ERROR: &str = "Unknown server error";

/// Coarse handshake position, as visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionPhase {
    Uninitialized,
    RequestTokenObtained,
    Authorizing,
    AccessTokenObtained,
    Failed,
}

#[derive(Debug, Clone)]
enum SessionState {
    Uninitialized,
    RequestTokenObtained(TokenPair),
    Authorizing(TokenPair),
    AccessTokenObtained,
    Failed {
        /// Kept after a failed verifier exchange so the exchange can be retried.
        request_token: Option<TokenPair>,
        reason: String,
    },
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            Self::Uninitialized => SessionPhase::Uninitialized,
            Self::RequestTokenObtained(_) => SessionPhase::RequestTokenObtained,
            Self::Authorizing(_) => SessionPhase::Authorizing,
            Self::AccessTokenObtained => SessionPhase::AccessTokenObtained,
            Self::Failed { .. } => SessionPhase::Failed,
        }
    }

    fn request_token(&self) -> Option<&TokenPair> {
        match self {
            Self::RequestTokenObtained(pair) | Self::Authorizing(pair) => Some(pair),
            Self::Failed {
                request_token: Some(pair),
                ..
            } => Some(pair),
            _ => None,
        }
    }
}

/// Result of an authorized call plus the access token it was signed with.
#[derive(Debug, Clone)]
pub struct SignedResponse {
    pub response: ApiResponse,
    /// `None` when no access token was stored and nothing was sent.
    pub signed_with: Option<TokenPair>,
}

#[derive(Debug)]
struct Session {
    /// Bumped on every new handshake or reset; responses for an older epoch are dropped.
    epoch: u64,
    state: SessionState,
}

/// Owns one OAuth session against one EMR for one set of client credentials.
///
/// Network failures are reported as [`ApiResponse`] errors. The only `Err`
/// returned is [`ConnectError::InvalidState`] for calls made out of order.
pub struct OAuthManager {
    client: reqwest::Client,
    signer: RequestSigner,
    endpoints: Endpoints,
    callback_url: String,
    secrets: Secrets,
    session: Mutex<Session>,
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("base_url", &self.endpoints.base_url())
            .field("consumer_key", &self.signer.consumer_key())
            .field("phase", &self.phase())
            .finish()
    }
}

impl OAuthManager {
    /// Build a manager from the stored client credentials and base URL.
    pub fn new(secrets: Secrets, config: &ConnectConfig) -> Result<Self, ConnectError> {
        let credentials = secrets.client_credentials().ok_or_else(|| {
            ConnectError::Configuration("client key and secret are not configured".into())
        })?;
        let base_url = secrets
            .base_url()
            .ok_or_else(|| ConnectError::Configuration("EMR base URL is not configured".into()))?;
        Ok(Self::with_client(
            config.http_client()?,
            credentials,
            Endpoints::new(&base_url)?,
            config.callback_url.clone(),
            secrets,
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        credentials: ClientCredentials,
        endpoints: Endpoints,
        callback_url: impl Into<String>,
        secrets: Secrets,
    ) -> Self {
        Self {
            client,
            signer: RequestSigner::new(credentials),
            endpoints,
            callback_url: callback_url.into(),
            secrets,
            session: Mutex::new(Session {
                epoch: 0,
                state: SessionState::Uninitialized,
            }),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock_session().state.phase()
    }

    pub fn has_request_token(&self) -> bool {
        self.lock_session().state.request_token().is_some()
    }

    /// Why the last handshake step failed, while the session is in `Failed`.
    pub fn last_failure(&self) -> Option<String> {
        match &self.lock_session().state {
            SessionState::Failed { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    /// Forget the in-memory handshake. Responses still in flight are discarded.
    pub fn reset(&self) {
        let mut session = self.lock_session();
        session.epoch += 1;
        session.state = SessionState::Uninitialized;
    }

    /// Step 1: obtain a request token bound to the callback URL.
    pub async fn get_request_token(&self) -> ApiResponse {
        match self.obtain_request_token().await {
            Ok(()) => ApiResponse::success("Token Received"),
            Err(err) => ApiResponse::from_error(&err),
        }
    }

    /// Typed form of [`get_request_token`](Self::get_request_token).
    ///
    /// A response that arrives after [`reset`](Self::reset) or a newer
    /// handshake is dropped and reported as [`ConnectError::Abandoned`].
    pub async fn obtain_request_token(&self) -> Result<(), ConnectError> {
        let epoch = {
            let mut session = self.lock_session();
            session.epoch += 1;
            session.state = SessionState::Uninitialized;
            session.epoch
        };
        tracing::debug!(epoch, "requesting OAuth request token");

        let form = [("oauth_callback", self.callback_url.as_str())];
        let result = self
            .post_signed_form(&self.endpoints.request_token(), &form, None)
            .await
            .and_then(|body| parse_token_response(&body));

        let mut session = self.lock_session();
        if session.epoch != epoch {
            tracing::debug!(epoch, "discarding request token response for abandoned handshake");
            return Err(ConnectError::Abandoned("request was superseded".into()));
        }
        match result {
            Ok(pair) => {
                session.state = SessionState::RequestTokenObtained(pair);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to obtain request token");
                session.state = SessionState::Failed {
                    request_token: None,
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Step 2: URL the user must visit to approve the request token.
    pub fn authorization_url(&self) -> Result<String, ConnectError> {
        let mut session = self.lock_session();
        let pair = session.state.request_token().cloned().ok_or_else(|| {
            ConnectError::InvalidState("no request token; call get_request_token first".into())
        })?;
        let url = self.endpoints.authorize(&pair.token);
        session.state = SessionState::Authorizing(pair);
        Ok(url)
    }

    /// Step 3: exchange the verifier for an access token and persist it.
    pub async fn get_access_token(&self, verifier: &str) -> Result<ApiResponse, ConnectError> {
        let (epoch, request_token) = {
            let session = self.lock_session();
            let pair = session.state.request_token().cloned().ok_or_else(|| {
                ConnectError::InvalidState("no request token; call get_request_token first".into())
            })?;
            (session.epoch, pair)
        };
        tracing::debug!(epoch, "exchanging verifier for access token");

        let form = [
            ("oauth_token", request_token.token.as_str()),
            ("oauth_verifier", verifier),
        ];
        let result = self
            .post_signed_form(&self.endpoints.access_token(), &form, Some(&request_token))
            .await
            .and_then(|body| parse_token_response(&body));

        let mut session = self.lock_session();
        if session.epoch != epoch {
            tracing::debug!(epoch, "discarding access token response for abandoned handshake");
            return Ok(ApiResponse::error("Request was superseded"));
        }
        match result {
            Ok(access) => {
                self.secrets.save_access_token(&access);
                session.state = SessionState::AccessTokenObtained;
                Ok(ApiResponse::success("Access Token Received"))
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to exchange verifier");
                session.state = SessionState::Failed {
                    request_token: Some(request_token),
                    reason: err.to_string(),
                };
                Ok(ApiResponse::from_error(&err))
            }
        }
    }

    /// Signed call to `{base}/ws/services/{endpoint}` using the stored access token.
    ///
    /// A 401 is reported with `code: 401` and never retried here.
    pub async fn make_authorized_request(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
    ) -> ApiResponse {
        self.send_signed(method, endpoint, data).await.response
    }

    /// Same as [`make_authorized_request`](Self::make_authorized_request), also
    /// reporting which access token signed the call.
    pub async fn send_signed(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
    ) -> SignedResponse {
        let Some(access) = self.secrets.access_token() else {
            tracing::debug!(endpoint, "no access token stored");
            return SignedResponse {
                response: ApiResponse::unauthorized("No access token available"),
                signed_with: None,
            };
        };
        let response = match self.send_authorized(method, endpoint, data, &access).await {
            Ok(value) => ApiResponse::success_with_data("Request Succeeded", value),
            Err(err) => {
                tracing::warn!(endpoint, error = %err, "authorized request failed");
                ApiResponse::from_error(&err)
            }
        };
        SignedResponse {
            response,
            signed_with: Some(access),
        }
    }

    async fn send_authorized(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
        access: &TokenPair,
    ) -> Result<Value, ConnectError> {
        let url = self.endpoints.service(endpoint);
        let header = self.signer.sign(method.as_str(), &url, &[], Some(access))?;
        let mut request = self
            .client
            .request(method, &url)
            .header(AUTHORIZATION, header.to_header_value())
            .header(ACCEPT, "application/json");
        if let Some(body) = data {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(server_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_signed_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        token: Option<&TokenPair>,
    ) -> Result<String, ConnectError> {
        let header = self.signer.sign("POST", url, form, token)?;
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, header.to_header_value())
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(server_error(status, &body));
        }
        Ok(body)
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Non-2xx response; the message comes from a JSON `message` field when present.
fn server_error(status: StatusCode, body: &str) -> ConnectError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| UNKNOWN_SERVER_ERROR.to_string());
    ConnectError::server(status.as_u16(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySecretStore;
    use std::sync::Arc;

    fn manager() -> (OAuthManager, Secrets) {
        let secrets = Secrets::new(Arc::new(MemorySecretStore::new()));
        let manager = OAuthManager::with_client(
            reqwest::Client::new(),
            ClientCredentials {
                key: "ck".into(),
                secret: "cs".into(),
            },
            Endpoints::new("http://127.0.0.1:9").unwrap(),
            "openo://callback",
            secrets.clone(),
        );
        (manager, secrets)
    }

    #[tokio::test]
    async fn handshake_steps_require_a_request_token() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.authorization_url(),
            Err(ConnectError::InvalidState(_))
        ));
        assert!(matches!(
            manager.get_access_token("v").await,
            Err(ConnectError::InvalidState(_))
        ));
        assert_eq!(manager.phase(), SessionPhase::Uninitialized);
    }

    #[tokio::test]
    async fn missing_access_token_reports_unauthorized() {
        let (manager, _) = manager();
        let response = manager
            .make_authorized_request(Method::GET, "schedule/statuses", None)
            .await;
        assert!(!response.is_success());
        assert_eq!(response.code, Some(401));
    }

    #[test]
    fn new_requires_stored_client_credentials() {
        let secrets = Secrets::new(Arc::new(MemorySecretStore::new()));
        secrets.set_base_url("https://emr.example.com").unwrap();
        let result = OAuthManager::new(secrets, &ConnectConfig::default());
        assert!(matches!(result, Err(ConnectError::Configuration(_))));
    }

    #[test]
    fn server_error_prefers_json_message() {
        let err = server_error(StatusCode::BAD_REQUEST, r#"{"message":"bad verifier"}"#);
        assert_eq!(err.to_string(), "Server error (status 400): bad verifier");
        let err = server_error(StatusCode::BAD_GATEWAY, "<html/>");
        assert!(matches!(err, ConnectError::Server { status: 502, ref message } if message == UNKNOWN_SERVER_ERROR));
    }
}
