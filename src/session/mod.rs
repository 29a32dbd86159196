//! Observable authentication state shared with UI consumers.
//!
//! [`AuthSession`] is constructed explicitly and passed to whoever needs it.
//! Changes are published through a [`tokio::sync::watch`] channel, and every
//! published snapshot is re-derived from the secret store rather than cached.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::bootstrap::LoginBridge;
use crate::config::ConnectConfig;
use crate::error::ConnectError;
use crate::oauth::{verifier_from_redirect, ApiResponse, OAuthManager, TokenPair};
use crate::store::{ClientCredentials, Secrets, UserCredentials};

/// Endpoint that describes the provider the access token belongs to.
pub const PROVIDER_IDENTITY_ENDPOINT: &str = "providerService/provider/me";

/// Point-in-time view of the authentication state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthSnapshot {
    pub has_user_credentials: bool,
    pub has_access_token: bool,
    pub loading: bool,
    /// Device-lock gate; unrelated to OAuth.
    pub is_authenticated: bool,
    /// Provider record fetched after the last successful authorization.
    pub provider: Option<Value>,
}

#[derive(Debug, Default)]
struct LocalFlags {
    /// Round-trips currently in flight; `loading` is derived from it.
    in_flight: usize,
    is_authenticated: bool,
    provider: Option<Value>,
}

pub struct AuthSession {
    config: ConnectConfig,
    secrets: Secrets,
    manager: RwLock<Option<Arc<OAuthManager>>>,
    flags: Mutex<LocalFlags>,
    state: watch::Sender<AuthSnapshot>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Build the façade and, if credentials and base URL are stored, a manager.
    pub fn new(secrets: Secrets, config: ConnectConfig) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        let session = Self {
            config,
            secrets,
            manager: RwLock::new(None),
            flags: Mutex::new(LocalFlags::default()),
            state,
        };
        session.rebuild_manager();
        session.refresh();
        session
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Re-read the store and publish a fresh snapshot.
    pub fn refresh(&self) -> AuthSnapshot {
        let snapshot = {
            let flags = self.lock_flags();
            AuthSnapshot {
                has_user_credentials: self.secrets.has_user_credentials(),
                has_access_token: self.secrets.has_access_token(),
                loading: flags.in_flight > 0,
                is_authenticated: flags.is_authenticated,
                provider: flags.provider.clone(),
            }
        };
        self.state.send_replace(snapshot.clone());
        snapshot
    }

    pub fn manager(&self) -> Option<Arc<OAuthManager>> {
        self.manager
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn require_manager(&self) -> Result<Arc<OAuthManager>, ConnectError> {
        self.manager().ok_or_else(|| {
            ConnectError::Configuration("client credentials and base URL must be configured".into())
        })
    }

    fn rebuild_manager(&self) {
        let manager = match OAuthManager::new(self.secrets.clone(), &self.config) {
            Ok(manager) => Some(Arc::new(manager)),
            Err(err) => {
                tracing::debug!(error = %err, "OAuth manager unavailable");
                None
            }
        };
        *self
            .manager
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = manager;
    }

    fn drop_manager(&self) {
        *self
            .manager
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    fn lock_flags(&self) -> MutexGuard<'_, LocalFlags> {
        self.flags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.lock_flags().in_flight += 1;
        self.refresh();
        LoadingGuard { session: self }
    }

    /// React to a manager result: a 401 discards the stored access token.
    pub fn observe(&self, response: &ApiResponse) {
        if response.is_unauthorized() {
            self.demote_access_token();
        }
    }

    /// Like [`observe`](Self::observe), but a 401 only clears the store while
    /// it still holds `signed_with`. A token saved after the request went out
    /// survives its late rejection.
    pub fn observe_signed(&self, response: &ApiResponse, signed_with: &TokenPair) {
        if !response.is_unauthorized() {
            return;
        }
        if self.secrets.access_token().as_ref() != Some(signed_with) {
            tracing::debug!("ignoring 401 for an access token that was since replaced");
            self.refresh();
            return;
        }
        self.demote_access_token();
    }

    fn demote_access_token(&self) {
        tracing::info!("access token rejected, re-authorization required");
        self.secrets.clear_access_token();
        self.lock_flags().provider = None;
        self.refresh();
    }

    /// Signed API call that keeps `loading` and `has_access_token` current.
    pub async fn authorized_request(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
    ) -> ApiResponse {
        let manager = match self.require_manager() {
            Ok(manager) => manager,
            Err(err) => return ApiResponse::from_error(&err),
        };
        let loading = self.begin_loading();
        let signed = manager.send_signed(method, endpoint, data).await;
        drop(loading);
        if let Some(token) = &signed.signed_with {
            self.observe_signed(&signed.response, token);
        }
        signed.response
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.lock_flags().is_authenticated = authenticated;
        self.refresh();
    }

    pub fn lock(&self) {
        self.set_authenticated(false);
    }

    pub fn save_user_credentials(&self, credentials: &UserCredentials) {
        self.secrets.save_user_credentials(credentials);
        self.refresh();
    }

    pub fn clear_user_credentials(&self) {
        self.secrets.clear_user_credentials();
        self.refresh();
    }

    /// Point the client at a different EMR.
    ///
    /// The access token and client key pair belong to the old server, so they
    /// are deleted before the new URL is written.
    pub fn update_base_url(&self, raw: &str) -> Result<String, ConnectError> {
        let normalized = crate::store::normalize_base_url(raw)?;
        self.drop_manager();
        self.secrets.clear_access_token();
        self.secrets.clear_client_credentials();
        let stored = self.secrets.set_base_url(&normalized)?;
        self.lock_flags().provider = None;
        self.refresh();
        Ok(stored)
    }

    /// Persist a provisioned client key pair and start a fresh OAuth session for it.
    pub fn install_client_credentials(&self, credentials: &ClientCredentials) {
        self.secrets.save_client_credentials(credentials);
        self.rebuild_manager();
        self.refresh();
    }

    pub fn has_accepted_terms(&self) -> bool {
        self.secrets.has_accepted_terms()
    }

    pub fn accept_terms(&self) {
        self.secrets.accept_terms();
    }

    /// Obtain a request token and return the URL the user must approve.
    pub async fn begin_authorization(&self) -> Result<String, ConnectError> {
        let manager = self.require_manager()?;
        let _loading = self.begin_loading();
        manager.obtain_request_token().await?;
        manager.authorization_url()
    }

    /// Exchange the verifier carried by `redirect_url`, then load the provider identity.
    pub async fn complete_authorization(
        &self,
        redirect_url: &str,
    ) -> Result<ApiResponse, ConnectError> {
        let manager = self.require_manager()?;
        let verifier = verifier_from_redirect(redirect_url, &self.config.callback_url)?;
        let _loading = self.begin_loading();
        self.exchange_and_identify(&manager, &verifier).await
    }

    async fn exchange_and_identify(
        &self,
        manager: &OAuthManager,
        verifier: &str,
    ) -> Result<ApiResponse, ConnectError> {
        let response = manager.get_access_token(verifier).await?;
        if !response.is_success() {
            return Ok(response);
        }
        let identity = manager
            .send_signed(Method::GET, PROVIDER_IDENTITY_ENDPOINT, None)
            .await;
        if identity.response.is_success() {
            self.lock_flags().provider = identity.response.data;
        } else {
            tracing::warn!(message = %identity.response.message, "failed to load provider identity");
            if let Some(token) = &identity.signed_with {
                self.observe_signed(&identity.response, token);
            }
        }
        self.refresh();
        Ok(response)
    }

    /// Full silent re-authorization with the stored user credentials.
    ///
    /// Rejected or locked logins wipe the stored user credentials. Any other
    /// bridge failure leaves them in place.
    pub async fn connect(&self, bridge: &dyn LoginBridge) -> Result<ApiResponse, ConnectError> {
        let credentials = self
            .secrets
            .user_credentials()
            .ok_or_else(|| ConnectError::InvalidState("no stored user credentials".into()))?;
        let _loading = self.begin_loading();
        self.run_connect(bridge, &credentials).await
    }

    async fn run_connect(
        &self,
        bridge: &dyn LoginBridge,
        credentials: &UserCredentials,
    ) -> Result<ApiResponse, ConnectError> {
        let pair = match bridge.login(credentials).await {
            Ok(pair) => pair,
            Err(ConnectError::Credential(failure)) => {
                tracing::warn!(%failure, "stored credentials rejected, clearing them");
                self.secrets.clear_user_credentials();
                self.refresh();
                return Err(ConnectError::Credential(failure));
            }
            Err(err) => return Err(err),
        };
        if self.secrets.client_credentials().as_ref() != Some(&pair.credentials)
            || self.manager().is_none()
        {
            tracing::debug!(provider_no = %pair.provider_no, "installing provisioned client key");
            self.install_client_credentials(&pair.credentials);
        }

        let manager = self.require_manager()?;
        manager.obtain_request_token().await?;
        let authorization_url = manager.authorization_url()?;
        let redirect = bridge.authorize(&authorization_url).await?;
        let verifier = verifier_from_redirect(&redirect, &self.config.callback_url)?;
        self.exchange_and_identify(&manager, &verifier).await
    }
}

/// Marks one round-trip as in flight until dropped, including on early returns.
struct LoadingGuard<'a> {
    session: &'a AuthSession,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        {
            let mut flags = self.session.lock_flags();
            flags.in_flight = flags.in_flight.saturating_sub(1);
        }
        self.session.refresh();
    }
}
