//! Fail-soft typed access to the secret store.

use std::fmt;
use std::sync::Arc;

use super::{SecretKey, SecretStore};
use crate::error::ConnectError;
use crate::oauth::TokenPair;

/// Client key/secret pair that identifies this install to the OAuth provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub key: String,
    pub secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("key", &self.key)
            .field("secret", &"..")
            .finish()
    }
}

/// EMR login credentials used to drive the login bridge.
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
    pub pin: String,
}

impl UserCredentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        pin: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"..")
            .field("pin", &"..")
            .finish()
    }
}

/// Fail-soft view over a [`SecretStore`].
///
/// Reads that fail are logged and reported as absent; writes and deletes
/// that fail are logged and swallowed. Empty values count as absent. There
/// is no transaction across keys, so every `has_*` check reads the store
/// again instead of trusting an earlier write.
#[derive(Clone)]
pub struct Secrets {
    store: Arc<dyn SecretStore>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, key: SecretKey) -> Option<String> {
        match self.store.load(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(err) => {
                tracing::error!(key = %key, error = %err, "failed to retrieve secret");
                None
            }
        }
    }

    pub fn save(&self, key: SecretKey, value: &str) {
        if let Err(err) = self.store.save(key, value) {
            tracing::error!(key = %key, error = %err, "failed to save secret");
        }
    }

    pub fn delete(&self, key: SecretKey) {
        if let Err(err) = self.store.clear(key) {
            tracing::error!(key = %key, error = %err, "failed to delete secret");
        }
    }

    pub fn client_credentials(&self) -> Option<ClientCredentials> {
        Some(ClientCredentials {
            key: self.get(SecretKey::ClientKey)?,
            secret: self.get(SecretKey::ClientSecret)?,
        })
    }

    pub fn save_client_credentials(&self, credentials: &ClientCredentials) {
        self.save(SecretKey::ClientKey, &credentials.key);
        self.save(SecretKey::ClientSecret, &credentials.secret);
    }

    pub fn clear_client_credentials(&self) {
        self.delete(SecretKey::ClientKey);
        self.delete(SecretKey::ClientSecret);
    }

    pub fn user_credentials(&self) -> Option<UserCredentials> {
        Some(UserCredentials {
            username: self.get(SecretKey::Username)?,
            password: self.get(SecretKey::Password)?,
            pin: self.get(SecretKey::Pin)?,
        })
    }

    pub fn save_user_credentials(&self, credentials: &UserCredentials) {
        self.save(SecretKey::Username, &credentials.username);
        self.save(SecretKey::Password, &credentials.password);
        self.save(SecretKey::Pin, &credentials.pin);
    }

    pub fn clear_user_credentials(&self) {
        self.delete(SecretKey::Username);
        self.delete(SecretKey::Password);
        self.delete(SecretKey::Pin);
    }

    pub fn has_user_credentials(&self) -> bool {
        self.user_credentials().is_some()
    }

    pub fn access_token(&self) -> Option<TokenPair> {
        Some(TokenPair {
            token: self.get(SecretKey::AccessToken)?,
            secret: self.get(SecretKey::AccessTokenSecret)?,
        })
    }

    pub fn save_access_token(&self, pair: &TokenPair) {
        self.save(SecretKey::AccessToken, &pair.token);
        self.save(SecretKey::AccessTokenSecret, &pair.secret);
    }

    pub fn clear_access_token(&self) {
        self.delete(SecretKey::AccessToken);
        self.delete(SecretKey::AccessTokenSecret);
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn base_url(&self) -> Option<String> {
        self.get(SecretKey::BaseUrl)
    }

    /// Normalize and persist the EMR base URL, returning the stored form.
    pub fn set_base_url(&self, raw: &str) -> Result<String, ConnectError> {
        let normalized = normalize_base_url(raw)?;
        self.save(SecretKey::BaseUrl, &normalized);
        Ok(normalized)
    }

    pub fn has_accepted_terms(&self) -> bool {
        self.get(SecretKey::HasAcceptedTerms).as_deref() == Some("true")
    }

    pub fn accept_terms(&self) {
        self.save(SecretKey::HasAcceptedTerms, "true");
    }
}

/// Trim surrounding whitespace and slashes and check the result is an
/// absolute http(s) URL.
pub fn normalize_base_url(raw: &str) -> Result<String, ConnectError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ConnectError::InvalidArgument("base URL is empty".into()));
    }
    let parsed = url::Url::parse(trimmed)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConnectError::InvalidArgument(format!(
            "base URL must use http or https, got {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ConnectError::InvalidArgument("base URL has no host".into()));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ConnectError::InvalidArgument(
            "base URL must not carry a query or fragment".into(),
        ));
    }
    Ok(trimmed.to_string())
}
