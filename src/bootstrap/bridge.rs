use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::browser::{BrowserEvent, BrowserSession};
use super::flow::{FlowAction, LoginFlow};
use super::scripts::{BridgeScript, FetchReply};
use super::{LoginBridge, ProviderKeyPair};
use crate::config::ConnectConfig;
use crate::endpoints::Endpoints;
use crate::error::{ConnectError, CredentialFailure};
use crate::oauth::is_callback;
use crate::store::{ClientCredentials, UserCredentials};
use crate::util::timeout::with_timeout;

const AUTHORIZE_MARKER: &str = "oauth/authorize";

static PROVIDER_NO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<providerNo>\s*([^<\s]+)\s*</providerNo>").expect("providerNo regex must compile")
});

#[derive(Debug, Deserialize)]
struct ClientKeyEntry {
    name: String,
    key: String,
    secret: String,
}

/// [`LoginBridge`] that drives a hidden [`BrowserSession`] through the EMR
/// login page and its client-key admin API.
pub struct EmbeddedLoginBridge<B> {
    browser: Mutex<B>,
    client: reqwest::Client,
    endpoints: Endpoints,
    callback_url: String,
    event_timeout: Duration,
    key_lifetime_secs: u64,
    max_provisioning_attempts: u32,
    request_ids: AtomicU64,
}

impl<B: BrowserSession> EmbeddedLoginBridge<B> {
    pub fn new(
        browser: B,
        endpoints: Endpoints,
        config: &ConnectConfig,
    ) -> Result<Self, ConnectError> {
        Ok(Self {
            browser: Mutex::new(browser),
            client: config.http_client()?,
            endpoints,
            callback_url: config.callback_url.clone(),
            event_timeout: config.bridge_event_timeout(),
            key_lifetime_secs: config.key_lifetime_secs,
            max_provisioning_attempts: config.max_provisioning_attempts.max(1),
            request_ids: AtomicU64::new(0),
        })
    }

    /// Ask the legacy SOAP login service which provider number the user maps to.
    pub async fn lookup_provider_no(
        &self,
        credentials: &UserCredentials,
    ) -> Result<String, ConnectError> {
        let envelope = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <login2 xmlns="http://ws.oscarehr.org/">
      <arg0 xmlns="">{}</arg0>
      <arg1 xmlns="">{}</arg1>
    </login2>
  </soap:Body>
</soap:Envelope>"#,
            xml_escape(&credentials.username),
            xml_escape(&credentials.password),
        );
        let response = self
            .client
            .post(self.endpoints.login_service())
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(envelope)
            .send()
            .await
            .map_err(|e| ConnectError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConnectError::Network(e.to_string()))?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "SOAP login rejected");
            return Err(ConnectError::Credential(CredentialFailure::LoginRejected));
        }
        PROVIDER_NO
            .captures(&body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(ConnectError::Credential(CredentialFailure::LoginRejected))
    }

    async fn next_event(&self, browser: &mut B) -> Result<BrowserEvent, ConnectError> {
        browser
            .next_event()
            .await
            .ok_or_else(|| ConnectError::Abandoned("browser session closed".into()))
    }

    async fn sign_in(&self, browser: &mut B, credentials: &UserCredentials) -> Result<(), ConnectError> {
        browser.load(&self.endpoints.login_page()).await?;
        let mut flow = LoginFlow::new();
        loop {
            let BrowserEvent::Navigation { url, loading } = self.next_event(browser).await? else {
                continue;
            };
            match flow.on_navigation(&url, loading) {
                FlowAction::Ignore => {}
                FlowAction::InjectLoginForm => {
                    tracing::debug!("submitting login form");
                    browser
                        .run_script(&BridgeScript::FillLoginForm {
                            username: credentials.username.clone(),
                            password: credentials.password.clone(),
                            pin: credentials.pin.clone(),
                        })
                        .await?;
                }
                FlowAction::LoggedIn => return Ok(()),
                FlowAction::Failed(failure) => {
                    tracing::warn!(%failure, "EMR login failed");
                    return Err(ConnectError::Credential(failure));
                }
            }
        }
    }

    /// Run a fetch inside the page and wait for its tagged reply.
    ///
    /// Failures reported by the page are `Provisioning` errors; a closed
    /// browser surfaces as `Abandoned`.
    async fn fetch_in_page(&self, browser: &mut B, url: String) -> Result<String, ConnectError> {
        let id = format!("fetch-{}", self.request_ids.fetch_add(1, Ordering::Relaxed));
        browser
            .run_script(&BridgeScript::FetchJson {
                id: id.clone(),
                url,
            })
            .await?;
        loop {
            let BrowserEvent::Message(message) = self.next_event(browser).await? else {
                continue;
            };
            let Some(reply) = FetchReply::parse(&message).filter(|r| r.id == id) else {
                continue;
            };
            if !reply.ok {
                let detail = reply
                    .error
                    .or(reply.status.map(|s| format!("status {s}")))
                    .unwrap_or_else(|| "unknown failure".into());
                return Err(ConnectError::Provisioning(detail));
            }
            return Ok(reply.body.unwrap_or_default());
        }
    }

    async fn list_keys(&self, browser: &mut B) -> Result<Vec<ClientKeyEntry>, ConnectError> {
        let body = self
            .fetch_in_page(browser, self.endpoints.list_client_keys())
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| ConnectError::Provisioning(format!("unreadable key list: {e}")))
    }

    /// Find the key named after `provider_no`, creating it at most once.
    async fn provision(&self, browser: &mut B, provider_no: &str) -> Result<ClientCredentials, ConnectError> {
        let mut created = false;
        for attempt in 1..=self.max_provisioning_attempts {
            let entries = match self.list_keys(browser).await {
                Ok(entries) => entries,
                Err(ConnectError::Provisioning(reason)) => {
                    tracing::warn!(attempt, %reason, "failed to list client keys");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Some(entry) = entries.into_iter().find(|e| e.name == provider_no) {
                tracing::debug!(attempt, "found client key");
                return Ok(ClientCredentials {
                    key: entry.key,
                    secret: entry.secret,
                });
            }
            if created {
                continue;
            }
            tracing::debug!("client key not found, creating one");
            let url = self.endpoints.create_client_key(
                provider_no,
                &self.callback_url,
                self.key_lifetime_secs,
            );
            self.fetch_in_page(browser, url).await.map_err(|err| match err {
                ConnectError::Provisioning(reason) => {
                    ConnectError::Provisioning(format!("failed to create key: {reason}"))
                }
                other => other,
            })?;
            created = true;
        }
        Err(ConnectError::Provisioning(format!(
            "no client key after {} list attempts",
            self.max_provisioning_attempts
        )))
    }

    /// Open the consent page and press approve until the callback shows up.
    async fn approve(&self, browser: &mut B, authorization_url: &str) -> Result<String, ConnectError> {
        browser.load(authorization_url).await?;
        let mut clicked = false;
        loop {
            let BrowserEvent::Navigation { url, loading } = self.next_event(browser).await? else {
                continue;
            };
            if is_callback(&url, &self.callback_url) {
                return Ok(url);
            }
            if loading {
                clicked = false;
            } else if url.contains(AUTHORIZE_MARKER) && !clicked {
                tracing::debug!("approving OAuth request");
                browser.run_script(&BridgeScript::AuthorizeOAuth).await?;
                clicked = true;
            }
        }
    }
}

#[async_trait]
impl<B: BrowserSession> LoginBridge for EmbeddedLoginBridge<B> {
    async fn login(&self, credentials: &UserCredentials) -> Result<ProviderKeyPair, ConnectError> {
        let provider_no = self.lookup_provider_no(credentials).await?;
        let mut browser = self.browser.lock().await;
        // One deadline for the whole browser phase; unrelated page chatter does not extend it.
        let credentials = with_timeout(self.event_timeout, async {
            self.sign_in(&mut browser, credentials).await?;
            self.provision(&mut browser, &provider_no).await
        })
        .await?;
        Ok(ProviderKeyPair {
            provider_no,
            credentials,
        })
    }

    async fn authorize(&self, authorization_url: &str) -> Result<String, ConnectError> {
        let mut browser = self.browser.lock().await;
        with_timeout(
            self.event_timeout,
            self.approve(&mut browser, authorization_url),
        )
        .await
    }
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
