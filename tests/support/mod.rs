#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use openo_connect::bootstrap::{BridgeScript, BrowserEvent, BrowserSession, LoginBridge, ProviderKeyPair};
use openo_connect::config::ConnectConfig;
use openo_connect::error::ConnectError;
use openo_connect::store::{ClientCredentials, MemorySecretStore, Secrets, UserCredentials};
use serde_json::json;
use wiremock::MockServer;

pub const CALLBACK: &str = "openo-test://callback";
pub const PROVIDER_NO: &str = "999998";

pub fn config() -> ConnectConfig {
    ConnectConfig::builder()
        .callback_url(CALLBACK)
        .data_dir(std::env::temp_dir().join("openo-connect-tests"))
        .http_timeout_secs(5)
        .bridge_event_timeout_secs(5)
        .build()
}

pub fn base_url(server: &MockServer) -> String {
    format!("{}/oscar", server.uri())
}

pub fn memory_secrets() -> Secrets {
    Secrets::new(Arc::new(MemorySecretStore::new()))
}

pub fn client_credentials() -> ClientCredentials {
    ClientCredentials {
        key: "ck-1".to_string(),
        secret: "cs-1".to_string(),
    }
}

pub fn user_credentials() -> UserCredentials {
    UserCredentials::new("doctor", "s3cret", "1234")
}

/// Secrets seeded with a base URL pointing at `server` and a client key pair.
pub fn configured_secrets(server: &MockServer) -> Secrets {
    let secrets = memory_secrets();
    secrets
        .set_base_url(&base_url(server))
        .expect("mock server URL is valid");
    secrets.save_client_credentials(&client_credentials());
    secrets
}

pub fn soap_login_response(provider_no: &str) -> String {
    format!(
        "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>\
         <ns2:login2Response xmlns:ns2=\"http://ws.oscarehr.org/\"><return><provider>\
         <firstName>Doc</firstName><providerNo>{provider_no}</providerNo></provider>\
         </return></ns2:login2Response></soap:Body></soap:Envelope>"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Rejected,
    Locked,
}

/// Everything the fake page was asked to do.
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub loads: Vec<String>,
    pub scripts: Vec<BridgeScript>,
}

impl BrowserLog {
    pub fn count_fetches(&self, needle: &str) -> usize {
        self.scripts
            .iter()
            .filter(|s| matches!(s, BridgeScript::FetchJson { url, .. } if url.contains(needle)))
            .count()
    }

    pub fn count(&self, wanted: fn(&BridgeScript) -> bool) -> usize {
        self.scripts.iter().filter(|s| wanted(s)).count()
    }
}

/// Browser that imitates the EMR pages the login bridge drives.
pub struct FakeEmrBrowser {
    base_url: String,
    pub outcome: LoginOutcome,
    /// Key already registered under the provider number.
    pub existing_key: Option<ClientCredentials>,
    /// Key the admin API hands out when asked to create one.
    pub created_key: Option<ClientCredentials>,
    /// Number of list calls that fail before the API recovers.
    pub failing_lists: u32,
    /// Report every completed navigation twice, as some web views do.
    pub duplicate_events: bool,
    /// Emit no events at all, as if the page hung.
    pub silent: bool,
    /// Post an unrelated message every 500ms instead of any real event.
    pub chatty: bool,
    pub verifier: String,
    events: VecDeque<BrowserEvent>,
    pub log: Arc<Mutex<BrowserLog>>,
}

impl FakeEmrBrowser {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            outcome: LoginOutcome::Success,
            existing_key: Some(client_credentials()),
            created_key: None,
            failing_lists: 0,
            duplicate_events: false,
            silent: false,
            chatty: false,
            verifier: "verifier123".to_string(),
            events: VecDeque::new(),
            log: Arc::new(Mutex::new(BrowserLog::default())),
        }
    }

    fn navigate(&mut self, url: String) {
        self.events.push_back(BrowserEvent::loading(url.clone()));
        self.events.push_back(BrowserEvent::loaded(url.clone()));
        if self.duplicate_events {
            self.events.push_back(BrowserEvent::loaded(url));
        }
    }

    fn reply(&mut self, id: &str, ok: bool, body: serde_json::Value) {
        let status = if ok { 200 } else { 500 };
        let message = json!({"id": id, "ok": ok, "status": status, "body": body.to_string()});
        self.events.push_back(BrowserEvent::Message(message.to_string()));
    }

    fn key_list(&self) -> serde_json::Value {
        let entries: Vec<_> = self
            .existing_key
            .iter()
            .map(|key| json!({"name": PROVIDER_NO, "key": key.key, "secret": key.secret}))
            .chain(std::iter::once(
                json!({"name": "someone-else", "key": "other", "secret": "other"}),
            ))
            .collect();
        json!(entries)
    }
}

#[async_trait]
impl BrowserSession for FakeEmrBrowser {
    async fn load(&mut self, url: &str) -> Result<(), ConnectError> {
        self.log.lock().expect("log lock").loads.push(url.to_string());
        if !self.silent {
            self.navigate(url.to_string());
        }
        Ok(())
    }

    async fn run_script(&mut self, script: &BridgeScript) -> Result<(), ConnectError> {
        self.log.lock().expect("log lock").scripts.push(script.clone());
        match script {
            BridgeScript::FillLoginForm { .. } => {
                let next = match self.outcome {
                    LoginOutcome::Success => format!("{}/provider/providercontrol.jsp", self.base_url),
                    LoginOutcome::Rejected => format!("{}/index.jsp", self.base_url),
                    LoginOutcome::Locked => format!("{}/login.do", self.base_url),
                };
                self.navigate(next);
            }
            BridgeScript::AuthorizeOAuth => {
                let redirect = format!("{CALLBACK}?oauth_token=abc&oauth_verifier={}", self.verifier);
                self.events.push_back(BrowserEvent::loading(redirect));
            }
            BridgeScript::FetchJson { id, url } if url.contains("method=list") => {
                if self.failing_lists > 0 {
                    self.failing_lists -= 1;
                    self.reply(id, false, json!({"error": "unavailable"}));
                } else {
                    let list = self.key_list();
                    self.reply(id, true, list);
                }
            }
            BridgeScript::FetchJson { id, url } if url.contains("method=add") => {
                if self.created_key.is_some() {
                    self.existing_key = self.created_key.take();
                }
                self.reply(id, true, json!({"success": true}));
            }
            BridgeScript::FetchJson { id, .. } => self.reply(id, false, json!({})),
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<BrowserEvent> {
        if self.silent {
            std::future::pending::<()>().await;
        }
        if self.chatty {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            return Some(BrowserEvent::Message(json!({"type": "analytics"}).to_string()));
        }
        self.events.pop_front()
    }
}

/// Bridge double with canned answers.
pub struct StubBridge {
    pub login_result: Mutex<Option<Result<ProviderKeyPair, ConnectError>>>,
    pub redirect: String,
    pub authorized_urls: Mutex<Vec<String>>,
}

impl StubBridge {
    pub fn succeeding(verifier: &str) -> Self {
        Self {
            login_result: Mutex::new(Some(Ok(ProviderKeyPair {
                provider_no: PROVIDER_NO.to_string(),
                credentials: client_credentials(),
            }))),
            redirect: format!("{CALLBACK}?oauth_token=abc&oauth_verifier={verifier}"),
            authorized_urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ConnectError) -> Self {
        let bridge = Self::succeeding("unused");
        *bridge.login_result.lock().expect("lock") = Some(Err(error));
        bridge
    }
}

#[async_trait]
impl LoginBridge for StubBridge {
    async fn login(&self, _credentials: &UserCredentials) -> Result<ProviderKeyPair, ConnectError> {
        self.login_result
            .lock()
            .expect("lock")
            .take()
            .unwrap_or_else(|| Err(ConnectError::InvalidState("login called twice".into())))
    }

    async fn authorize(&self, authorization_url: &str) -> Result<String, ConnectError> {
        self.authorized_urls
            .lock()
            .expect("lock")
            .push(authorization_url.to_string());
        Ok(self.redirect.clone())
    }
}
