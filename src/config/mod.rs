//! Configuration system (layered: defaults > config file > environment).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::error::ConnectError;
use crate::store::{FileSecretStore, MasterKey, SecretStoreConfig};

pub const DEFAULT_CALLBACK_URL: &str = "openo-connect://callback";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Runtime configuration for the OAuth client and login bridge.
///
/// # Example
/// ```
/// use openo_connect::config::ConnectConfig;
///
/// let config = ConnectConfig::builder()
///     .callback_url("exp://127.0.0.1:8081/--/callback")
///     .max_provisioning_attempts(2)
///     .build();
/// assert_eq!(config.key_lifetime_secs, 86_400);
/// ```
#[derive(Clone, Builder)]
pub struct ConnectConfig {
    /// Redirect URI registered with the OAuth provider.
    #[builder(into, default = DEFAULT_CALLBACK_URL.to_string())]
    pub callback_url: String,
    /// Directory holding the secret store and config file.
    #[builder(into, default = default_data_dir())]
    pub data_dir: PathBuf,
    /// Base64 master key; when absent a key file in `data_dir` is used.
    #[builder(into)]
    pub master_key: Option<String>,
    #[builder(default = 30)]
    pub http_timeout_secs: u64,
    /// Deadline for each browser phase: sign-in with provisioning, or consent.
    #[builder(default = 60)]
    pub bridge_event_timeout_secs: u64,
    /// Lifetime requested for newly provisioned client keys.
    #[builder(default = 86_400)]
    pub key_lifetime_secs: u64,
    #[builder(default = 3)]
    pub max_provisioning_attempts: u32,
    #[builder(into, default = DEFAULT_USER_AGENT.to_string())]
    pub user_agent: String,
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("callback_url", &self.callback_url)
            .field("data_dir", &self.data_dir)
            .field("master_key", &self.master_key.as_ref().map(|_| ".."))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("bridge_event_timeout_secs", &self.bridge_event_timeout_secs)
            .field("key_lifetime_secs", &self.key_lifetime_secs)
            .field("max_provisioning_attempts", &self.max_provisioning_attempts)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Optional overrides read from `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    callback_url: Option<String>,
    data_dir: Option<PathBuf>,
    master_key: Option<String>,
    http_timeout_secs: Option<u64>,
    bridge_event_timeout_secs: Option<u64>,
    key_lifetime_secs: Option<u64>,
    max_provisioning_attempts: Option<u32>,
    user_agent: Option<String>,
}

impl ConnectConfig {
    /// Load defaults, then `<data_dir>/config.toml`, then `OPENO_*`
    /// environment variables (including a `.env` file if present).
    pub fn load() -> Result<Self, ConnectError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("OPENO_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        let file_path = config.data_dir.join(CONFIG_FILE_NAME);
        if file_path.exists() {
            config.merge_file(&file_path)?;
        }
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with a specific TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConnectError> {
        let mut config = Self::default();
        config.merge_file(path.as_ref())?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConnectError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&raw)?;
        if let Some(v) = file.callback_url {
            self.callback_url = v;
        }
        if let Some(v) = file.data_dir {
            self.data_dir = v;
        }
        if file.master_key.is_some() {
            self.master_key = file.master_key;
        }
        if let Some(v) = file.http_timeout_secs {
            self.http_timeout_secs = v;
        }
        if let Some(v) = file.bridge_event_timeout_secs {
            self.bridge_event_timeout_secs = v;
        }
        if let Some(v) = file.key_lifetime_secs {
            self.key_lifetime_secs = v;
        }
        if let Some(v) = file.max_provisioning_attempts {
            self.max_provisioning_attempts = v;
        }
        if let Some(v) = file.user_agent {
            self.user_agent = v;
        }
        Ok(())
    }

    /// Apply `OPENO_*` overrides from `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConnectError> {
        if let Some(v) = lookup("OPENO_CALLBACK_URL") {
            self.callback_url = v;
        }
        if let Some(v) = lookup("OPENO_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OPENO_MASTER_KEY") {
            self.master_key = Some(v);
        }
        if let Some(v) = lookup("OPENO_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_number("OPENO_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("OPENO_BRIDGE_TIMEOUT_SECS") {
            self.bridge_event_timeout_secs = parse_number("OPENO_BRIDGE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("OPENO_KEY_LIFETIME_SECS") {
            self.key_lifetime_secs = parse_number("OPENO_KEY_LIFETIME_SECS", &v)?;
        }
        if let Some(v) = lookup("OPENO_MAX_PROVISIONING_ATTEMPTS") {
            self.max_provisioning_attempts =
                parse_number("OPENO_MAX_PROVISIONING_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("OPENO_USER_AGENT") {
            self.user_agent = v;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn bridge_event_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_event_timeout_secs)
    }

    /// HTTP client shared by the OAuth manager and the SOAP login call.
    pub fn http_client(&self) -> Result<reqwest::Client, ConnectError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| ConnectError::Configuration(format!("failed to build HTTP client: {e}")))
    }

    pub fn secret_store_config(&self) -> Result<SecretStoreConfig, ConnectError> {
        let config = SecretStoreConfig::new(self.data_dir.clone());
        match &self.master_key {
            Some(encoded) => Ok(config.with_master_key(MasterKey::from_base64(encoded)?)),
            None => Ok(config),
        }
    }

    pub fn open_secret_store(&self) -> Result<FileSecretStore, ConnectError> {
        FileSecretStore::open(self.secret_store_config()?)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConnectError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConnectError::Configuration(format!("{name} must be a number, got {value:?}")))
}

fn default_data_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".openo"))
        .unwrap_or_else(|| PathBuf::from(".openo"))
}
