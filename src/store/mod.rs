//! Encrypted credential persistence.

pub mod encryption;
pub mod file;
pub mod memory;
pub mod secrets;

pub use encryption::MasterKey;
pub use file::{FileSecretStore, SecretStoreConfig};
pub use memory::MemorySecretStore;
pub use secrets::{normalize_base_url, ClientCredentials, Secrets, UserCredentials};

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::ConnectError;

/// Names of every value kept in the secret store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum SecretKey {
    ClientKey,
    ClientSecret,
    #[strum(serialize = "o19_base_url")]
    BaseUrl,
    AccessToken,
    #[strum(serialize = "secret_key")]
    AccessTokenSecret,
    Username,
    Password,
    Pin,
    HasAcceptedTerms,
}

/// Storage abstraction for persisted secrets.
///
/// Implementations report failures; [`Secrets`] is the fail-soft layer
/// callers normally go through.
pub trait SecretStore: Send + Sync {
    fn load(&self, key: SecretKey) -> Result<Option<String>, ConnectError>;
    fn save(&self, key: SecretKey, value: &str) -> Result<(), ConnectError>;
    fn clear(&self, key: SecretKey) -> Result<(), ConnectError>;
}
