//! Convenience re-exports for common use.

pub use crate::bootstrap::{EmbeddedLoginBridge, LoginBridge, ProviderKeyPair};
pub use crate::config::ConnectConfig;
pub use crate::error::{ConnectError, Result};
pub use crate::oauth::{ApiResponse, OAuthManager, SessionPhase, Status, TokenPair};
pub use crate::session::{AuthSession, AuthSnapshot};
pub use crate::store::{ClientCredentials, SecretKey, SecretStore, Secrets, UserCredentials};
