//! Client-credential bootstrap through the EMR's own login page.
//!
//! [`LoginBridge`] is the narrow seam the rest of the crate depends on;
//! [`EmbeddedLoginBridge`] implements it over a scripted [`BrowserSession`].

pub mod bridge;
pub mod browser;
pub mod flow;
pub mod scripts;

pub use bridge::EmbeddedLoginBridge;
pub use browser::{BrowserEvent, BrowserSession};
pub use flow::{FlowAction, LoginFlow, LoginStage};
pub use scripts::{BridgeScript, FetchReply};

use async_trait::async_trait;

use crate::error::ConnectError;
use crate::store::{ClientCredentials, UserCredentials};

/// Client key pair provisioned for one EMR provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderKeyPair {
    pub provider_no: String,
    pub credentials: ClientCredentials,
}

#[async_trait]
pub trait LoginBridge: Send + Sync {
    /// Sign in with `credentials` and return the client key pair for the user.
    ///
    /// Rejected or locked logins are [`ConnectError::Credential`].
    async fn login(&self, credentials: &UserCredentials) -> Result<ProviderKeyPair, ConnectError>;

    /// Approve `authorization_url` and return the redirect to the callback URL.
    async fn authorize(&self, authorization_url: &str) -> Result<String, ConnectError>;
}
