use async_trait::async_trait;

use super::scripts::BridgeScript;
use crate::error::ConnectError;

/// Something the embedded page reported back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    Navigation { url: String, loading: bool },
    /// A string posted by an injected script.
    Message(String),
}

impl BrowserEvent {
    pub fn loading(url: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            loading: true,
        }
    }

    pub fn loaded(url: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            loading: false,
        }
    }
}

/// A hidden web view the login bridge can drive.
///
/// Implementations keep cookies across [`load`](Self::load) calls; the
/// consent page relies on the session the login step created.
#[async_trait]
pub trait BrowserSession: Send {
    async fn load(&mut self, url: &str) -> Result<(), ConnectError>;

    async fn run_script(&mut self, script: &BridgeScript) -> Result<(), ConnectError>;

    /// Next event, or `None` once the view has been closed.
    async fn next_event(&mut self) -> Option<BrowserEvent>;
}
