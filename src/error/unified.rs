//! Error classification and recovery.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Why the EMR refused the stored login credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CredentialFailure {
    #[strum(serialize = "login rejected")]
    LoginRejected,
    #[strum(serialize = "account locked")]
    AccountLocked,
}

impl CredentialFailure {
    /// Message shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::LoginRejected => "Failed to login. Please try again.",
            Self::AccountLocked => {
                "Your account has been locked. Please contact an administrator."
            }
        }
    }
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Network,
    Timeout,
    Server,
    Api,
    Protocol,
    State,
    Credential,
    Bootstrap,
    Storage,
    Configuration,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    Retry,
    Reauthorize,
    ReenterCredentials,
    RestartFlow,
    CheckConfiguration,
    ContactAdministrator,
}
