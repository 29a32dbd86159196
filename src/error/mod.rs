//! Error types for openo-connect.

pub mod unified;

pub use unified::{CredentialFailure, ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all openo-connect operations.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The request was sent but no response came back.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The response body was not in the expected OAuth, XML or JSON shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An operation was invoked out of sequence.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The EMR rejected the stored login credentials.
    #[error("Credential error: {0}")]
    Credential(CredentialFailure),

    /// Client key provisioning failed after a successful login.
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// The embedded browser session went away before the flow finished.
    #[error("Flow abandoned: {0}")]
    Abandoned(String),

    /// A bounded wait elapsed.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ConnectError {
    /// Create a server error from a status code and message.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by a server error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server rejected the signed request's token.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Network,
            Self::Server { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::InvalidState(_) => ErrorCategory::State,
            Self::Credential(_) => ErrorCategory::Credential,
            Self::Provisioning(_) | Self::Abandoned(_) => ErrorCategory::Bootstrap,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Configuration(_) | Self::InvalidArgument(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network
                | ErrorCategory::Server
                | ErrorCategory::Timeout
                | ErrorCategory::Bootstrap
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::Reauthorize,
            ErrorCategory::Credential => RecoverySuggestion::ReenterCredentials,
            ErrorCategory::Network
            | ErrorCategory::Server
            | ErrorCategory::Timeout
            | ErrorCategory::Bootstrap => RecoverySuggestion::Retry,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::State => RecoverySuggestion::RestartFlow,
            _ => RecoverySuggestion::ContactAdministrator,
        }
    }
}

impl From<reqwest::Error> for ConnectError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => Self::server(status.as_u16(), error.to_string()),
            None if error.is_decode() => Self::Protocol(error.to_string()),
            None => Self::Network(error.to_string()),
        }
    }
}

impl From<std::io::Error> for ConnectError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for ConnectError {
    fn from(error: serde_json::Error) -> Self {
        Self::Protocol(error.to_string())
    }
}

impl From<serde_urlencoded::de::Error> for ConnectError {
    fn from(error: serde_urlencoded::de::Error) -> Self {
        Self::Protocol(error.to_string())
    }
}

impl From<toml::de::Error> for ConnectError {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<url::ParseError> for ConnectError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidArgument(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConnectError>;
