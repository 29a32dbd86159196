use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConnectError;

pub const NO_RESPONSE: &str = "No response received from server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Uniform result of every network-facing [`OAuthManager`](super::OAuthManager) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Set only when the server answered 401.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data: None,
            code: None,
        }
    }

    pub fn success_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success(message)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            data: None,
            code: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            code: Some(401),
            ..Self::error(message)
        }
    }

    /// Map a failed request onto the message shown to callers.
    pub fn from_error(error: &ConnectError) -> Self {
        let message = match error {
            ConnectError::Network(_) => NO_RESPONSE.to_string(),
            ConnectError::Server { status, message } => format!("{status} {message}"),
            ConnectError::Protocol(detail) => format!("Unexpected response from server: {detail}"),
            other => other.to_string(),
        };
        if error.is_unauthorized() {
            Self::unauthorized(message)
        } else {
            Self::error(message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == Some(401)
    }
}
