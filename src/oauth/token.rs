use std::collections::HashMap;
use std::fmt;

use crate::error::ConnectError;

/// An OAuth token and its secret (request or access).
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub secret: String,
}

impl TokenPair {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("token", &self.token)
            .field("secret", &"..")
            .finish()
    }
}

/// Parse an `application/x-www-form-urlencoded` token response body.
pub fn parse_token_response(body: &str) -> Result<TokenPair, ConnectError> {
    let params: HashMap<String, String> = serde_urlencoded::from_str(body.trim())?;
    let field = |name: &str| {
        params
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| ConnectError::Protocol(format!("token response is missing {name}")))
    };
    Ok(TokenPair {
        token: field("oauth_token")?,
        secret: field("oauth_token_secret")?,
    })
}
