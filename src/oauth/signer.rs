//! OAuth 1.0a HMAC-SHA1 request signing.
//!
//! Everything here is pure: the only inputs are the consumer credentials,
//! the request, an optional token and a nonce/timestamp pair.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::Url;

use super::token::TokenPair;
use crate::error::ConnectError;
use crate::store::ClientCredentials;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// Nonce and timestamp for one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningParams {
    pub nonce: String,
    pub timestamp: i64,
}

impl SigningParams {
    /// Random nonce, current time.
    pub fn fresh() -> Self {
        Self {
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn fixed(nonce: impl Into<String>, timestamp: i64) -> Self {
        Self {
            nonce: nonce.into(),
            timestamp,
        }
    }
}

/// Result of signing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthHeader {
    /// Protocol parameters excluding the signature, sorted by name.
    pub protocol_params: Vec<(String, String)>,
    pub signature: String,
    pub base_string: String,
}

impl OAuthHeader {
    /// Value for the HTTP `Authorization` header.
    pub fn to_header_value(&self) -> String {
        let mut parts: Vec<String> = self
            .protocol_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        parts.push(format!(
            "oauth_signature=\"{}\"",
            percent_encode(&self.signature)
        ));
        format!("OAuth {}", parts.join(", "))
    }
}

/// Signs requests on behalf of one OAuth consumer.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    consumer: ClientCredentials,
}

impl RequestSigner {
    pub fn new(consumer: ClientCredentials) -> Self {
        Self { consumer }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer.key
    }

    /// Sign with a fresh nonce and the current time.
    ///
    /// `form` holds the body parameters of a form-encoded request; pass an
    /// empty slice for JSON or bodiless requests.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        form: &[(&str, &str)],
        token: Option<&TokenPair>,
    ) -> Result<OAuthHeader, ConnectError> {
        self.sign_with(method, url, form, token, &SigningParams::fresh())
    }

    pub fn sign_with(
        &self,
        method: &str,
        url: &str,
        form: &[(&str, &str)],
        token: Option<&TokenPair>,
        params: &SigningParams,
    ) -> Result<OAuthHeader, ConnectError> {
        let mut protocol_params = vec![
            ("oauth_consumer_key".to_string(), self.consumer.key.clone()),
            ("oauth_nonce".to_string(), params.nonce.clone()),
            (
                "oauth_signature_method".to_string(),
                SIGNATURE_METHOD.to_string(),
            ),
            ("oauth_timestamp".to_string(), params.timestamp.to_string()),
            ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
        ];
        if let Some(token) = token {
            protocol_params.push(("oauth_token".to_string(), token.token.clone()));
        }
        protocol_params.sort();

        let parsed = Url::parse(url)?;
        let mut all_params: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        all_params.extend(form.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        all_params.extend(protocol_params.iter().cloned());

        let base_string = signature_base_string(method, &parsed, &all_params);
        let signature = sign_base_string(
            &base_string,
            &self.consumer.secret,
            token.map(|t| t.secret.as_str()),
        )?;

        Ok(OAuthHeader {
            protocol_params,
            signature,
            base_string,
        })
    }
}

/// RFC 3986 percent-encoding; only `A-Z a-z 0-9 - . _ ~` pass through.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Scheme and host lowercased, default port dropped, no query or fragment.
pub fn base_string_uri(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!("{}://{host}{port}{}", url.scheme(), url.path())
}

/// Encode, sort and join request parameters. Pairs that are identical in
/// both name and value are collapsed to one occurrence.
pub fn normalized_parameters(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    encoded.dedup();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&base_string_uri(url)),
        percent_encode(&normalized_parameters(params))
    )
}

/// HMAC-SHA1 of `base_string`, base64-encoded.
pub fn sign_base_string(
    base_string: &str,
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> Result<String, ConnectError> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or_default())
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| ConnectError::InvalidArgument(format!("invalid signing key: {e}")))?;
    mac.update(base_string.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
