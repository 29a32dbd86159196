//! Redirect-URI handling for the authorization step.

use std::collections::HashMap;

use crate::error::ConnectError;

/// Whether `url` is a navigation to the registered callback.
pub fn is_callback(url: &str, callback_url: &str) -> bool {
    let callback = callback_url.trim_end_matches('/');
    let target = url.split(['?', '#']).next().unwrap_or_default();
    !callback.is_empty() && target.trim_end_matches('/') == callback
}

/// Pull `oauth_verifier` out of the redirect the provider sent the user to.
///
/// The callback may use a custom scheme (`exp://`, `openo-connect://`), so the
/// query is split off by hand rather than parsed as an http URL.
pub fn verifier_from_redirect(redirect: &str, callback_url: &str) -> Result<String, ConnectError> {
    let redirect = redirect.trim();
    if !is_callback(redirect, callback_url) {
        return Err(ConnectError::InvalidArgument(format!(
            "redirect does not target the registered callback {callback_url}"
        )));
    }
    let query = redirect
        .split_once('?')
        .map(|(_, query)| query.split('#').next().unwrap_or_default())
        .unwrap_or_default();
    let params: HashMap<String, String> = serde_urlencoded::from_str(query)?;
    params
        .get("oauth_verifier")
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConnectError::Protocol("redirect carries no oauth_verifier".into()))
}
