//! CLI handlers for settings, credentials and authorization.

use std::io::Write;
use std::sync::Arc;

use crate::config::ConnectConfig;
use crate::session::AuthSession;
use crate::store::{ClientCredentials, Secrets, UserCredentials};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the file-backed store under the configured data directory.
pub fn open_session() -> Result<AuthSession, Box<dyn std::error::Error>> {
    let config = ConnectConfig::load()?;
    let store = config.open_secret_store()?;
    tracing::debug!(path = %store.path().display(), "opened secret store");
    Ok(AuthSession::new(Secrets::new(Arc::new(store)), config))
}

pub fn handle_base_url(url: &str) -> CliResult {
    let session = open_session()?;
    let stored = session.update_base_url(url)?;
    println!("✅ Base URL set to {stored}");
    println!("   Stored access token and client key were removed.");
    Ok(())
}

pub fn handle_client_key(key: &str, secret: &str) -> CliResult {
    let session = open_session()?;
    session.install_client_credentials(&ClientCredentials {
        key: key.to_string(),
        secret: secret.to_string(),
    });
    if session.manager().is_none() {
        println!("⚠️  Client key saved; set a base URL before authorizing.");
    } else {
        println!("✅ Client key saved");
    }
    Ok(())
}

pub fn handle_accept_terms() -> CliResult {
    open_session()?.accept_terms();
    println!("✅ Terms accepted");
    Ok(())
}

pub fn handle_set_credentials(username: &str, password: &str, pin: &str) -> CliResult {
    let session = open_session()?;
    session.save_user_credentials(&UserCredentials::new(username, password, pin));
    if session.snapshot().has_user_credentials {
        println!("✅ Credentials saved for {username}");
    } else {
        println!("⚠️  Credentials incomplete; username, password and PIN are all required.");
    }
    Ok(())
}

pub fn handle_clear_credentials() -> CliResult {
    open_session()?.clear_user_credentials();
    println!("✅ Credentials removed");
    Ok(())
}

/// Handle `openo auth login`: manual out-of-band authorization.
pub async fn handle_login() -> CliResult {
    let session = open_session()?;
    let url = session.begin_authorization().await?;

    println!("🔗 Visit: {url}");
    println!("📋 After approving, paste the full redirect URL below:");
    print!("> ");
    std::io::stdout().flush()?;

    let mut redirect = String::new();
    std::io::stdin().read_line(&mut redirect)?;

    let response = session.complete_authorization(redirect.trim()).await?;
    if response.is_success() {
        println!("✅ {}", response.message);
        Ok(())
    } else {
        Err(format!("Authorization failed: {}", response.message).into())
    }
}

pub fn handle_status() -> CliResult {
    let session = open_session()?;
    for (label, value) in status_lines(&session) {
        println!("{:<19}{value}", format!("{label}:"));
    }
    Ok(())
}

/// Everything `auth status` reports; all of it is read back from the store.
fn status_lines(session: &AuthSession) -> Vec<(&'static str, String)> {
    let snapshot = session.refresh();
    let secrets = session.secrets();
    vec![
        (
            "Base URL",
            secrets.base_url().unwrap_or_else(|| "(not set)".into()),
        ),
        (
            "Client key",
            secrets
                .client_credentials()
                .map(|c| c.key)
                .unwrap_or_else(|| "(not set)".into()),
        ),
        ("User credentials", yes_no(snapshot.has_user_credentials).into()),
        ("Access token", yes_no(snapshot.has_access_token).into()),
        ("Terms accepted", yes_no(session.has_accepted_terms()).into()),
    ]
}

pub fn handle_logout() -> CliResult {
    let session = open_session()?;
    session.secrets().clear_access_token();
    session.refresh();
    println!("✅ Logged out");
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
