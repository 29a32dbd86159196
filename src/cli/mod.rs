//! CLI entry point for openo-connect.

pub mod auth;

use clap::{Parser, Subcommand};

/// OAuth client for O19/OSCAR EMR web services
#[derive(Parser, Debug)]
#[command(name = "openo", version, about = "openo-connect CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Server and client-key settings
    Settings(SettingsArgs),
    /// Stored EMR login credentials
    Credentials(CredentialsArgs),
    /// OAuth authorization management
    Auth(AuthArgs),
    /// Send a signed request to the web-services API
    Request(RequestArgs),
}

#[derive(Parser, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Set the EMR base URL (drops tokens and client keys for the old server)
    BaseUrl { url: String },
    /// Install a client key and secret issued by the EMR administrator
    ClientKey { key: String, secret: String },
    /// Accept the terms of use
    AcceptTerms,
}

#[derive(Parser, Debug)]
pub struct CredentialsArgs {
    #[command(subcommand)]
    pub command: CredentialsCommands,
}

#[derive(Subcommand, Debug)]
pub enum CredentialsCommands {
    /// Store username, password and PIN
    Set {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        pin: String,
    },
    /// Delete the stored login credentials
    Clear,
}

#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Authorize this client; prints a URL and waits for the pasted redirect
    Login,
    /// Show authentication status
    Status,
    /// Delete the stored access token
    Logout,
}

#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// JSON request body
    #[arg(short, long)]
    pub data: Option<String>,

    /// Path under ws/services, e.g. schedule/day/2024-01-01
    pub endpoint: String,
}
