//! openo CLI binary entry point.

use clap::Parser;
use openo_connect::cli::{
    AuthCommands, Cli, Commands, CredentialsCommands, RequestArgs, SettingsCommands,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Settings(args) => match args.command {
            SettingsCommands::BaseUrl { url } => openo_connect::cli::auth::handle_base_url(&url),
            SettingsCommands::ClientKey { key, secret } => {
                openo_connect::cli::auth::handle_client_key(&key, &secret)
            }
            SettingsCommands::AcceptTerms => openo_connect::cli::auth::handle_accept_terms(),
        },
        Commands::Credentials(args) => match args.command {
            CredentialsCommands::Set {
                username,
                password,
                pin,
            } => openo_connect::cli::auth::handle_set_credentials(&username, &password, &pin),
            CredentialsCommands::Clear => openo_connect::cli::auth::handle_clear_credentials(),
        },
        Commands::Auth(args) => match args.command {
            AuthCommands::Login => openo_connect::cli::auth::handle_login().await,
            AuthCommands::Status => openo_connect::cli::auth::handle_status(),
            AuthCommands::Logout => openo_connect::cli::auth::handle_logout(),
        },
        Commands::Request(args) => handle_request(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_request(args: RequestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let method: reqwest::Method = args
        .method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| format!("Invalid HTTP method: '{}'", args.method))?;
    let body: Option<serde_json::Value> = args.data.as_deref().map(serde_json::from_str).transpose()?;

    let session = openo_connect::cli::auth::open_session()?;
    let response = session
        .authorized_request(method, &args.endpoint, body.as_ref())
        .await;

    if response.is_unauthorized() {
        eprintln!("❌ {}", response.message);
        eprintln!("   Access token removed; run `openo auth login` to authorize again.");
        std::process::exit(1);
    }
    if !response.is_success() {
        return Err(response.message.into());
    }
    match response.data {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("{}", response.message),
    }
    Ok(())
}
