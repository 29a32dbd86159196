//! openo-connect: OAuth 1.0a client for O19/OSCAR EMR web services.
//!
//! Acquires access through the three-legged OAuth 1.0a handshake, keeps the
//! resulting secrets in an encrypted store, signs every web-services call
//! with HMAC-SHA1, and demotes the stored token when the server rejects it.
//! A scripted login bridge can mint the client key pair when none exists.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use openo_connect::prelude::*;
//!
//! # async fn example() -> openo_connect::error::Result<()> {
//! let config = ConnectConfig::load()?;
//! let secrets = Secrets::new(Arc::new(config.open_secret_store()?));
//! let session = AuthSession::new(secrets, config);
//!
//! let url = session.begin_authorization().await?;
//! println!("approve at {url}");
//! # let redirect = String::new();
//! session.complete_authorization(&redirect).await?;
//!
//! let response = session
//!     .authorized_request(reqwest::Method::GET, "schedule/day/2024-01-01", None)
//!     .await;
//! println!("{}", response.message);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod oauth;
pub mod prelude;
pub mod session;
pub mod store;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
