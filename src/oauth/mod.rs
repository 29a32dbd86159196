//! OAuth 1.0a signing, token handling and the session manager.

pub mod callback;
pub mod manager;
pub mod response;
pub mod signer;
pub mod token;

pub use callback::{is_callback, verifier_from_redirect};
pub use manager::{OAuthManager, SessionPhase, SignedResponse};
pub use response::{ApiResponse, Status};
pub use signer::{OAuthHeader, RequestSigner, SigningParams};
pub use token::TokenPair;
