//! URL construction for every EMR endpoint the client touches.

use crate::error::ConnectError;
use crate::store::normalize_base_url;

/// EMR endpoint builder rooted at a normalized base URL.
///
/// # Example
/// ```
/// use openo_connect::endpoints::Endpoints;
///
/// let endpoints = Endpoints::new("https://emr.example.com/oscar/")?;
/// assert_eq!(endpoints.construct_url("/index.jsp"), "https://emr.example.com/oscar/index.jsp");
/// assert_eq!(
///     endpoints.service("schedule/day/2024-01-01"),
///     "https://emr.example.com/oscar/ws/services/schedule/day/2024-01-01",
/// );
/// # Ok::<(), openo_connect::error::ConnectError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Result<Self, ConnectError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a path onto the base URL with exactly one separating slash.
    pub fn construct_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request_token(&self) -> String {
        self.construct_url("ws/oauth/initiate")
    }

    pub fn authorize(&self, request_token: &str) -> String {
        format!(
            "{}?oauth_token={}",
            self.construct_url("ws/oauth/authorize"),
            urlencoding::encode(request_token)
        )
    }

    pub fn access_token(&self) -> String {
        self.construct_url("ws/oauth/token")
    }

    pub fn service(&self, endpoint: &str) -> String {
        self.construct_url(&format!("ws/services/{}", endpoint.trim_start_matches('/')))
    }

    pub fn login_service(&self) -> String {
        self.construct_url("ws/LoginService")
    }

    pub fn login_page(&self) -> String {
        self.construct_url("index.jsp")
    }

    pub fn list_client_keys(&self) -> String {
        self.construct_url("admin/api/clientManage.json?method=list")
    }

    pub fn create_client_key(&self, name: &str, callback_url: &str, lifetime_secs: u64) -> String {
        format!(
            "{}?method=add&name={}&uri={}&lifetime={lifetime_secs}",
            self.construct_url("admin/api/clientManage.json"),
            urlencoding::encode(name),
            urlencoding::encode(callback_url),
        )
    }
}
