use secrecy::SecretString;
use serde::Deserialize;

/// Bluesky account used for the historical search.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking the password.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BskyConfig {
    /// Base URL of the XRPC service that authenticates and serves search.
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// Handle or email used to log in.
    pub identifier: Option<String>,
    /// Account or app password.
    pub password: Option<SecretString>,
}

impl BskyConfig {
    pub const DEFAULT_SERVICE_URL: &'static str = "https://bsky.social";
}

impl Default for BskyConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            identifier: None,
            password: None,
        }
    }
}

fn default_service_url() -> String {
    BskyConfig::DEFAULT_SERVICE_URL.to_string()
}
