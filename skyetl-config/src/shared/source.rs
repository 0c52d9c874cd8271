use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream event stream subscription.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// WebSocket URL of the repository event stream.
    #[serde(default = "default_url")]
    pub url: String,
    /// Delay before the first reconnection attempt, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound of the reconnection delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl SourceConfig {
    pub const DEFAULT_URL: &'static str = "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos";

    pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30000;

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_url() -> String {
    SourceConfig::DEFAULT_URL.to_string()
}

fn default_initial_backoff_ms() -> u64 {
    SourceConfig::DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    SourceConfig::DEFAULT_MAX_BACKOFF_MS
}
