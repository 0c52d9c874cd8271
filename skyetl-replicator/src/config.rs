use secrecy::SecretString;
use skyetl_config::load_config;
use skyetl_config::shared::{BskyConfig, ReplicatorConfig};

use crate::error::{ReplicatorError, ReplicatorResult};

/// Variable holding the Bluesky handle when `bsky.identifier` is not configured.
const BSKY_USERNAME_ENV_NAME: &str = "BSKY_USERNAME";

/// Variable holding the Bluesky password when `bsky.password` is not configured.
const BSKY_PASSWORD_ENV_NAME: &str = "BSKY_PASSWORD";

/// Loads and validates the replicator configuration.
///
/// Missing Bluesky credentials are taken from `BSKY_USERNAME` and `BSKY_PASSWORD`.
pub fn load_replicator_config() -> ReplicatorResult<ReplicatorConfig> {
    let mut config = load_config::<ReplicatorConfig>().map_err(ReplicatorError::config)?;
    config.validate().map_err(ReplicatorError::config)?;

    fill_credentials(&mut config.bsky, |name| std::env::var(name).ok());

    Ok(config)
}

fn fill_credentials(bsky: &mut BskyConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |name: &str| lookup(name).filter(|value: &String| !value.is_empty());

    if bsky.identifier.is_none() {
        bsky.identifier = non_empty(BSKY_USERNAME_ENV_NAME);
    }
    if bsky.password.is_none() {
        bsky.password = non_empty(BSKY_PASSWORD_ENV_NAME).map(SecretString::new);
    }
}
