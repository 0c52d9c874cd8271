use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

const CONFIGURATION_DIR: &str = "configuration";

/// Tried in this order for both the base and the environment file.
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

const BASE_STEM: &str = "base";

/// Overrides look like `APP_PIPELINE__BATCH__MAX_SIZE=500`.
const OVERRIDE_PREFIX: &str = "APP";

/// Implemented by top-level configuration types.
pub trait Config {
    /// Keys whose overrides are comma separated lists, e.g. `pipeline.hashtags`.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("cannot resolve the working directory: {0}")]
    WorkingDir(#[source] io::Error),

    #[error("no configuration directory at `{0}`")]
    NoDirectory(PathBuf),

    #[error("no `{stem}` configuration file in `{directory}` (tried {tried})")]
    NoFile {
        stem: String,
        directory: PathBuf,
        tried: String,
    },

    #[error("cannot read APP_ENVIRONMENT: {0}")]
    Environment(#[source] io::Error),

    #[error("cannot merge configuration sources: {0}")]
    Merge(#[source] config::ConfigError),

    #[error("configuration does not match the expected shape: {0}")]
    Shape(#[source] config::ConfigError),
}

/// Loads `T` from `./configuration` for the current [`Environment`].
///
/// Sources are layered: `base.*`, then `{environment}.*`, then `APP_` variables with `__`
/// between nested keys.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let directory = std::env::current_dir()
        .map_err(LoadConfigError::WorkingDir)?
        .join(CONFIGURATION_DIR);
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&directory, environment)
}

/// [`load_config`] with an explicit directory and environment.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::NoDirectory(directory.to_path_buf()));
    }

    let base = config_file(directory, BASE_STEM)?;
    let overlay = config_file(directory, environment.as_str())?;

    config::Config::builder()
        .add_source(config::File::from(base))
        .add_source(config::File::from(overlay))
        .add_source(env_overrides(T::LIST_PARSE_KEYS))
        .build()
        .map_err(LoadConfigError::Merge)?
        .try_deserialize()
        .map_err(LoadConfigError::Shape)
}

fn env_overrides(list_keys: &[&str]) -> config::Environment {
    let overrides = config::Environment::with_prefix(OVERRIDE_PREFIX)
        .prefix_separator("_")
        .separator("__");
    if list_keys.is_empty() {
        return overrides;
    }

    list_keys.iter().fold(
        overrides.try_parsing(true).list_separator(","),
        |overrides, key| overrides.with_list_parse_key(key),
    )
}

fn config_file(directory: &Path, stem: &str) -> Result<PathBuf, LoadConfigError> {
    let candidates = EXTENSIONS.map(|extension| directory.join(format!("{stem}.{extension}")));
    if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
        return Ok(found.clone());
    }

    let tried: Vec<String> = candidates
        .iter()
        .filter_map(|candidate| candidate.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    Err(LoadConfigError::NoFile {
        stem: stem.to_owned(),
        directory: directory.to_path_buf(),
        tried: tried.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        size: usize,
    }

    impl Config for Sample {
        const LIST_PARSE_KEYS: &'static [&'static str] = &[];
    }

    #[test]
    fn environment_file_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.yaml"), "name: base\nsize: 1\n").unwrap();
        std::fs::write(dir.path().join("prod.json"), r#"{"size": 2}"#).unwrap();

        let sample: Sample = load_config_from(dir.path(), Environment::Prod).unwrap();

        assert_eq!(sample.name, "base");
        assert_eq!(sample.size, 2);
    }

    #[test]
    fn missing_environment_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.yml"), "name: base\nsize: 1\n").unwrap();

        let err = load_config_from::<Sample>(dir.path(), Environment::Dev).unwrap_err();

        match err {
            LoadConfigError::NoFile { stem, tried, .. } => {
                assert_eq!(stem, "dev");
                assert_eq!(tried, "dev.yaml, dev.yml, dev.json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_config_from::<Sample>(&dir.path().join("nope"), Environment::Dev).unwrap_err();

        assert!(matches!(err, LoadConfigError::NoDirectory(_)));
    }
}
