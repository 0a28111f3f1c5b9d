//! Layered configuration loading
//!
//! Values are resolved in three layers, later layers overriding earlier ones:
//!
//! 1. The `Default` implementation of the target type
//! 2. A TOML document (a file on disk or an inline string)
//! 3. Environment variables named `<PREFIX>__<SECTION>__<KEY>`

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::{InfraError, InfraResult};

/// Where the TOML layer comes from
#[derive(Debug, Clone, Copy)]
pub enum ConfigSource<'a> {
    /// No TOML layer; defaults and environment only
    Defaults,
    /// A TOML file that must exist
    File(&'a Path),
    /// An inline TOML document
    Inline(&'a str),
}

/// Load a configuration value of type `T`.
///
/// `env_prefix` selects the environment layer; pass an empty string to skip it.
pub fn load_config<T>(source: ConfigSource<'_>, env_prefix: &str) -> InfraResult<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let defaults = Config::try_from(&T::default())?;
    let mut builder = Config::builder().add_source(defaults);

    match source {
        ConfigSource::Defaults => {}
        ConfigSource::File(path) => {
            if !path.exists() {
                return Err(InfraError::config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        ConfigSource::Inline(document) => {
            builder = builder.add_source(File::from_str(document, FileFormat::Toml));
        }
    }

    if !env_prefix.is_empty() {
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
    }

    let config = builder.build()?;
    config.try_deserialize::<T>().map_err(InfraError::from)
}
