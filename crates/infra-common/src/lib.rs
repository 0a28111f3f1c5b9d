//! # Infra-Common
//!
//! Shared infrastructure for the mediagraph crates.
//!
//! This crate provides:
//! - Logging setup on top of `tracing-subscriber` ([`logging`])
//! - Layered configuration loading (defaults, TOML file, environment) ([`config`])
//! - The error type both of those report ([`errors`])

pub mod config;
pub mod errors;
pub mod logging;

pub use crate::config::{load_config, ConfigSource};
pub use crate::errors::{InfraError, InfraResult};
pub use crate::logging::{setup_logging, LoggingConfig};
