//! Logging setup for mediagraph binaries and tests

pub mod setup;

pub use setup::{parse_log_level, setup_logging, LoggingConfig};
