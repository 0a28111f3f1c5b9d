//! # Mediagraph Server
//!
//! Exposes a [`mediagraph_object_core::MediaServer`] over JSON RPC and hosts
//! the `mediagraph` binary's configuration.

pub mod config;
pub mod rpc;

pub use config::ServerConfig;
pub use rpc::{create_router, RpcHandler};
