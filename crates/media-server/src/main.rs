//! mediagraph - media server control plane
//!
//! Serves the media object API over JSON RPC with the loopback engine.

use anyhow::{Context, Result};
use clap::Parser;
use mediagraph_infra_common::setup_logging;
use mediagraph_object_core::{GarbageCollector, MediaServer};
use mediagraph_server::config::EngineKind;
use mediagraph_server::{create_router, RpcHandler, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mediagraph")]
#[command(about = "Media server control plane over JSON RPC")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `server.bind`
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level, overrides `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    setup_logging(&config.logging)?;

    let (server, _engine) = match config.engine.kind {
        EngineKind::Loopback => MediaServer::with_loopback(config.engine.loopback()),
    };
    let server = Arc::new(server);
    let handler = Arc::new(RpcHandler::new(Arc::clone(&server)));

    let gc = config.gc.enabled.then(|| {
        let queues = Arc::clone(&handler);
        GarbageCollector::spawn_with_hook(
            Arc::clone(server.graph()),
            config.gc.interval(),
            Box::new(move |_| {
                queues.sweep_queues();
            }),
        )
    });

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("mediagraph listening on {}", addr);

    let router = create_router(handler);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("serving RPC")?;

    if let Some(gc) = gc {
        gc.shutdown().await;
    }
    info!("mediagraph stopped");
    Ok(())
}
