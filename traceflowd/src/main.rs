//! The main entrypoint for the collector.

#![deny(rust_2018_idioms, clippy::disallowed_methods, clippy::disallowed_types)]
#![forbid(unsafe_code)]

use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use traceflow_app::Config;

const EX_USAGE: i32 = 64;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn main() {
    let config = Config::parse();

    if let Err(e) = traceflow_app::trace::init(&config.log_level) {
        eprintln!("Invalid logging configuration: {e}");
        std::process::exit(EX_USAGE);
    }

    info!(
        port = config.port,
        workers = config.workers,
        max_traces = config.max_traces,
        "Starting traceflow collector"
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime must build")
        .block_on(async move {
            let app = match config.build().await {
                Ok(app) => app,
                Err(e) => {
                    eprintln!("Initialization failure: {e}");
                    std::process::exit(1);
                }
            };

            info!(addr = %app.addr, "HTTP server listening");
            let handle = app.spawn();

            shutdown_signal().await;
            info!("Shutdown signal received");

            match handle.shutdown(SHUTDOWN_GRACE).await {
                Ok(()) => info!("Shutdown completed gracefully"),
                Err(error) => error!(%error, "Shutdown did not complete cleanly"),
            }
        });
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            error!(%error, "Failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}
