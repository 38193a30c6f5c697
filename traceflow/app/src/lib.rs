#![deny(rust_2018_idioms, clippy::disallowed_methods, clippy::disallowed_types)]
#![forbid(unsafe_code)]

//! Wires the collector together: configuration, the HTTP API, and the
//! listener, leaving the binary a thin shell.

pub mod api;
mod env;
mod serve;
pub mod trace;

pub use self::{api::Api, env::Config};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;
use traceflow_collector::Collector;
use traceflow_store::{MemoryStore, Store};

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A fully constructed application, bound but not yet serving.
pub struct App {
    pub addr: SocketAddr,
    listener: TcpListener,
    api: Api,
    collector: Arc<Collector>,
    store: Arc<dyn Store>,
}

/// Controls a running application.
pub struct Handle {
    shutdown_tx: oneshot::Sender<()>,
    collector: Arc<Collector>,
    store: Arc<dyn Store>,
}

// === impl Config ===

impl Config {
    /// Binds the listen port and builds the store, collector, and API.
    pub async fn build(self) -> Result<App, Error> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new(self.max_traces));
        info!(max_traces = self.max_traces, "Storage initialized");

        let collector = Arc::new(Collector::new(
            store.clone(),
            traceflow_collector::Config {
                workers: self.workers,
                buffer: self.buffer_size,
            },
        ));

        let api = Api::new(collector.clone(), store.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        Ok(App {
            addr,
            listener,
            api,
            collector,
            store,
        })
    }
}

// === impl App ===

impl App {
    /// Starts the worker pool and the accept loop, returning a handle that
    /// shuts both down.
    pub fn spawn(self) -> Handle {
        let Self {
            addr: _,
            listener,
            api,
            collector,
            store,
        } = self;

        collector.start();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(serve::serve(listener, api, async move {
            let _ = shutdown_rx.await;
        }));

        Handle {
            shutdown_tx,
            collector,
            store,
        }
    }
}

// === impl Handle ===

impl Handle {
    /// Stops accepting connections, drains the collector within `grace`,
    /// and closes the store.
    ///
    /// A drain that outlives the grace period is reported after the store
    /// is closed; spans still queued at that point are lost.
    pub async fn shutdown(self, grace: Duration) -> Result<(), Error> {
        let _ = self.shutdown_tx.send(());

        let drained = self.collector.shutdown(grace).await;
        self.store.close()?;
        drained?;

        info!("Shutdown complete");
        Ok(())
    }
}
