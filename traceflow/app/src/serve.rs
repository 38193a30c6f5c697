use crate::api::Api;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// Accepts connections and drives them with the API service until the
/// shutdown future resolves.
///
/// Each connection runs on its own task; stopping the accept loop does not
/// interrupt connections already being served.
pub(crate) async fn serve(listener: TcpListener, api: Api, shutdown: impl Future) {
    let accept = async move {
        loop {
            let (io, client_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            };

            let service = TowerToHyperService::new(api.clone());
            tokio::spawn(async move {
                let conn = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(io), service);
                if let Err(error) = conn.await {
                    debug!(%error, client.addr = %client_addr, "Connection closed");
                }
            });
        }
    };

    tokio::select! {
        _ = accept => {}
        _ = shutdown => {
            debug!("Accept loop terminated");
        }
    }
}
