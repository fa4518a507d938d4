//! HTTP pull endpoint serving the bytes-logged counters at `/metrics`.
//!
//! The listener is bound on the caller's thread so a bad address fails
//! startup; serving happens on a dedicated thread with its own single-threaded
//! runtime, leaving the event loop synchronous.

#![allow(missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::accounting::counter::BytesLoggedCounters;
use crate::core::errors::{LfwError, Result};

/// Handle to the running endpoint. Dropping it stops the server.
pub struct MetricsServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl MetricsServer {
    /// Bind `addr` and start serving `counters`.
    pub fn start(addr: SocketAddr, counters: Arc<BytesLoggedCounters>) -> Result<Self> {
        let listener =
            std::net::TcpListener::bind(addr).map_err(|source| LfwError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| LfwError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| LfwError::Bind { addr, source })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| LfwError::Runtime {
                details: format!("failed to build metrics runtime: {source}"),
            })?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(counters);

        let join = thread::Builder::new()
            .name("lfw-metrics".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(err) => {
                            error!(error = %err, "metrics listener could not be registered");
                            return;
                        }
                    };
                    let served = axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = shutdown_rx.await;
                        })
                        .await;
                    if let Err(err) = served {
                        error!(error = %err, "metrics server failed");
                    }
                });
            })
            .map_err(|source| LfwError::Runtime {
                details: format!("failed to spawn metrics thread: {source}"),
            })?;

        info!(addr = %local_addr, "serving metrics at /metrics");
        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// The bound address (useful when port 0 was requested).
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the server thread.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for MetricsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn router(counters: Arc<BytesLoggedCounters>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(counters)
}

async fn metrics_handler(State(counters): State<Arc<BytesLoggedCounters>>) -> Response {
    match counters.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, BytesLoggedCounters::content_type())],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
