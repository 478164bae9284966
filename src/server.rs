//! Herald Server
//!
//! Binds the listener, serves the HTTP router and owns the top-level
//! lifecycle: [`Server::shutdown`] drains the hub first and only then stops
//! the HTTP listener.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::hub::{Hub, HubError, ShutdownReport};

/// Errors that can occur when starting the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running Herald server
pub struct Server {
    hub: Hub,
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    serve: JoinHandle<std::io::Result<()>>,
    shutdown_timeout: Duration,
}

impl Server {
    /// Validate the hub configuration, bind and start serving.
    ///
    /// An invalid hub configuration is reported before the port is bound.
    pub async fn start(config: &Config) -> Result<Server, ServerError> {
        let hub_config = config.hub_config();
        hub_config.validate()?;
        let shutdown_timeout = hub_config.shutdown_timeout;

        let addr = config.server.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let hub = Hub::start(hub_config)?;
        let router = build_router(AppState::new(hub.clone(), config.server.clone()));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serve = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
        });

        tracing::info!(
            addr = %local_addr,
            route = %config.server.route,
            "Herald listening"
        );

        Ok(Server {
            hub,
            local_addr,
            stop: Some(stop_tx),
            serve,
            shutdown_timeout,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Drain the hub, then stop the HTTP listener. The listener gets
    /// `shutdown_timeout` to finish before it is aborted.
    pub async fn shutdown(mut self) -> ShutdownReport {
        let report = self.hub.shutdown().await;

        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        match tokio::time::timeout(self.shutdown_timeout, &mut self.serve).await {
            Ok(Ok(Ok(()))) => tracing::info!("HTTP listener stopped"),
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "HTTP listener failed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "HTTP listener task failed"),
            Err(_) => {
                tracing::warn!("HTTP listener did not stop in time, aborting");
                self.serve.abort();
            }
        }

        report
    }
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
