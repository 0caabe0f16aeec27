//! HTTP server listener
//!
//! Binds the socket, starts the refresh scheduler and serves the router
//! until shutdown is requested.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::gateway::Gateway;
use crate::resolver::{Resolve, SourceResolver};
use crate::server::config::ServerConfig;
use crate::server::routes;

/// HTTP front of a [`Gateway`]
pub struct GatewayServer<R: Resolve = SourceResolver> {
    config: ServerConfig,
    gateway: Arc<Gateway<R>>,
}

impl<R: Resolve> GatewayServer<R> {
    /// Create a new server with the given configuration and gateway
    pub fn new(config: ServerConfig, gateway: Gateway<R>) -> Self {
        Self {
            config,
            gateway: Arc::new(gateway),
        }
    }

    /// Get a reference to the gateway
    pub fn gateway(&self) -> &Arc<Gateway<R>> {
        &self.gateway
    }

    /// Router serving this server's gateway
    pub fn router(&self) -> Router {
        routes::router(Arc::clone(&self.gateway))
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    ///
    /// Once `shutdown` resolves no new connections are accepted. Open
    /// responses get `shutdown_grace` to finish before they are dropped,
    /// which ends their sessions and kills their encoders.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let sources = self.gateway.start().await;
        tracing::info!(addr = %addr, sources, "Gateway listening");

        let (signalled_tx, signalled_rx) = oneshot::channel();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            let _ = signalled_tx.send(());
        };

        let grace = self.config.shutdown_grace;
        let deadline = async move {
            match signalled_rx.await {
                Ok(()) => tokio::time::sleep(grace).await,
                Err(_) => std::future::pending().await,
            }
        };

        let server = axum::serve(listener, self.router()).with_graceful_shutdown(signal);

        let result = tokio::select! {
            result = server.into_future() => result,
            _ = deadline => {
                tracing::warn!(grace = ?grace, "Shutdown grace elapsed, dropping open responses");
                Ok(())
            }
        };

        self.gateway.shutdown().await;
        tracing::info!("Gateway stopped");

        Ok(result?)
    }
}
