//! HTTP server bootstrap.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use axum::Router;
use gateway::Gateway;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::{RouterOptions, router};

/// The gateway's HTTP front end.
pub struct ApiServer {
    app: Router,
}

impl ApiServer {
    pub fn new(gateway: Gateway, options: &RouterOptions) -> Self {
        Self {
            app: router(gateway, options),
        }
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Binds `addr` and serves until `shutdown` resolves.
    pub async fn bind_and_serve<F>(self, addr: SocketAddr, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "HTTP server listening");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
