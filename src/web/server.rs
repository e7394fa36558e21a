//! Web server for Parlor.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use super::router::create_router;
use crate::engine::EngineHandle;
use crate::error::{ParlorError, Result};

/// HTTP and WebSocket front end of the engine.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Engine to hand sockets to.
    engine: EngineHandle,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(host: &str, port: u16, engine: EngineHandle) -> Result<Self> {
        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| ParlorError::Config(format!("invalid listen address {host}:{port}: {e}")))?;
        Ok(Self { addr, engine })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind the listener.
    async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("Web server listening on http://{}", listener.local_addr()?);
        Ok(listener)
    }

    /// Run the web server.
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        let router = create_router(self.engine);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;
        let router = create_router(self.engine);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
