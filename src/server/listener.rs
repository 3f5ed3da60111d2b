//! Listener: accepts connections and serves them until shutdown.

use crate::server::Router;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Grace window given to in-flight requests during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors terminating the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("forced shutdown: connections still open after {0:?}")]
    ShutdownTimeout(Duration),
}

/// HTTP server fronting the router.
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
}

impl Server {
    /// Bind the listener.
    pub async fn bind(addr: SocketAddr, router: Arc<Router>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!(listen = %listener.local_addr()?, "listener bound");

        Ok(Self { listener, router })
    }

    /// The bound address. Useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until shutdown fires, then drain
    /// in-flight requests within the grace window.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(error = %e, "failed to set TCP_NODELAY on client connection");
                            }

                            let router = Arc::clone(&self.router);
                            let io = TokioIo::new(stream);

                            let service = service_fn(move |req| {
                                let router = Arc::clone(&router);
                                async move {
                                    Ok::<_, Infallible>(router.handle(req, client_addr).await)
                                }
                            });

                            let conn = http1::Builder::new()
                                .keep_alive(true)
                                .serve_connection(io, service);
                            let conn = graceful.watch(conn);

                            tokio::spawn(async move {
                                if let Err(e) = conn.await {
                                    debug!(error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("listener shutting down");
                    break;
                }
            }
        }

        tokio::select! {
            _ = graceful.shutdown() => {
                info!("all connections drained");
                Ok(())
            }
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                error!(grace_secs = SHUTDOWN_GRACE.as_secs(), "shutdown grace window expired");
                Err(ServerError::ShutdownTimeout(SHUTDOWN_GRACE))
            }
        }
    }
}
