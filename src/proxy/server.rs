//! Relay server implementation using hyper
//!
//! Accepts plain HTTP requests and sends each one through the next rotating endpoint.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RelayConfig;
use crate::error::{Result, RotatorError};
use crate::proxy::handler::{error_response, RelayHandler};
use crate::router::RotatingClient;

/// Relay server
pub struct RelayServer {
    config: RelayConfig,
    handler: Arc<RelayHandler>,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(config: RelayConfig, client: RotatingClient) -> Self {
        Self {
            config,
            handler: Arc::new(RelayHandler::new(client)),
        }
    }

    /// Bind the configured relay address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                RotatorError::InvalidConfig(format!(
                    "Invalid relay address {}:{}",
                    self.config.host, self.config.port
                ))
            })?;

        Ok(TcpListener::bind(addr).await?)
    }

    /// Serve connections from `listener` until shutdown
    #[instrument(skip(self, listener, shutdown))]
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            "Relay server listening on {} for {}",
            listener.local_addr()?,
            self.handler.origin()
        );

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            let handler = self.handler.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, client_addr, handler).await {
                                    debug!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Relay server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a single connection
    async fn handle_connection(
        stream: tokio::net::TcpStream,
        client_addr: SocketAddr,
        handler: Arc<RelayHandler>,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req: Request<Incoming>| {
            let handler = handler.clone();

            async move {
                match handler.handle(req).await {
                    Ok(response) => Ok::<_, Infallible>(response),
                    Err(e) => {
                        let status = e.status_code();
                        if status.is_server_error() {
                            warn!(client = %client_addr, "Relay request failed: {}", e);
                        } else {
                            debug!(client = %client_addr, "Relay request rejected: {}", e);
                        }
                        Ok(error_response(status, &e.to_string()))
                    }
                }
            }
        });

        http1::Builder::new()
            .preserve_header_case(true)
            .serve_connection(io, service)
            .await
            .map_err(|e| RotatorError::Http(e.to_string()))?;

        Ok(())
    }
}
