//! Server lifecycle: bind, serve, graceful drain
//!
//! The accept loop multiplexes new connections with the interrupt signal and
//! an internal shutdown channel. Shutdown stops acceptance, closes idle
//! connections, and waits for started requests to finish under a deadline.

use crate::protocol::{ProtocolError, RequestReader, encode_response};
use crate::{Config, DumpError, Result};
use http::StatusCode;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for in-flight requests during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// HTTP request-dumping echo server
///
/// Owns the immutable [`Config`] for the lifetime of the process and serves
/// every connection with the same catch-all dump-and-echo handler.
pub struct DumpServer {
    config: Config,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl DumpServer {
    /// Creates a new server with the given configuration
    pub fn new(config: Config) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    /// Returns a sender that triggers the same graceful shutdown path as an
    /// interrupt signal
    pub fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }

    /// Binds the listener and serves until an interrupt or internal shutdown
    /// signal arrives, then drains in-flight connections.
    ///
    /// Any listener-level failure (bind or accept) is returned as
    /// [`DumpError::Listen`]; a drain that outlives the grace period is
    /// [`DumpError::Shutdown`]. A clean drain returns `Ok(())`.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.config.port))
            .await
            .map_err(DumpError::Listen)?;
        let port = listener.local_addr().map_err(DumpError::Listen)?.port();
        info!("listening on port {port}");

        let tracker = TaskTracker::new();
        let drain = CancellationToken::new();
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, addr) = accept_result.map_err(DumpError::Listen)?;
                    debug!(%addr, "accepted connection");

                    let config = self.config.clone();
                    let drain = drain.clone();
                    tracker.spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, config, drain).await {
                            error!(%addr, error = %e, "error handling connection");
                        }
                        debug!(%addr, "connection closed");
                    });
                }
                _ = signal::ctrl_c() => {
                    info!("shutting down server...");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("shutting down server...");
                    break;
                }
            }
        }

        // Stop accepting, then let started requests finish
        drop(listener);
        drain.cancel();
        tracker.close();
        timeout(SHUTDOWN_GRACE, tracker.wait()).await.map_err(|_| {
            DumpError::Shutdown(format!(
                "in-flight requests did not finish within {SHUTDOWN_GRACE:?}"
            ))
        })?;

        info!("server stopped");
        Ok(())
    }
}

/// Serves one connection: requests are dumped, logged, and echoed back with
/// the configured status code until the client closes or shutdown begins.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: Config,
    drain: CancellationToken,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = RequestReader::new(read_half);

    loop {
        // Park until the next request starts; an idle connection is closed
        // as soon as shutdown begins, a started request is always finished.
        let has_data = tokio::select! {
            result = reader.wait_for_data() => result.map_err(DumpError::Dump)?,
            _ = drain.cancelled() => {
                debug!(%addr, "closing idle connection for shutdown");
                break;
            }
        };
        if !has_data {
            debug!(%addr, "client closed connection");
            break;
        }

        match reader.next_request().await {
            Ok(Some(request)) => {
                let dump = request.to_wire();
                info!("{}", String::from_utf8_lossy(&dump));

                let response = encode_response(config.status_code_response, &dump);
                write_half
                    .write_all(&response)
                    .await
                    .map_err(|e| DumpError::Dump(ProtocolError::Io(e)))?;
                write_half
                    .flush()
                    .await
                    .map_err(|e| DumpError::Dump(ProtocolError::Io(e)))?;
            }
            Ok(None) => {
                debug!(%addr, "client closed connection");
                break;
            }
            Err(e) => {
                warn!(%addr, error = %e, "failed to dump request");

                // The connection may already be unusable; the 500 is best
                // effort and the connection closes either way.
                let response =
                    encode_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().as_bytes());
                let _ = write_half.write_all(&response).await;
                let _ = write_half.flush().await;
                break;
            }
        }
    }

    Ok(())
}
