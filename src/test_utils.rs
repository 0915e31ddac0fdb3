use crate::{Config, DumpError, DumpServer, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Starts a dump server on an ephemeral port for integration tests
///
/// Returns the server task handle, the address it listens on, and the
/// shutdown sender that triggers the same graceful stop as an interrupt.
pub async fn spawn_test_server(
    config: Config,
) -> Result<(
    JoinHandle<Result<()>>,
    SocketAddr,
    tokio::sync::broadcast::Sender<()>,
)> {
    // Bind port 0 to pick a free port, then start the server on it
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| DumpError::Config(format!("failed to bind listener: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| DumpError::Config(format!("failed to get local address: {e}")))?;
    drop(listener); // Close the listener so the server can bind to the same port

    let config = Config {
        port: addr.port(),
        ..config
    };
    let server = DumpServer::new(config);
    let shutdown = server.shutdown_signal();
    let handle = tokio::spawn(async move { server.run().await });

    Ok((handle, addr, shutdown))
}
