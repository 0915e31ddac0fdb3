use crate::protocol::ProtocolError;
use thiserror::Error;

/// Error types for the dumpsrv library
#[derive(Error, Debug)]
pub enum DumpError {
    /// Malformed configuration value from the environment or flags
    #[error("configuration error: {0}")]
    Config(String),

    /// Listener-level errors (bind, accept)
    #[error("listen error: {0}")]
    Listen(std::io::Error),

    /// Failure reading or serializing an incoming request
    #[error("request dump error: {0}")]
    Dump(#[from] ProtocolError),

    /// Graceful shutdown did not complete in time
    #[error("shutdown error: {0}")]
    Shutdown(String),

    /// Client-side connection errors
    #[error("connection error: {0}")]
    Connection(std::io::Error),

    /// Timeout errors on client operations
    #[error("timeout error: {0}")]
    Timeout(String),

    /// UTF-8 encoding errors
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type for the dumpsrv library
pub type Result<T> = std::result::Result<T, DumpError>;

pub mod client;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod test_utils;

// Re-export main types for convenience
pub use client::{ClientConfig, DumpClient, DumpResponse};
pub use config::{Cli, Config};
pub use protocol::{DumpedRequest, RequestReader};
pub use server::DumpServer;
