//! Client for exercising dump servers
//!
//! Writes raw request bytes and parses one response per send. Used by the
//! integration tests, property tests, and benches, and exported for tooling
//! that wants to poke at a running server.

use crate::protocol::ProtocolError;
use crate::{DumpError, Result};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const MAX_HEADERS: usize = 64;

/// Configuration for dump clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout for operations
    pub read_timeout: Duration,
    /// Write timeout for operations
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// One parsed HTTP response
#[derive(Debug, Clone)]
pub struct DumpResponse {
    pub status: u16,
    /// Headers in arrival order with raw values
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl DumpResponse {
    /// The body decoded as UTF-8
    pub fn body_string(&self) -> Result<String> {
        String::from_utf8(self.body.clone()).map_err(DumpError::Utf8)
    }

    /// First header value matching `name`, case-insensitively
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }
}

/// Client that speaks raw HTTP/1.1 to a dump server
pub struct DumpClient {
    stream: TcpStream,
    config: ClientConfig,
    buffer: BytesMut,
}

impl DumpClient {
    /// Connect with custom configuration
    pub async fn connect_with_config(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DumpError::Timeout("connection timeout".to_string()))?
            .map_err(DumpError::Connection)?;

        Ok(Self {
            stream,
            config,
            buffer: BytesMut::with_capacity(8192),
        })
    }

    /// Connect with default configuration
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    /// Sends raw request bytes and reads back one response.
    ///
    /// The connection stays open between sends, so several requests can be
    /// issued over one connection to exercise keep-alive behavior.
    pub async fn send(&mut self, raw_request: &[u8]) -> Result<DumpResponse> {
        timeout(self.config.write_timeout, self.stream.write_all(raw_request))
            .await
            .map_err(|_| DumpError::Timeout("write timeout".to_string()))?
            .map_err(DumpError::Connection)?;
        timeout(self.config.write_timeout, self.stream.flush())
            .await
            .map_err(|_| DumpError::Timeout("flush timeout".to_string()))?
            .map_err(DumpError::Connection)?;

        self.read_response().await
    }

    /// Convenience wrapper over [`send`](Self::send) for string requests
    pub async fn send_str(&mut self, raw_request: &str) -> Result<DumpResponse> {
        self.send(raw_request.as_bytes()).await
    }

    async fn read_response(&mut self) -> Result<DumpResponse> {
        let (head_len, status, headers) = loop {
            if !self.buffer.is_empty() {
                let mut header_slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
                let mut parsed = httparse::Response::new(&mut header_slots);
                match parsed.parse(&self.buffer) {
                    Ok(httparse::Status::Complete(head_len)) => {
                        let status = parsed.code.ok_or_else(|| {
                            DumpError::Dump(ProtocolError::Parse(
                                "missing status code".to_string(),
                            ))
                        })?;
                        let headers: Vec<(String, Vec<u8>)> = parsed
                            .headers
                            .iter()
                            .map(|h| (h.name.to_string(), h.value.to_vec()))
                            .collect();
                        break (head_len, status, headers);
                    }
                    Ok(httparse::Status::Partial) => {}
                    Err(e) => {
                        return Err(DumpError::Dump(ProtocolError::Parse(e.to_string())));
                    }
                }
            }

            let n = timeout(
                self.config.read_timeout,
                self.stream.read_buf(&mut self.buffer),
            )
            .await
            .map_err(|_| DumpError::Timeout("read timeout".to_string()))?
            .map_err(DumpError::Connection)?;
            if n == 0 {
                return Err(DumpError::Dump(ProtocolError::UnexpectedEof));
            }
        };

        self.buffer.advance(head_len);

        let content_length = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .map(|(_, value)| {
                std::str::from_utf8(value)
                    .ok()
                    .and_then(|text| text.trim().parse::<usize>().ok())
                    .ok_or_else(|| {
                        DumpError::Dump(ProtocolError::ContentLength(
                            String::from_utf8_lossy(value).into_owned(),
                        ))
                    })
            })
            .transpose()?
            .unwrap_or(0);

        while self.buffer.len() < content_length {
            let n = timeout(
                self.config.read_timeout,
                self.stream.read_buf(&mut self.buffer),
            )
            .await
            .map_err(|_| DumpError::Timeout("read timeout".to_string()))?
            .map_err(DumpError::Connection)?;
            if n == 0 {
                return Err(DumpError::Dump(ProtocolError::UnexpectedEof));
            }
        }
        let body = self.buffer.split_to(content_length).to_vec();

        Ok(DumpResponse {
            status,
            headers,
            body,
        })
    }
}
