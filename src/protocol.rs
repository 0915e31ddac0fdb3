//! HTTP request reading and wire-format dumping
//!
//! Requests are parsed incrementally with `httparse` over a growing buffer,
//! then captured whole (request line, headers in arrival order, body) so
//! the same bytes can serve as both the log line and the response body.
//! Framing is `Content-Length` based; a missing header means an empty body.

use bytes::{Buf, BytesMut};
use http::StatusCode;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Header slots handed to httparse; requests with more headers fail the dump
const MAX_HEADERS: usize = 64;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed request: {0}")]
    Parse(String),
    #[error("invalid Content-Length: {0:?}")]
    ContentLength(String),
    #[error("connection closed before the request was complete")]
    UnexpectedEof,
}

/// One fully read HTTP request in owned form.
///
/// Owning the bytes is what keeps the body available for the client after it
/// has been logged; nothing is consumed destructively.
#[derive(Debug, Clone)]
pub struct DumpedRequest {
    pub method: String,
    pub path: String,
    /// HTTP minor version as parsed (0 for HTTP/1.0, 1 for HTTP/1.1)
    pub minor_version: u8,
    /// Headers in arrival order; values kept as the raw bytes received
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl DumpedRequest {
    /// Serializes the request back to standard wire-format text: request
    /// line, headers section, blank line, body.
    pub fn to_wire(&self) -> Vec<u8> {
        let request_line = format!(
            "{} {} HTTP/1.{}\r\n",
            self.method, self.path, self.minor_version
        );

        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.len() + value.len() + 4)
            .sum();
        let mut out =
            Vec::with_capacity(request_line.len() + header_bytes + 2 + self.body.len());

        out.extend_from_slice(request_line.as_bytes());
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Incremental request reader over any async byte stream.
///
/// Bytes past the end of one request stay buffered for the next call, which
/// is what keeps pipelined and keep-alive connections framed correctly.
pub struct RequestReader<R> {
    stream: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Waits for the first byte of the next request.
    ///
    /// Returns `Ok(true)` once data is buffered and `Ok(false)` on a clean
    /// end-of-stream. Lets callers park on an idle connection without
    /// committing to a request read, so shutdown can close idle connections
    /// while letting started requests finish.
    pub async fn wait_for_data(&mut self) -> Result<bool, ProtocolError> {
        if !self.buffer.is_empty() {
            return Ok(true);
        }
        let n = self.stream.read_buf(&mut self.buffer).await?;
        Ok(n > 0)
    }

    /// Reads the next request off the connection.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream at a request boundary;
    /// EOF mid-request is [`ProtocolError::UnexpectedEof`].
    pub async fn next_request(&mut self) -> Result<Option<DumpedRequest>, ProtocolError> {
        let (head_len, mut request) = loop {
            if !self.buffer.is_empty() {
                let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
                let mut parsed = httparse::Request::new(&mut headers);
                match parsed.parse(&self.buffer) {
                    Ok(httparse::Status::Complete(head_len)) => {
                        let method = parsed
                            .method
                            .ok_or_else(|| ProtocolError::Parse("missing method".to_string()))?
                            .to_string();
                        let path = parsed
                            .path
                            .ok_or_else(|| ProtocolError::Parse("missing path".to_string()))?
                            .to_string();
                        let minor_version = parsed
                            .version
                            .ok_or_else(|| ProtocolError::Parse("missing version".to_string()))?;
                        let headers = parsed
                            .headers
                            .iter()
                            .map(|h| (h.name.to_string(), h.value.to_vec()))
                            .collect();

                        break (
                            head_len,
                            DumpedRequest {
                                method,
                                path,
                                minor_version,
                                headers,
                                body: Vec::new(),
                            },
                        );
                    }
                    Ok(httparse::Status::Partial) => {}
                    Err(e) => return Err(ProtocolError::Parse(e.to_string())),
                }
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::UnexpectedEof);
            }
        };

        self.buffer.advance(head_len);

        let content_length = content_length_of(&request.headers)?;
        while self.buffer.len() < content_length {
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(ProtocolError::UnexpectedEof);
            }
        }
        request.body = self.buffer.split_to(content_length).to_vec();

        Ok(Some(request))
    }
}

fn content_length_of(headers: &[(String, Vec<u8>)]) -> Result<usize, ProtocolError> {
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("content-length") {
            let text = std::str::from_utf8(value).map_err(|_| {
                ProtocolError::ContentLength(String::from_utf8_lossy(value).into_owned())
            })?;
            return text
                .trim()
                .parse::<usize>()
                .map_err(|_| ProtocolError::ContentLength(text.to_string()));
        }
    }
    Ok(0)
}

/// Serializes a response carrying `body` with the given status code.
///
/// Only the status line and `Content-Length` are emitted; nothing else is
/// added to the echoed bytes.
pub fn encode_response(status: StatusCode, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len()
    );

    let mut out = Vec::with_capacity(head.len() + body.len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn reader_for(input: &[u8]) -> RequestReader<tokio::io::DuplexStream> {
        let (mut tx, rx) = tokio::io::duplex(64 * 1024);
        tx.write_all(input).await.unwrap();
        tx.shutdown().await.unwrap();
        drop(tx);
        RequestReader::new(rx)
    }

    #[tokio::test]
    async fn parses_request_without_body() {
        let raw = b"GET /foo HTTP/1.1\r\nHost: localhost\r\nX-Test: 1\r\n\r\n";
        let mut reader = reader_for(raw).await;

        let request = reader.next_request().await.unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/foo");
        assert_eq!(request.minor_version, 1);
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.headers[1].0, "X-Test");
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn wire_form_round_trips_byte_for_byte() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let mut reader = reader_for(raw).await;

        let request = reader.next_request().await.unwrap().unwrap();
        assert_eq!(request.body, b"hello");
        assert_eq!(request.to_wire(), raw.to_vec());
    }

    #[tokio::test]
    async fn head_split_across_reads_is_reassembled() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut reader = RequestReader::new(rx);

        let writer = tokio::spawn(async move {
            tx.write_all(b"GET /split HTT").await.unwrap();
            tx.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tx.write_all(b"P/1.1\r\nHost: x\r\n\r\n").await.unwrap();
            tx.shutdown().await.unwrap();
        });

        let request = reader.next_request().await.unwrap().unwrap();
        assert_eq!(request.path, "/split");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn two_requests_on_one_connection() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\n\r\n";
        let mut reader = reader_for(raw).await;

        let first = reader.next_request().await.unwrap().unwrap();
        assert_eq!(first.path, "/a");
        assert_eq!(first.body, b"abc");

        let second = reader.next_request().await.unwrap().unwrap();
        assert_eq!(second.path, "/b");
        assert!(second.body.is_empty());

        assert!(reader.next_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let mut reader = reader_for(b"").await;
        assert!(reader.next_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wait_for_data_distinguishes_data_from_eof() {
        let mut reader = reader_for(b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(reader.wait_for_data().await.unwrap());
        assert!(reader.next_request().await.unwrap().is_some());
        assert!(!reader.wait_for_data().await.unwrap());
    }

    #[tokio::test]
    async fn truncated_body_is_unexpected_eof() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort";
        let mut reader = reader_for(raw).await;
        let err = reader.next_request().await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedEof));
    }

    #[tokio::test]
    async fn non_numeric_content_length_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
        let mut reader = reader_for(raw).await;
        let err = reader.next_request().await.unwrap_err();
        assert!(matches!(err, ProtocolError::ContentLength(_)));
        assert!(err.to_string().contains("lots"));
    }

    #[tokio::test]
    async fn garbage_head_is_a_parse_error() {
        let mut reader = reader_for(b"\x01\x02\x03 nonsense\r\n\r\n").await;
        let err = reader.next_request().await.unwrap_err();
        assert!(matches!(err, ProtocolError::Parse(_)));
    }

    #[test]
    fn response_carries_status_line_and_content_length() {
        let encoded = encode_response(StatusCode::NOT_FOUND, b"body");
        let text = String::from_utf8(encoded).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\nbody"));
    }

    #[test]
    fn header_order_is_preserved_in_wire_form() {
        let request = DumpedRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            minor_version: 1,
            headers: vec![
                ("Zeta".to_string(), b"1".to_vec()),
                ("Alpha".to_string(), b"2".to_vec()),
            ],
            body: Vec::new(),
        };
        let text = String::from_utf8(request.to_wire()).unwrap();
        assert!(text.find("Zeta").unwrap() < text.find("Alpha").unwrap());
    }
}
