//! Log output configuration
//!
//! Both output modes write one line per event with no timestamp, level, or
//! target prefix. The structured mode additionally routes every formatted
//! line through [`StructuredWriter`], which wraps it as a JSON object before
//! it reaches stdout.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

/// One structured log line: the formatted message and its generation time.
#[derive(Debug, Serialize)]
struct LogRecord<'a> {
    message: &'a str,
    timestamp: String,
}

/// Installs the global tracing subscriber.
///
/// Called exactly once at startup, before the listener opens; the log
/// destination is process-wide and never reassigned afterwards. The filter
/// honors `RUST_LOG` and defaults to `dumpsrv=info`.
pub fn init(structured: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dumpsrv=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .without_time();

    if structured {
        builder
            .with_writer(|| StructuredWriter::new(io::stdout()))
            .init();
    } else {
        builder.init();
    }
}

/// Writer adapter that encodes each formatted log line as a JSON object
/// with `message` and `timestamp` fields.
///
/// Every `write` call receives one complete formatted event and emits one
/// complete JSON line. Concurrent callers go through stdout's internal lock,
/// so lines never interleave partially.
pub struct StructuredWriter<W: Write> {
    inner: W,
}

impl<W: Write> StructuredWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for StructuredWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let message = String::from_utf8_lossy(buf);
        let record = LogRecord {
            message: message.trim_end_matches('\n'),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.inner.write_all(&line)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_line(input: &[u8]) -> String {
        let mut out = Vec::new();
        let mut writer = StructuredWriter::new(&mut out);
        let n = writer.write(input).unwrap();
        assert_eq!(n, input.len());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn wraps_formatted_line_as_json() {
        let output = write_line(b"GET /foo HTTP/1.1\r\nX-Test: 1\r\n\r\n\n");
        assert!(output.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        let message = value["message"].as_str().unwrap();
        assert_eq!(message, "GET /foo HTTP/1.1\r\nX-Test: 1\r\n\r\n");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn timestamp_parses_as_rfc3339_with_nanoseconds() {
        let output = write_line(b"hello\n");
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        let timestamp = value["timestamp"].as_str().unwrap();

        chrono::DateTime::parse_from_rfc3339(timestamp).unwrap();
        let fraction = timestamp.split('.').nth(1).unwrap();
        assert_eq!(fraction.trim_end_matches(['Z', '+']).len(), 9);
    }

    #[test]
    fn each_write_emits_exactly_one_line() {
        let mut out = Vec::new();
        let mut writer = StructuredWriter::new(&mut out);
        writer.write(b"first\n").unwrap();
        writer.write(b"second\n").unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn interior_newlines_are_escaped() {
        let output = write_line(b"line one\nline two\n");
        // One physical line on the wire, newline escaped inside the JSON string
        assert_eq!(output.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["message"].as_str().unwrap(), "line one\nline two");
    }
}
