//! Framed I/O for the line-oriented mail protocols.
//!
//! Both POP3 and IMAP use CRLF-terminated lines. IMAP responses may embed
//! literals (`{n}\r\n<n bytes>`), and POP3 multi-line responses end with a
//! lone `.` line and dot-stuff any line that starts with a dot.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal or multi-line body size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Buffered connection speaking a CRLF line protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    trace: bool,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            trace: false,
        }
    }

    /// Enables or disables wire tracing.
    #[must_use]
    pub const fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Returns true if wire tracing is enabled.
    #[must_use]
    pub const fn trace_enabled(&self) -> bool {
        self.trace
    }

    /// Reads a complete IMAP response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            if let Some(literal_len) = parse_literal_length(&line) {
                if literal_len > MAX_LITERAL_SIZE {
                    return Err(Error::Protocol(format!(
                        "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                    )));
                }
                let mut literal = vec![0u8; literal_len];
                self.reader.read_exact(&mut literal).await?;
                if self.trace {
                    trace!(target: "mailpoll_proto::wire", "S: <{literal_len} literal bytes>");
                }
                response.extend_from_slice(&literal);
            } else {
                break;
            }
        }

        Ok(response)
    }

    /// Reads a POP3 multi-line body up to the terminating `.` line.
    ///
    /// Returned data has the terminator removed and dot-stuffing undone;
    /// line endings are preserved as CRLF.
    pub async fn read_multiline(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();

        loop {
            let line = self.read_line().await?;
            if line == b".\r\n" {
                break;
            }

            let content = line.strip_prefix(b".").unwrap_or(&line);
            body.extend_from_slice(content);

            if body.len() > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "multi-line response too large (max {MAX_LITERAL_SIZE} bytes)"
                )));
            }
        }

        Ok(body)
    }

    /// Reads a single CRLF-terminated line, CRLF included.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            // A CRLF may straddle two reads, so scan for LF and check the byte before it.
            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buf[..=pos]);
                self.reader.consume(pos + 1);
                if line.ends_with(b"\r\n") {
                    break;
                }
            } else {
                let len = buf.len();
                line.extend_from_slice(buf);
                self.reader.consume(len);
            }

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        if self.trace {
            trace!(
                target: "mailpoll_proto::wire",
                "S: {}",
                String::from_utf8_lossy(&line).trim_end()
            );
        }

        Ok(line)
    }

    /// Writes a command to the stream.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        if self.trace {
            trace!(
                target: "mailpoll_proto::wire",
                "C: {}",
                String::from_utf8_lossy(data).trim_end()
            );
        }
        self.send(data).await
    }

    /// Writes a command carrying credentials, tracing `shown` instead.
    pub async fn write_sensitive(&mut self, data: &[u8], shown: &str) -> Result<()> {
        if self.trace {
            trace!(target: "mailpoll_proto::wire", "C: {shown}");
        }
        self.send(data).await
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Shuts down the write half without any protocol exchange.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Rejects a command argument that would end the command line early.
pub(crate) fn check_argument(name: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(Error::Protocol(format!("{name} contains CR, LF or NUL")));
    }
    Ok(())
}

/// Parses a literal length from the end of a line.
///
/// Matches patterns like `{123}\r\n` or `{123+}\r\n` (non-synchronizing).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    let inner = line[open + 1..].strip_suffix(b"}")?;
    let digits = inner.strip_suffix(b"+").unwrap_or(inner);

    std::str::from_utf8(digits).ok()?.parse().ok()
}
