//! POP3 client for the polling session (RFC 1939, STLS from RFC 2595).
//!
//! POP3 has a single mailbox per account, exposed as `INBOX`. Deletions
//! marked with DELE are committed only when the session ends with QUIT;
//! dropping the connection instead leaves every message in place.

#![allow(clippy::missing_errors_doc)]

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::framed::{FramedStream, check_argument};
use crate::stream::MailStream;
use crate::{Error, Result};

/// Default POP3 port (plain or STLS).
pub const DEFAULT_PORT: u16 = 110;

/// Default POP3S port (implicit TLS).
pub const DEFAULT_TLS_PORT: u16 = 995;

/// Name of the only folder a POP3 account has.
pub const INBOX: &str = "INBOX";

/// One entry of a LIST response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    /// Message number within this session.
    pub number: u32,
    /// Size in octets.
    pub size: u64,
}

/// POP3 client connection.
pub struct Pop3Client<S> {
    stream: FramedStream<S>,
    closed: bool,
}

impl<S> std::fmt::Debug for Pop3Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pop3Client")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S> Pop3Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the greeting.
    pub async fn from_stream(stream: S, trace: bool) -> Result<Self> {
        let mut client = Self {
            stream: FramedStream::new(stream).with_trace(trace),
            closed: false,
        };
        client.read_status().await?;
        Ok(client)
    }

    /// Returns true once the session has ended.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Authenticates with USER and PASS.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        check_argument("username", username)?;
        check_argument("password", password)?;

        let user = format!("USER {username}\r\n");
        self.command(user.as_bytes(), None)
            .await
            .map_err(into_auth)?;

        let pass = format!("PASS {password}\r\n");
        self.command(pass.as_bytes(), Some("PASS <redacted>"))
            .await
            .map_err(into_auth)?;
        Ok(())
    }

    /// Lists message numbers and sizes in server order.
    pub async fn list(&mut self) -> Result<Vec<ListEntry>> {
        self.command(b"LIST\r\n", None).await?;
        let body = self.read_body().await?;

        String::from_utf8_lossy(&body)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_list_entry)
            .collect()
    }

    /// Retrieves a message. RETR does not change the message state.
    pub async fn retr(&mut self, number: u32) -> Result<Bytes> {
        let cmd = format!("RETR {number}\r\n");
        self.command(cmd.as_bytes(), None).await?;
        Ok(Bytes::from(self.read_body().await?))
    }

    /// Marks a message for deletion at the end of the session.
    pub async fn dele(&mut self, number: u32) -> Result<()> {
        let cmd = format!("DELE {number}\r\n");
        self.command(cmd.as_bytes(), None).await?;
        Ok(())
    }

    /// Ends the session, committing deletions, and shuts the stream down.
    pub async fn quit(&mut self) -> Result<()> {
        let result = self.command(b"QUIT\r\n", None).await.map(|_| ());
        self.closed = true;
        // The server closes its side after +OK.
        let _ = self.stream.shutdown().await;
        result
    }

    /// Shuts the connection down without QUIT; pending deletions are dropped.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await
    }

    /// Sends a command and checks its status line, returning the status text.
    async fn command(&mut self, cmd: &[u8], shown: Option<&str>) -> Result<String> {
        if self.closed {
            return Err(Error::Closed);
        }

        let sent = match shown {
            Some(shown) => self.stream.write_sensitive(cmd, shown).await,
            None => self.stream.write_command(cmd).await,
        };
        let result = match sent {
            Ok(()) => self.read_status().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result
            && e.is_disconnect()
        {
            self.closed = true;
        }
        result
    }

    async fn read_status(&mut self) -> Result<String> {
        let line = self.stream.read_line().await?;
        let text = String::from_utf8_lossy(&line).trim_end().to_string();

        if let Some(rest) = text.strip_prefix("+OK") {
            Ok(rest.trim_start().to_string())
        } else if let Some(rest) = text.strip_prefix("-ERR") {
            Err(Error::No(rest.trim_start().to_string()))
        } else {
            Err(Error::Protocol(format!("unexpected POP3 response: {text}")))
        }
    }

    async fn read_body(&mut self) -> Result<Vec<u8>> {
        let body = self.stream.read_multiline().await;
        if let Err(e) = &body
            && e.is_disconnect()
        {
            self.closed = true;
        }
        body
    }
}

impl Pop3Client<MailStream> {
    /// Upgrades the connection with STLS.
    pub async fn stls(mut self, host: &str) -> Result<Self> {
        match self.command(b"STLS\r\n", None).await {
            Ok(_) => {}
            Err(Error::No(text)) => return Err(Error::NotSupported(format!("STLS: {text}"))),
            Err(e) => return Err(e),
        }

        let trace = self.stream.trace_enabled();
        let stream = self.stream.into_inner().upgrade_to_tls(host).await?;
        Ok(Self {
            stream: FramedStream::new(stream).with_trace(trace),
            closed: false,
        })
    }
}

fn into_auth(e: Error) -> Error {
    match e {
        Error::No(text) => Error::Auth(text),
        other => other,
    }
}

fn parse_list_entry(line: &str) -> Result<ListEntry> {
    let mut parts = line.split_whitespace();
    let number = parts.next().and_then(|n| n.parse().ok());
    let size = parts.next().and_then(|s| s.parse().ok());

    match (number, size) {
        (Some(number), Some(size)) => Ok(ListEntry { number, size }),
        _ => Err(Error::Protocol(format!("malformed LIST entry: {line}"))),
    }
}
