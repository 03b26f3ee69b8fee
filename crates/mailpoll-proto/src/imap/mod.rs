//! IMAP client for the polling session.
//!
//! Covers the commands a poll needs: STARTTLS, LOGIN, SELECT, UID SEARCH,
//! UID FETCH, UID STORE, CLOSE and LOGOUT. Messages are addressed by UID so
//! expunges from other sessions cannot shift the snapshot.

#![allow(clippy::missing_errors_doc)]

mod command;
mod response;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

pub use self::command::{Command, FlagUpdate, TagGenerator, encode_mailbox, write_astring};
pub use self::response::Status;
use self::response::{
    extract_body, has_read_only_code, parse_capabilities, parse_exists, parse_search,
    parse_tagged, parse_untagged_status,
};
use crate::framed::{FramedStream, check_argument};
use crate::stream::MailStream;
use crate::{Error, Result};

/// Default IMAP port (plain or STARTTLS).
pub const DEFAULT_PORT: u16 = 143;

/// Default IMAPS port (implicit TLS).
pub const DEFAULT_TLS_PORT: u16 = 993;

/// Mailbox state reported by SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Whether the server only granted read-only access.
    pub read_only: bool,
}

/// IMAP client connection.
pub struct ImapClient<S> {
    stream: FramedStream<S>,
    tag_gen: TagGenerator,
    capabilities: Vec<String>,
    closed: bool,
}

impl<S> std::fmt::Debug for ImapClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapClient")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S> ImapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the greeting.
    pub async fn from_stream(stream: S, trace: bool) -> Result<Self> {
        let mut framed = FramedStream::new(stream).with_trace(trace);

        let greeting = framed.read_response().await?;
        let capabilities = parse_capabilities(&greeting).unwrap_or_default();
        match parse_untagged_status(&greeting) {
            Some((Status::Ok | Status::PreAuth, _)) => {}
            Some((Status::Bye, text)) => return Err(Error::Bye(text.to_string())),
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected IMAP greeting: {}",
                    String::from_utf8_lossy(&greeting).trim_end()
                )));
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            closed: false,
        })
    }

    /// Returns true once the connection has been logged out or shut down.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the capabilities last advertised by the server.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Checks if the server advertised a capability (case-insensitive).
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Sends CAPABILITY and stores the result.
    pub async fn capability(&mut self) -> Result<&[String]> {
        let responses = self.run(&Command::Capability).await?;
        if let Some(caps) = responses.iter().find_map(|r| parse_capabilities(r)) {
            self.capabilities = caps;
        }
        Ok(&self.capabilities)
    }

    /// Authenticates with LOGIN.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        check_argument("username", username)?;
        check_argument("password", password)?;
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if self.has_capability("LOGINDISABLED") {
            return Err(Error::NotSupported(
                "LOGIN is disabled on this connection".to_string(),
            ));
        }

        let cmd = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let responses = match self.run(&cmd).await {
            Ok(responses) => responses,
            Err(Error::No(text) | Error::Bad(text)) => return Err(Error::Auth(text)),
            Err(e) => return Err(e),
        };

        // Servers often advertise new capabilities after login.
        if let Some(caps) = responses.iter().find_map(|r| parse_capabilities(r)) {
            self.capabilities = caps;
        }
        Ok(())
    }

    /// Selects a mailbox for read-write access.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        let cmd = Command::Select {
            mailbox: mailbox.to_string(),
        };
        let responses = match self.run(&cmd).await {
            Ok(responses) => responses,
            Err(Error::No(_)) => return Err(Error::FolderNotFound(mailbox.to_string())),
            Err(e) => return Err(e),
        };

        let mut status = MailboxStatus::default();
        for response in &responses {
            if let Some(exists) = parse_exists(response) {
                status.exists = exists;
            }
            if has_read_only_code(response) {
                status.read_only = true;
            }
        }
        debug!(mailbox, exists = status.exists, "Selected mailbox");
        Ok(status)
    }

    /// Runs `UID SEARCH` and returns UIDs in server order.
    pub async fn uid_search(&mut self, criteria: &'static str) -> Result<Vec<u32>> {
        let responses = self.run(&Command::UidSearch { criteria }).await?;
        Ok(responses
            .iter()
            .filter_map(|r| parse_search(r))
            .flatten()
            .collect())
    }

    /// Fetches the full message with `BODY.PEEK[]`, leaving flags untouched.
    pub async fn uid_fetch_body(&mut self, uid: u32) -> Result<Bytes> {
        let responses = self.run(&Command::UidFetchBody { uid }).await?;
        responses
            .iter()
            .find_map(|r| extract_body(r))
            .ok_or_else(|| Error::No(format!("message UID {uid} is no longer available")))
    }

    /// Adds a flag to a message without requesting the updated flags.
    pub async fn uid_store(&mut self, uid: u32, flag: FlagUpdate) -> Result<()> {
        self.run(&Command::UidStore { uid, flag }).await?;
        Ok(())
    }

    /// Closes the selected mailbox, expunging `\Deleted` messages.
    pub async fn close_mailbox(&mut self) -> Result<()> {
        self.run(&Command::Close).await?;
        Ok(())
    }

    /// Logs out and shuts the connection down.
    ///
    /// The server answers LOGOUT with BYE; a connection that drops before
    /// the tagged OK still counts as logged out.
    pub async fn logout(&mut self) -> Result<()> {
        let result = match self.run(&Command::Logout).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_disconnect() => Ok(()),
            Err(e) => Err(e),
        };
        self.closed = true;
        // The peer may already have hung up after BYE.
        let _ = self.stream.shutdown().await;
        result
    }

    /// Shuts the connection down without a protocol exchange.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await
    }

    /// Sends a command and reads responses up to its tagged completion.
    ///
    /// Returns all responses (tagged line last) when the status is OK.
    async fn run(&mut self, cmd: &Command) -> Result<Vec<Vec<u8>>> {
        if self.closed {
            return Err(Error::Closed);
        }

        let tag = self.tag_gen.next();
        let bytes = cmd.serialize(&tag);
        let sent = match cmd.redacted(&tag) {
            Some(shown) => self.stream.write_sensitive(&bytes, &shown).await,
            None => self.stream.write_command(&bytes).await,
        };

        let result = match sent {
            Ok(()) => self.read_until_tagged(&tag).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result
            && e.is_disconnect()
        {
            self.closed = true;
        }
        result
    }

    async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        let mut bye = None;

        loop {
            let response = match self.stream.read_response().await {
                Ok(response) => response,
                Err(e) if e.is_disconnect() => {
                    return Err(bye.map_or(e, Error::Bye));
                }
                Err(e) => return Err(e),
            };

            if let Some((Status::Bye, text)) = parse_untagged_status(&response) {
                bye = Some(text.to_string());
            }

            if let Some((status, text)) = parse_tagged(&response, tag) {
                let text = text.to_string();
                responses.push(response);
                return match status {
                    Status::Ok | Status::PreAuth => Ok(responses),
                    Status::No => Err(Error::No(text)),
                    Status::Bad => Err(Error::Bad(text)),
                    Status::Bye => Err(Error::Bye(text)),
                };
            }

            responses.push(response);
        }
    }
}

impl ImapClient<MailStream> {
    /// Upgrades the connection with STARTTLS.
    ///
    /// Capabilities are discarded afterwards, as RFC 9051 requires.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if !self.has_capability("STARTTLS") {
            return Err(Error::NotSupported("STARTTLS".to_string()));
        }

        self.run(&Command::StartTls).await?;

        let trace = self.stream.trace_enabled();
        let stream = self.stream.into_inner().upgrade_to_tls(host).await?;
        Ok(Self {
            stream: FramedStream::new(stream).with_trace(trace),
            tag_gen: self.tag_gen,
            capabilities: Vec::new(),
            closed: false,
        })
    }
}
