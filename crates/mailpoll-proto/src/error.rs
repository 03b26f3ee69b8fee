//! Error types for the protocol library.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a POP3 or IMAP server.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server rejected a command (IMAP `NO`, POP3 `-ERR`).
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server did not understand a command (IMAP `BAD`).
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// The requested folder does not exist on the server.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// The server does not offer a capability the session needs.
    #[error("Not supported by server: {0}")]
    NotSupported(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was already closed by a previous call.
    #[error("Connection already closed")]
    Closed,

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if the error means the peer is gone and no further
    /// commands can be exchanged on this connection.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed | Self::Bye(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
