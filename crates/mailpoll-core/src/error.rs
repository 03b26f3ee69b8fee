//! Error types for the core library.

use thiserror::Error;

/// Boxed error returned by a message handler in a poll cycle.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while polling a mailbox.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or unsupported configuration: unknown protocol, empty host or
    /// folder, or a consumption policy the protocol cannot honor.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Could not establish an authenticated session.
    #[error("Connection failed: {0}")]
    Connection(#[source] mailpoll_proto::Error),

    /// The configured folder does not exist.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// A store operation failed on an established session.
    ///
    /// The session has already been force-closed; if that close failed too,
    /// its error is kept as secondary context.
    #[error("Protocol error: {source}")]
    Protocol {
        /// The failure that aborted the operation.
        source: mailpoll_proto::Error,
        /// Failure from the forced close that followed, if any.
        close_error: Option<mailpoll_proto::Error>,
    },

    /// Releasing the store failed.
    #[error("Error closing mail store: {0}")]
    Close(#[source] mailpoll_proto::Error),

    /// `next()` was called after the snapshot was fully consumed.
    #[error("No more messages: all {0} messages in the snapshot were consumed")]
    Exhausted(usize),

    /// The cursor is not in a state that allows the operation.
    #[error("Invalid cursor state: {0}")]
    InvalidState(String),

    /// The operation is not supported by the cursor.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A message handler rejected a delivered message.
    #[error("Message handler failed: {0}")]
    Handler(#[source] HandlerError),
}

impl Error {
    /// Returns the close failure recorded alongside a protocol error.
    #[must_use]
    pub const fn close_error(&self) -> Option<&mailpoll_proto::Error> {
        match self {
            Self::Protocol {
                close_error: Some(e),
                ..
            } => Some(e),
            _ => None,
        }
    }

    /// Returns true for errors a later poll cycle may not hit again.
    ///
    /// Configuration and cursor-misuse errors are permanent.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Protocol { .. } | Self::Close(_) | Self::Handler(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
