//! Mailbox cursor: one polling cycle over a folder.
//!
//! The cursor connects, opens the configured folder and snapshots the
//! pending messages on [`MailboxCursor::open`], then hands them out one at a
//! time. Each message is marked consumed before [`MailboxCursor::next`]
//! returns it, so a crash after delivery may lose a message but the mailbox
//! never delivers it twice.
//!
//! ```text
//! Unopened --open--> Open --next--> Exhausted
//!     |               |                |
//!     |            failure             |
//!     |               v                |
//!     +---------->  Failed             |
//!                     |                |
//!                   close            close
//!                     v                v
//!                  Closed <------------+
//! ```

use std::fmt;

use mailpoll_proto::{Message, MessageRef};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connector::{Backend, StoreConnector};
use crate::{Error, Result};

/// Lifecycle state of a [`MailboxCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorState {
    /// Created, not yet opened.
    Unopened,
    /// Connected with messages left to consume.
    Open,
    /// Connected and every message in the snapshot was consumed.
    Exhausted,
    /// An operation failed; the connection has been released.
    Failed,
    /// Closed by the caller.
    Closed,
}

impl CursorState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Open => "open",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Session<B: Backend> {
    store: B::Store,
    folder: B::Folder,
}

/// Single-owner cursor over the pending messages of one folder.
///
/// Every successful [`open`](Self::open) must be followed by
/// [`close`](Self::close). Failures inside the cursor release the
/// connection themselves; `close` is then a no-op and may be called any
/// number of times.
pub struct MailboxCursor<B: Backend = StoreConnector> {
    backend: B,
    config: SessionConfig,
    state: CursorState,
    session: Option<Session<B>>,
    snapshot: Vec<MessageRef>,
    position: usize,
}

impl<B: Backend> MailboxCursor<B> {
    /// Creates an unopened cursor.
    #[must_use]
    pub const fn new(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            state: CursorState::Unopened,
            session: None,
            snapshot: Vec::new(),
            position: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Number of messages handed out so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Size of the snapshot taken at open.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Returns true if the snapshot holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Messages not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.snapshot.len().saturating_sub(self.position)
    }

    /// Configuration the cursor was created with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Backend driving the cursor.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Connects, opens the folder and snapshots the pending messages.
    ///
    /// On failure whatever was opened is released and the cursor is left
    /// [`CursorState::Failed`]. If the call is cancelled while connecting or
    /// selecting, partially opened handles are dropped; once the folder is
    /// open the cursor keeps them and a later [`close`](Self::close)
    /// releases them non-gracefully.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the cursor was already opened
    /// - [`Error::Connection`] if connecting or authenticating fails
    /// - [`Error::FolderNotFound`] if the folder does not exist
    /// - [`Error::Protocol`] if opening the folder or listing fails otherwise
    pub async fn open(&mut self) -> Result<()> {
        if self.state != CursorState::Unopened {
            return Err(Error::InvalidState(format!(
                "open() called on a {} cursor",
                self.state
            )));
        }
        self.state = CursorState::Failed;

        let mut store = self
            .backend
            .connect(&self.config)
            .await
            .map_err(Error::Connection)?;

        let folder = match self.backend.open_folder(&mut store, self.config.folder()).await {
            Ok(folder) => folder,
            Err(mailpoll_proto::Error::FolderNotFound(name)) => {
                self.release(store, None).await;
                return Err(Error::FolderNotFound(name));
            }
            Err(source) => {
                let close_error = self.release(store, None).await;
                return Err(Error::Protocol {
                    source,
                    close_error,
                });
            }
        };

        // From here the handles belong to the cursor, so a cancelled list
        // still leaves them for close().
        let session = self.session.insert(Session { store, folder });
        let listed = self
            .backend
            .list_messages(&mut session.store, &session.folder)
            .await;
        let snapshot = match listed {
            Ok(snapshot) => snapshot,
            Err(source) => {
                let close_error = self.force_close().await;
                return Err(Error::Protocol {
                    source,
                    close_error,
                });
            }
        };

        info!(
            host = self.config.host(),
            folder = self.config.folder(),
            messages = snapshot.len(),
            "Opened mailbox"
        );
        self.state = if snapshot.is_empty() {
            CursorState::Exhausted
        } else {
            CursorState::Open
        };
        self.snapshot = snapshot;
        Ok(())
    }

    /// Returns true while the snapshot has messages left to hand out.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.state == CursorState::Open && self.position < self.snapshot.len()
    }

    /// Fetches the next message, marks it consumed and returns it.
    ///
    /// If fetching or marking fails the message is not returned, the cursor
    /// becomes [`CursorState::Failed`] and its connection is force-closed.
    ///
    /// # Errors
    ///
    /// - [`Error::Exhausted`] once every message was handed out
    /// - [`Error::InvalidState`] if the cursor is not open
    /// - [`Error::Protocol`] if the store operation fails, carrying any
    ///   error from the forced close
    pub async fn next(&mut self) -> Result<Message> {
        match self.state {
            CursorState::Open => {}
            CursorState::Exhausted => return Err(Error::Exhausted(self.snapshot.len())),
            state => {
                return Err(Error::InvalidState(format!(
                    "next() called on a {state} cursor"
                )));
            }
        }

        let Some(&reference) = self.snapshot.get(self.position) else {
            self.state = CursorState::Exhausted;
            return Err(Error::Exhausted(self.snapshot.len()));
        };
        let Some(session) = self.session.as_mut() else {
            return Err(Error::InvalidState("open cursor has no session".into()));
        };

        // Restored below on success; a cancelled call leaves the cursor failed.
        self.state = CursorState::Failed;
        let consumed = match self
            .backend
            .fetch(&mut session.store, &session.folder, reference)
            .await
        {
            Ok(message) => self
                .backend
                .mark_consumed(&mut session.store, &session.folder, reference)
                .await
                .map(|()| message),
            Err(e) => Err(e),
        };

        match consumed {
            Ok(message) => {
                self.position += 1;
                self.state = if self.position < self.snapshot.len() {
                    CursorState::Open
                } else {
                    CursorState::Exhausted
                };
                debug!(
                    id = message.id(),
                    size = message.len(),
                    position = self.position,
                    "Consumed message"
                );
                Ok(message)
            }
            Err(source) => {
                warn!(
                    id = reference.id,
                    error = %source,
                    "Failed to consume message, closing store"
                );
                let close_error = self.force_close().await;
                Err(Error::Protocol {
                    source,
                    close_error,
                })
            }
        }
    }

    /// Always fails: the cursor never removes messages on request.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Unsupported`].
    #[allow(clippy::unused_self)]
    pub const fn remove(&mut self) -> Result<()> {
        Err(Error::Unsupported("remove() on a mailbox cursor"))
    }

    /// Closes the folder and the store.
    ///
    /// The close is graceful when the cursor holds a healthy connection
    /// (open or exhausted). Without live handles this is a no-op, so it is
    /// safe after a failure and safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Close`] if releasing the store fails. The cursor is
    /// closed either way.
    pub async fn close(&mut self) -> Result<()> {
        let graceful = matches!(self.state, CursorState::Open | CursorState::Exhausted);
        let session = self.session.take();
        self.state = CursorState::Closed;

        let Some(Session { store, folder }) = session else {
            return Ok(());
        };

        info!(
            host = self.config.host(),
            folder = self.config.folder(),
            consumed = self.position,
            graceful,
            "Closing mailbox"
        );
        self.backend
            .close(store, Some(folder), graceful)
            .await
            .map_err(Error::Close)
    }

    async fn force_close(&mut self) -> Option<mailpoll_proto::Error> {
        self.state = CursorState::Failed;
        let Session { store, folder } = self.session.take()?;
        self.release(store, Some(folder)).await
    }

    async fn release(
        &self,
        store: B::Store,
        folder: Option<B::Folder>,
    ) -> Option<mailpoll_proto::Error> {
        let error = self.backend.close(store, folder, false).await.err();
        if let Some(e) = &error {
            warn!(error = %e, "Forced close of mail store failed");
        }
        error
    }
}

impl<B: Backend> fmt::Debug for MailboxCursor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCursor")
            .field("host", &self.config.host())
            .field("folder", &self.config.folder())
            .field("state", &self.state)
            .field("position", &self.position)
            .field("len", &self.snapshot.len())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Drop for MailboxCursor<B> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                host = self.config.host(),
                folder = self.config.folder(),
                "Mailbox cursor dropped without close; dropping connection"
            );
        }
    }
}
