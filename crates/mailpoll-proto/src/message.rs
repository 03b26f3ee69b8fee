//! Protocol-neutral message types.

use bytes::Bytes;

/// Reference to a message captured when the folder listing was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// IMAP UID, or POP3 message number.
    pub id: u32,
    /// Size in octets, when the listing reports it.
    pub size: Option<u64>,
}

impl MessageRef {
    /// Creates a reference with no size information.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self { id, size: None }
    }

    /// Creates a reference carrying the listed size.
    #[must_use]
    pub const fn with_size(id: u32, size: u64) -> Self {
        Self {
            id,
            size: Some(size),
        }
    }
}

/// A retrieved message: its reference plus the raw RFC 5322 octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Where the message came from.
    pub reference: MessageRef,
    /// Unparsed message content.
    pub raw: Bytes,
}

impl Message {
    /// Creates a message from its reference and content.
    #[must_use]
    pub fn new(reference: MessageRef, raw: impl Into<Bytes>) -> Self {
        Self {
            reference,
            raw: raw.into(),
        }
    }

    /// Returns the message identifier (IMAP UID or POP3 number).
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.reference.id
    }

    /// Returns the content length in octets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if the message has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}
