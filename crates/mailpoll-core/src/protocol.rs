//! Protocol variants and consumption policies.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::{Error, Result};

/// Mail retrieval protocol of a polling target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    /// POP3 over plain TCP (optionally upgraded with STLS).
    Pop3,
    /// POP3 over implicit TLS.
    Pop3s,
    /// IMAP over plain TCP (optionally upgraded with STARTTLS).
    Imap,
    /// IMAP over implicit TLS.
    Imaps,
}

impl ProtocolVariant {
    /// All variants, in identifier order.
    pub const ALL: [Self; 4] = [Self::Pop3, Self::Pop3s, Self::Imap, Self::Imaps];

    /// Maps a protocol identifier (`pop3`, `pop3s`, `imap`, `imaps`) to a
    /// variant, ignoring ASCII case. Unknown identifiers yield `None`.
    #[must_use]
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.identifier().eq_ignore_ascii_case(identifier))
    }

    /// Returns the canonical identifier.
    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::Pop3 => "pop3",
            Self::Pop3s => "pop3s",
            Self::Imap => "imap",
            Self::Imaps => "imaps",
        }
    }

    /// Returns true if the connection is TLS from the first byte.
    #[must_use]
    pub const fn implicit_tls(self) -> bool {
        matches!(self, Self::Pop3s | Self::Imaps)
    }

    /// Returns true for the IMAP variants.
    #[must_use]
    pub const fn is_imap(self) -> bool {
        matches!(self, Self::Imap | Self::Imaps)
    }

    /// Returns the port used when the configuration leaves it at 0.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Pop3 => mailpoll_proto::pop3::DEFAULT_PORT,
            Self::Pop3s => mailpoll_proto::pop3::DEFAULT_TLS_PORT,
            Self::Imap => mailpoll_proto::imap::DEFAULT_PORT,
            Self::Imaps => mailpoll_proto::imap::DEFAULT_TLS_PORT,
        }
    }

    /// Returns the consumption policy used unless configured otherwise.
    ///
    /// IMAP marks messages `\Seen`; POP3 has no server-side flags and
    /// deletes consumed messages when the session ends.
    #[must_use]
    pub const fn default_policy(self) -> ConsumePolicy {
        if self.is_imap() {
            ConsumePolicy::MarkSeen
        } else {
            ConsumePolicy::Delete
        }
    }

    /// Returns true if this protocol can apply `policy`.
    #[must_use]
    pub const fn supports(self, policy: ConsumePolicy) -> bool {
        !matches!(
            (self, policy),
            (Self::Pop3 | Self::Pop3s, ConsumePolicy::MarkSeen)
        )
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for ProtocolVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_identifier(s)
            .ok_or_else(|| Error::Configuration(format!("unsupported store protocol: {s:?}")))
    }
}

/// What happens to a message when the cursor hands it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumePolicy {
    /// Set the `\Seen` flag (IMAP only). Only unseen messages are listed.
    MarkSeen,
    /// Flag for deletion; the server removes the message when the session
    /// is closed. Messages already flagged are not listed again.
    Delete,
    /// Leave the message untouched. Every cycle sees every message.
    Leave,
}

impl ConsumePolicy {
    /// Returns the policy name as used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarkSeen => "mark_seen",
            Self::Delete => "delete",
            Self::Leave => "leave",
        }
    }
}

impl fmt::Display for ConsumePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
