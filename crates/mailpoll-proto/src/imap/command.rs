//! IMAP commands used by the polling session.

use std::sync::atomic::{AtomicU32, Ordering};

use base64::Engine;
use base64::alphabet::IMAP_MUTF7;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};

/// Base64 variant used inside modified UTF-7 (`,` for `/`, no padding).
const MUTF7: GeneralPurpose = GeneralPurpose::new(&IMAP_MUTF7, NO_PAD);

/// Tag generator for IMAP commands.
///
/// Generates sequential tags in the format "A0000", "A0001", etc.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(0),
            prefix,
        }
    }

    /// Generates the next tag. Wraps after `u32::MAX` tags.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{:04}", self.prefix, n)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

/// Flag update applied by `UID STORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagUpdate {
    /// Add `\Seen`.
    Seen,
    /// Add `\Deleted`.
    Deleted,
}

impl FlagUpdate {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
        }
    }
}

/// An IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY.
    Capability,
    /// STARTTLS.
    StartTls,
    /// LOGIN with plaintext credentials.
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT a mailbox read-write.
    Select {
        /// Mailbox name in UTF-8; sent in modified UTF-7.
        mailbox: String,
    },
    /// UID SEARCH with a raw criteria string.
    UidSearch {
        /// Search criteria, e.g. `UNSEEN`.
        criteria: &'static str,
    },
    /// UID FETCH of the full message without setting `\Seen`.
    UidFetchBody {
        /// Message UID.
        uid: u32,
    },
    /// UID STORE adding a flag silently.
    UidStore {
        /// Message UID.
        uid: u32,
        /// Flag to add.
        flag: FlagUpdate,
    },
    /// CLOSE the selected mailbox, expunging `\Deleted` messages.
    Close,
    /// LOGOUT.
    Logout,
}

impl Command {
    /// Serializes the command with the given tag, CRLF included.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, &encode_mailbox(mailbox));
            }
            Self::UidSearch { criteria } => {
                buf.extend_from_slice(b"UID SEARCH ");
                buf.extend_from_slice(criteria.as_bytes());
            }
            Self::UidFetchBody { uid } => {
                buf.extend_from_slice(format!("UID FETCH {uid} (UID BODY.PEEK[])").as_bytes());
            }
            Self::UidStore { uid, flag } => {
                buf.extend_from_slice(
                    format!("UID STORE {uid} +FLAGS.SILENT ({})", flag.as_str()).as_bytes(),
                );
            }
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the form of the command that is safe to log.
    #[must_use]
    pub fn redacted(&self, tag: &str) -> Option<String> {
        match self {
            Self::Login { username, .. } => Some(format!("{tag} LOGIN {username} <redacted>")),
            _ => None,
        }
    }
}

/// Encodes a mailbox name in modified UTF-7 (RFC 3501 section 5.1.3).
///
/// Printable ASCII stands for itself, `&` becomes `&-`, and every other run
/// of characters is sent as `&` + base64 of its UTF-16BE form + `-`. Control
/// characters fall in the encoded runs, so the result never breaks a line.
#[must_use]
pub fn encode_mailbox(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut run: Vec<u16> = Vec::new();

    for c in name.chars() {
        if matches!(c, ' '..='~') {
            flush_run(&mut out, &mut run);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            let mut units = [0u16; 2];
            run.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut Vec<u16>) {
    if run.is_empty() {
        return;
    }
    let bytes: Vec<u8> = run.iter().flat_map(|unit| unit.to_be_bytes()).collect();
    out.push('&');
    out.push_str(&MUTF7.encode(bytes));
    out.push('-');
    run.clear();
}

/// Writes an astring, quoting when needed.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns true if the byte cannot appear in an atom.
const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_sequential() {
        let tags = TagGenerator::default();
        assert_eq!(tags.next(), "A0000");
        assert_eq!(tags.next(), "A0001");
    }

    #[test]
    fn test_login_quotes_credentials() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "p a\"ss".to_string(),
        };
        assert_eq!(
            cmd.serialize("A0001"),
            b"A0001 LOGIN user@example.com \"p a\\\"ss\"\r\n"
        );
    }

    #[test]
    fn test_login_redaction_hides_password() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "secret".to_string(),
        };
        let shown = cmd.redacted("A0001").unwrap();
        assert!(!shown.contains("secret"));
        assert!(Command::Logout.redacted("A0002").is_none());
    }

    #[test]
    fn test_select_quotes_spaces() {
        let cmd = Command::Select {
            mailbox: "Old Mail".to_string(),
        };
        assert_eq!(cmd.serialize("A0002"), b"A0002 SELECT \"Old Mail\"\r\n");
    }

    #[test]
    fn test_mailbox_names_use_modified_utf7() {
        assert_eq!(encode_mailbox("INBOX"), "INBOX");
        assert_eq!(encode_mailbox("Entwürfe"), "Entw&APw-rfe");
        assert_eq!(encode_mailbox("Tom & Jerry"), "Tom &- Jerry");
        assert_eq!(encode_mailbox("台北"), "&U,BTFw-");
        assert_eq!(encode_mailbox("~peter/mail/台北/日本語"), "~peter/mail/&U,BTFw-/&ZeVnLIqe-");
    }

    #[test]
    fn test_select_encodes_mailbox() {
        let cmd = Command::Select {
            mailbox: "Entwürfe".to_string(),
        };
        assert_eq!(cmd.serialize("A0003"), b"A0003 SELECT Entw&APw-rfe\r\n");

        let cmd = Command::Select {
            mailbox: "INBOX\r\nA9 DELETE Sent".to_string(),
        };
        let line = cmd.serialize("A0004");
        assert!(!line[..line.len() - 2].contains(&b'\n'));
        assert!(!line[..line.len() - 2].contains(&b'\r'));
    }

    #[test]
    fn test_uid_commands() {
        assert_eq!(
            Command::UidSearch { criteria: "UNSEEN" }.serialize("A0003"),
            b"A0003 UID SEARCH UNSEEN\r\n"
        );
        assert_eq!(
            Command::UidFetchBody { uid: 42 }.serialize("A0004"),
            b"A0004 UID FETCH 42 (UID BODY.PEEK[])\r\n"
        );
        assert_eq!(
            Command::UidStore {
                uid: 42,
                flag: FlagUpdate::Seen
            }
            .serialize("A0005"),
            b"A0005 UID STORE 42 +FLAGS.SILENT (\\Seen)\r\n"
        );
    }
}
