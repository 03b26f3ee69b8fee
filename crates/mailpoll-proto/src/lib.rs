//! # mailpoll-proto
//!
//! Async POP3 and IMAP clients covering what a mailbox poll needs:
//! connect (plain, implicit TLS, or STARTTLS/STLS upgrade), authenticate,
//! open a folder, list pending messages, fetch one, mark it consumed and
//! close the session either gracefully or by dropping the connection.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use mailpoll_proto::{imap::ImapClient, stream};
//!
//! #[tokio::main]
//! async fn main() -> mailpoll_proto::Result<()> {
//!     let tcp = stream::connect_tls("imap.example.com", 993, Duration::from_secs(30)).await?;
//!     let mut client = ImapClient::from_stream(tcp, false).await?;
//!     client.login("user@example.com", "password").await?;
//!     client.select("INBOX").await?;
//!     for uid in client.uid_search("UNSEEN").await? {
//!         let raw = client.uid_fetch_body(uid).await?;
//!         println!("{uid}: {} bytes", raw.len());
//!     }
//!     client.logout().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`imap`]: IMAP4rev1 client subset
//! - [`pop3`]: POP3 client
//! - [`stream`]: plaintext/TLS transport
//! - [`framed`]: CRLF framing, literals and dot-terminated bodies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod framed;
pub mod imap;
mod message;
pub mod pop3;
pub mod stream;

pub use error::{Error, Result};
pub use framed::FramedStream;
pub use imap::ImapClient;
pub use message::{Message, MessageRef};
pub use pop3::Pop3Client;
pub use stream::MailStream;
