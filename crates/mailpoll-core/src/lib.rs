//! # mailpoll-core
//!
//! Mailbox polling over POP3, POP3S, IMAP and IMAPS.
//!
//! A polling cycle connects to a mail store, opens one folder, snapshots
//! the pending messages and hands them out one at a time through a
//! [`MailboxCursor`], marking each message consumed before it is returned.
//! Scheduling cycles, retrying and delivering messages further are left to
//! the caller.
//!
//! This crate provides:
//! - [`SessionConfig`]: validated, immutable connection parameters
//! - [`StoreConnector`]: one connector for all four protocol variants,
//!   driven through the [`Backend`] capability trait
//! - [`MailboxCursor`]: the open, iterate, close state machine
//! - [`for_protocol`] / [`connector_for`]: protocol identifier lookup
//! - [`poll_cycle`]: a complete cycle with guaranteed close
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use mailpoll_core::{SessionConfig, for_protocol, poll_cycle};
//!
//! let config = SessionConfig::builder("mail.example.com")
//!     .credentials("alice", "secret")
//!     .build()?;
//! let mut cursor = for_protocol("imaps", config)?;
//! let delivered = tokio::time::timeout(
//!     Duration::from_secs(120),
//!     poll_cycle(&mut cursor, |message| async move {
//!         println!("{} bytes", message.len());
//!         Ok(())
//!     }),
//! )
//! .await??;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod connector;
pub mod cursor;
mod cycle;
mod error;
pub mod protocol;
mod selector;

pub use config::{Secret, SessionConfig, SessionConfigBuilder};
pub use connector::{Backend, Folder, Store, StoreConnector};
pub use cursor::{CursorState, MailboxCursor};
pub use cycle::poll_cycle;
pub use error::{Error, HandlerError, Result};
pub use mailpoll_proto::{Message, MessageRef};
pub use protocol::{ConsumePolicy, ProtocolVariant};
pub use selector::{connector_for, for_protocol};
