//! Maps protocol identifiers to connectors and cursors.

use crate::config::SessionConfig;
use crate::connector::StoreConnector;
use crate::cursor::MailboxCursor;
use crate::protocol::ProtocolVariant;
use crate::{Error, Result};

/// Returns the connector for a protocol identifier, or `None` if the
/// identifier is not one of `pop3`, `pop3s`, `imap`, `imaps`.
#[must_use]
pub fn connector_for(identifier: &str) -> Option<StoreConnector> {
    ProtocolVariant::from_identifier(identifier).map(StoreConnector::new)
}

/// Creates an unopened cursor for `identifier`, applying the configured
/// consumption policy if there is one.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the identifier is unknown or the
/// protocol cannot apply the configured policy.
pub fn for_protocol(identifier: &str, config: SessionConfig) -> Result<MailboxCursor> {
    let connector = connector_for(identifier).ok_or_else(|| {
        Error::Configuration(format!("unsupported store protocol: {identifier:?}"))
    })?;
    let connector = match config.consume_policy() {
        Some(policy) => connector.with_policy(policy)?,
        None => connector,
    };
    Ok(MailboxCursor::new(connector, config))
}
