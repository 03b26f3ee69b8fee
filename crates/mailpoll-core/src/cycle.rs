//! A complete polling cycle: open, drain, close.

use mailpoll_proto::Message;
use tracing::{info, warn};

use crate::connector::Backend;
use crate::cursor::MailboxCursor;
use crate::error::HandlerError;
use crate::{Error, Result};

/// Runs one polling cycle over an unopened cursor.
///
/// Opens the cursor, passes every message to `handler` in snapshot order
/// and closes the cursor on every exit path. A handler error stops the
/// cycle; the message it was given has already been marked consumed.
///
/// Returns the number of messages the handler accepted.
///
/// # Errors
///
/// Returns the first error of the cycle. A close failure is returned only
/// when nothing failed before it; otherwise it is logged.
pub async fn poll_cycle<B, F, Fut>(cursor: &mut MailboxCursor<B>, mut handler: F) -> Result<usize>
where
    B: Backend,
    F: FnMut(Message) -> Fut,
    Fut: Future<Output = std::result::Result<(), HandlerError>>,
{
    let drained = drain(cursor, &mut handler).await;
    let closed = cursor.close().await;

    match (drained, closed) {
        (Ok(delivered), Ok(())) => {
            info!(delivered, "Poll cycle complete");
            Ok(delivered)
        }
        (Ok(_), Err(close_error)) => Err(close_error),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_error)) => {
            warn!(error = %close_error, "Close failed after an earlier poll error");
            Err(e)
        }
    }
}

async fn drain<B, F, Fut>(cursor: &mut MailboxCursor<B>, handler: &mut F) -> Result<usize>
where
    B: Backend,
    F: FnMut(Message) -> Fut,
    Fut: Future<Output = std::result::Result<(), HandlerError>>,
{
    cursor.open().await?;

    let mut delivered = 0;
    while cursor.has_next() {
        let message = cursor.next().await?;
        handler(message).await.map_err(Error::Handler)?;
        delivered += 1;
    }
    Ok(delivered)
}
