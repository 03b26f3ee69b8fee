//! Integration tests for full POP3 and IMAP polling sessions.
//!
//! These tests use a mock stream that serves a canned server transcript
//! and captures everything the client sends.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailpoll_proto::imap::FlagUpdate;
use mailpoll_proto::{Error, ImapClient, Pop3Client};

/// Mock stream that returns predefined responses.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> Self {
        Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::default(),
        }
    }

    /// Returns a handle to the bytes the client will send.
    fn sent(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_imap_poll_session() {
    let transcript = concat!(
        "* OK [CAPABILITY IMAP4rev1] ready\r\n",
        "A0000 OK LOGIN completed\r\n",
        "* 2 EXISTS\r\n",
        "A0001 OK [READ-WRITE] SELECT completed\r\n",
        "* SEARCH 31 32\r\n",
        "A0002 OK SEARCH completed\r\n",
        "* 1 FETCH (UID 31 BODY[] {14}\r\n",
        "Subject: x\r\n\r\n",
        ")\r\n",
        "A0003 OK FETCH completed\r\n",
        "A0004 OK STORE completed\r\n",
        "A0005 OK CLOSE completed\r\n",
        "* BYE see you\r\n",
        "A0006 OK LOGOUT completed\r\n",
    );
    let stream = MockStream::new(transcript.as_bytes());
    let sent = stream.sent();
    let mut client = ImapClient::from_stream(stream, true).await.unwrap();

    client.login("alice", "pass word").await.unwrap();
    let status = client.select("INBOX").await.unwrap();
    assert_eq!(status.exists, 2);
    assert!(!status.read_only);

    assert_eq!(client.uid_search("UNSEEN").await.unwrap(), vec![31, 32]);
    let body = client.uid_fetch_body(31).await.unwrap();
    assert_eq!(&body[..], b"Subject: x\r\n\r\n");
    client.uid_store(31, FlagUpdate::Seen).await.unwrap();
    client.close_mailbox().await.unwrap();
    client.logout().await.unwrap();
    assert!(client.is_closed());

    // Further commands fail without touching the stream.
    assert!(matches!(client.uid_search("ALL").await, Err(Error::Closed)));

    let sent = String::from_utf8(sent.lock().unwrap().clone()).unwrap();
    assert_eq!(
        sent,
        concat!(
            "A0000 LOGIN alice \"pass word\"\r\n",
            "A0001 SELECT INBOX\r\n",
            "A0002 UID SEARCH UNSEEN\r\n",
            "A0003 UID FETCH 31 (UID BODY.PEEK[])\r\n",
            "A0004 UID STORE 31 +FLAGS.SILENT (\\Seen)\r\n",
            "A0005 CLOSE\r\n",
            "A0006 LOGOUT\r\n",
        )
    );
}

#[tokio::test]
async fn test_imap_read_only_select_is_reported() {
    let transcript = concat!(
        "* OK [CAPABILITY IMAP4rev1] ready\r\n",
        "* 5 EXISTS\r\n",
        "A0000 OK [READ-ONLY] SELECT completed\r\n",
    );
    let mut client = ImapClient::from_stream(MockStream::new(transcript.as_bytes()), false)
        .await
        .unwrap();

    let status = client.select("Shared").await.unwrap();
    assert_eq!(status.exists, 5);
    assert!(status.read_only);
}

#[tokio::test]
async fn test_imap_connection_lost_mid_session() {
    let transcript = concat!(
        "* OK [CAPABILITY IMAP4rev1] ready\r\n",
        "* BYE server shutting down\r\n",
    );
    let mut client = ImapClient::from_stream(MockStream::new(transcript.as_bytes()), false)
        .await
        .unwrap();

    let err = client.uid_store(7, FlagUpdate::Deleted).await.unwrap_err();
    assert!(matches!(err, Error::Bye(text) if text == "server shutting down"));
    assert!(err_is_closed(&client.uid_search("ALL").await));
    client.logout().await.unwrap();
}

fn err_is_closed<T>(result: &mailpoll_proto::Result<T>) -> bool {
    matches!(result, Err(Error::Closed))
}

#[tokio::test]
async fn test_pop3_poll_session() {
    let transcript = concat!(
        "+OK ready\r\n",
        "+OK\r\n",
        "+OK logged in\r\n",
        "+OK 1 message\r\n",
        "1 20\r\n",
        ".\r\n",
        "+OK\r\n",
        "Subject: y\r\n",
        "\r\n",
        "..dot\r\n",
        ".\r\n",
        "+OK deleted\r\n",
        "+OK bye\r\n",
    );
    let stream = MockStream::new(transcript.as_bytes());
    let sent = stream.sent();
    let mut client = Pop3Client::from_stream(stream, true).await.unwrap();

    client.login("alice", "secret").await.unwrap();
    let entries = client.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size, 20);

    let body = client.retr(1).await.unwrap();
    assert_eq!(&body[..], b"Subject: y\r\n\r\n.dot\r\n");
    client.dele(1).await.unwrap();
    client.quit().await.unwrap();
    assert!(client.is_closed());

    let sent = sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        b"USER alice\r\nPASS secret\r\nLIST\r\nRETR 1\r\nDELE 1\r\nQUIT\r\n".to_vec()
    );
}

#[tokio::test]
async fn test_pop3_connection_lost() {
    let mut client = Pop3Client::from_stream(MockStream::new(b"+OK ready\r\n"), false)
        .await
        .unwrap();

    let err = client.list().await.unwrap_err();
    assert!(err.is_disconnect());
    assert!(client.is_closed());
    assert!(matches!(client.dele(1).await, Err(Error::Closed)));
}
