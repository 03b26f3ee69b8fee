//! End-to-end tests of `StoreConnector` against scripted loopback servers.
//!
//! Only the plain variants are exercised; implicit TLS needs a certificate
//! the webpki roots would accept.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::time::Duration;

use mailpoll_core::{CursorState, Error, SessionConfig, for_protocol};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Reply {
    text: String,
    hang_up: bool,
}

impl Reply {
    fn send(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hang_up: false,
        }
    }

    fn last(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hang_up: true,
        }
    }
}

/// Accepts one connection, answers each command line with `respond` and
/// returns the lines received.
async fn spawn_server<F>(greeting: &'static str, mut respond: F) -> (u16, JoinHandle<Vec<String>>)
where
    F: FnMut(&str) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        write.write_all(greeting.as_bytes()).await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let mut received = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply = respond(&line);
            received.push(line);
            if write.write_all(reply.text.as_bytes()).await.is_err() || reply.hang_up {
                break;
            }
        }
        received
    });

    (port, handle)
}

fn config(port: u16) -> SessionConfig {
    SessionConfig::builder("127.0.0.1")
        .port(port)
        .credentials("alice", "secret")
        .build()
        .unwrap()
}

const IMAP_GREETING: &str = "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] test server ready\r\n";

fn imap_server(
    folder_exists: bool,
    messages: Vec<(u32, &'static str)>,
) -> impl FnMut(&str) -> Reply + Send + 'static {
    let mut seen: Vec<u32> = Vec::new();
    let bodies: HashMap<u32, &'static str> = messages.iter().copied().collect();

    move |line| {
        let (tag, command) = line.split_once(' ').unwrap();
        let ok = |text: &str| Reply::send(format!("{tag} OK {text}\r\n"));

        if command.starts_with("LOGIN ") {
            if command == "LOGIN alice secret" {
                ok("LOGIN completed")
            } else {
                Reply::send(format!("{tag} NO [AUTHENTICATIONFAILED] invalid\r\n"))
            }
        } else if command.starts_with("SELECT ") {
            if folder_exists {
                Reply::send(format!(
                    "* {} EXISTS\r\n* FLAGS (\\Seen \\Deleted)\r\n{tag} OK [READ-WRITE] SELECT completed\r\n",
                    messages.len()
                ))
            } else {
                Reply::send(format!("{tag} NO [NONEXISTENT] no such mailbox\r\n"))
            }
        } else if command == "UID SEARCH UNSEEN" {
            let uids: Vec<String> = messages
                .iter()
                .filter(|(uid, _)| !seen.contains(uid))
                .map(|(uid, _)| uid.to_string())
                .collect();
            Reply::send(format!(
                "* SEARCH {}\r\n{tag} OK SEARCH completed\r\n",
                uids.join(" ")
            ))
        } else if let Some(rest) = command.strip_prefix("UID FETCH ") {
            let uid: u32 = rest.split_whitespace().next().unwrap().parse().unwrap();
            let body = bodies[&uid];
            Reply::send(format!(
                "* 1 FETCH (UID {uid} BODY[] {{{}}}\r\n{body})\r\n{tag} OK FETCH completed\r\n",
                body.len()
            ))
        } else if let Some(rest) = command.strip_prefix("UID STORE ") {
            seen.push(rest.split_whitespace().next().unwrap().parse().unwrap());
            ok("STORE completed")
        } else if command == "CLOSE" {
            ok("CLOSE completed")
        } else if command == "LOGOUT" {
            Reply::last(format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n"))
        } else {
            Reply::send(format!("{tag} BAD unexpected command\r\n"))
        }
    }
}

const POP3_GREETING: &str = "+OK POP3 test server ready\r\n";

fn pop3_server(
    messages: Vec<(u32, &'static str)>,
    fail_dele: Option<u32>,
) -> impl FnMut(&str) -> Reply + Send + 'static {
    move |line| {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let arg: Option<u32> = words.next().and_then(|w| w.parse().ok());

        match verb {
            "USER" | "PASS" => Reply::send("+OK\r\n"),
            "LIST" => {
                let mut text = format!("+OK {} messages\r\n", messages.len());
                for (number, body) in &messages {
                    text.push_str(&format!("{number} {}\r\n", body.len()));
                }
                text.push_str(".\r\n");
                Reply::send(text)
            }
            "RETR" => {
                let number = arg.unwrap();
                let body = messages.iter().find(|(n, _)| *n == number).unwrap().1;
                let mut text = String::from("+OK message follows\r\n");
                for line in body.split_inclusive("\r\n") {
                    if line.starts_with('.') {
                        text.push('.');
                    }
                    text.push_str(line);
                }
                text.push_str(".\r\n");
                Reply::send(text)
            }
            "DELE" if arg == fail_dele => Reply::send("-ERR maildrop is read-only\r\n"),
            "DELE" => Reply::send("+OK marked\r\n"),
            "QUIT" => Reply::last("+OK bye\r\n"),
            _ => Reply::send("-ERR unknown command\r\n"),
        }
    }
}

#[tokio::test]
async fn test_imap_three_messages_in_folder_order() {
    let messages = vec![
        (4, "Subject: one\r\n\r\nfirst\r\n"),
        (9, "Subject: two\r\n\r\nsecond\r\n"),
        (15, "Subject: three\r\n\r\nthird\r\n"),
    ];
    let (port, server) = spawn_server(IMAP_GREETING, imap_server(true, messages)).await;

    let mut cursor = for_protocol("imap", config(port)).unwrap();
    cursor.open().await.unwrap();
    assert_eq!(cursor.len(), 3);

    let mut delivered = Vec::new();
    while cursor.has_next() {
        let message = cursor.next().await.unwrap();
        delivered.push((message.id(), String::from_utf8(message.raw.to_vec()).unwrap()));
    }
    assert_eq!(
        delivered,
        vec![
            (4, "Subject: one\r\n\r\nfirst\r\n".to_string()),
            (9, "Subject: two\r\n\r\nsecond\r\n".to_string()),
            (15, "Subject: three\r\n\r\nthird\r\n".to_string()),
        ]
    );
    cursor.close().await.unwrap();

    let received = server.await.unwrap();
    let commands: Vec<&str> = received
        .iter()
        .map(|line| line.split_once(' ').unwrap().1)
        .collect();
    assert_eq!(
        commands,
        vec![
            "LOGIN alice secret",
            "SELECT INBOX",
            "UID SEARCH UNSEEN",
            "UID FETCH 4 (UID BODY.PEEK[])",
            "UID STORE 4 +FLAGS.SILENT (\\Seen)",
            "UID FETCH 9 (UID BODY.PEEK[])",
            "UID STORE 9 +FLAGS.SILENT (\\Seen)",
            "UID FETCH 15 (UID BODY.PEEK[])",
            "UID STORE 15 +FLAGS.SILENT (\\Seen)",
            "CLOSE",
            "LOGOUT",
        ]
    );
}

#[tokio::test]
async fn test_imap_missing_folder() {
    let (port, server) = spawn_server(IMAP_GREETING, imap_server(false, Vec::new())).await;

    let mut cursor = for_protocol("IMAP", config(port)).unwrap();
    let err = cursor.open().await.unwrap_err();
    assert!(matches!(err, Error::FolderNotFound(name) if name == "INBOX"));
    assert_eq!(cursor.state(), CursorState::Failed);
    cursor.close().await.unwrap();

    let received = server.await.unwrap();
    assert!(received.last().unwrap().ends_with("LOGOUT"));
    assert!(!received.iter().any(|line| line.ends_with("CLOSE")));
}

#[tokio::test]
async fn test_imap_rejected_login() {
    let (port, server) = spawn_server(IMAP_GREETING, imap_server(true, Vec::new())).await;
    let config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .credentials("alice", "wrong")
        .build()
        .unwrap();

    let mut cursor = for_protocol("imap", config).unwrap();
    let err = cursor.open().await.unwrap_err();
    assert!(matches!(err, Error::Connection(mailpoll_proto::Error::Auth(_))));
    cursor.close().await.unwrap();
    drop(cursor);

    assert_eq!(server.await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_imap_starttls_not_offered() {
    let (port, _server) = spawn_server(IMAP_GREETING, imap_server(true, Vec::new())).await;
    let config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .starttls(true)
        .build()
        .unwrap();

    let mut cursor = for_protocol("imap", config).unwrap();
    let err = cursor.open().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(mailpoll_proto::Error::NotSupported(_))
    ));
}

#[tokio::test]
async fn test_pop3_retrieves_and_deletes() {
    let messages = vec![
        (1, "Subject: hi\r\n\r\n.signature\r\n"),
        (2, "Subject: again\r\n\r\nbody\r\n"),
    ];
    let (port, server) = spawn_server(POP3_GREETING, pop3_server(messages, None)).await;

    let mut cursor = for_protocol("pop3", config(port)).unwrap();
    cursor.open().await.unwrap();

    let first = cursor.next().await.unwrap();
    assert_eq!(first.id(), 1);
    assert_eq!(first.reference.size, Some(27));
    assert_eq!(&first.raw[..], b"Subject: hi\r\n\r\n.signature\r\n");
    assert_eq!(cursor.next().await.unwrap().id(), 2);
    assert!(!cursor.has_next());
    cursor.close().await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec![
            "USER alice",
            "PASS secret",
            "LIST",
            "RETR 1",
            "DELE 1",
            "RETR 2",
            "DELE 2",
            "QUIT",
        ]
    );
}

#[tokio::test]
async fn test_pop3_only_has_inbox() {
    let (port, server) = spawn_server(POP3_GREETING, pop3_server(Vec::new(), None)).await;
    let config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .folder("Archive")
        .build()
        .unwrap();

    let mut cursor = for_protocol("pop3", config).unwrap();
    let err = cursor.open().await.unwrap_err();
    assert!(matches!(err, Error::FolderNotFound(name) if name == "Archive"));

    let received = server.await.unwrap();
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_pop3_dele_failure_fails_cursor() {
    let messages = vec![(1, "Subject: a\r\n\r\nx\r\n"), (2, "Subject: b\r\n\r\ny\r\n")];
    let (port, server) = spawn_server(POP3_GREETING, pop3_server(messages, Some(2))).await;

    let mut cursor = for_protocol("pop3", config(port)).unwrap();
    cursor.open().await.unwrap();
    cursor.next().await.unwrap();

    let err = cursor.next().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol {
            source: mailpoll_proto::Error::No(_),
            ..
        }
    ));
    assert_eq!(cursor.state(), CursorState::Failed);
    cursor.close().await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_unreachable_host_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut cursor = for_protocol("pop3", config(port)).unwrap();
    let err = cursor.open().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert!(cursor.close().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_hits_connect_timeout() {
    // Bound but never accepted: the TCP handshake completes, no greeting follows.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = SessionConfig::builder("127.0.0.1")
        .port(port)
        .credentials("alice", "secret")
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let mut cursor = for_protocol("imap", config).unwrap();
    let err = cursor.open().await.unwrap_err();
    assert!(
        matches!(err, Error::Connection(mailpoll_proto::Error::Timeout(limit)) if limit == Duration::from_secs(5)),
        "unexpected error: {err:?}"
    );
    assert_eq!(cursor.state(), CursorState::Failed);
    assert!(cursor.close().await.is_ok());
    drop(listener);
}
