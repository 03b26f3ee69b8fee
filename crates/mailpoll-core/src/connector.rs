//! Store connector: the capability a cursor drives.
//!
//! [`Backend`] is the small interface the cursor needs from a mail store.
//! [`StoreConnector`] implements it once for all four protocol variants,
//! parameterized by the variant (protocol and TLS mode) and a
//! [`ConsumePolicy`].

use mailpoll_proto::imap::FlagUpdate;
use mailpoll_proto::pop3;
use mailpoll_proto::{ImapClient, MailStream, Message, MessageRef, Pop3Client, stream};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::protocol::{ConsumePolicy, ProtocolVariant};
use crate::{Error, Result};

/// Operations a mailbox cursor performs against a mail store.
///
/// Errors are the protocol-level [`mailpoll_proto::Error`]; the cursor maps
/// them to [`crate::Error`] according to the stage they occurred in.
pub trait Backend: Send + Sync {
    /// Live, authenticated connection.
    type Store: Send;
    /// Selected folder within a store.
    type Folder: Send + Sync;

    /// Connects and authenticates.
    fn connect(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = mailpoll_proto::Result<Self::Store>> + Send;

    /// Opens `name` for read-write access.
    ///
    /// A missing folder is reported as
    /// [`mailpoll_proto::Error::FolderNotFound`].
    fn open_folder(
        &self,
        store: &mut Self::Store,
        name: &str,
    ) -> impl Future<Output = mailpoll_proto::Result<Self::Folder>> + Send;

    /// Lists pending messages in store order.
    fn list_messages(
        &self,
        store: &mut Self::Store,
        folder: &Self::Folder,
    ) -> impl Future<Output = mailpoll_proto::Result<Vec<MessageRef>>> + Send;

    /// Retrieves a message without changing its state on the server.
    fn fetch(
        &self,
        store: &mut Self::Store,
        folder: &Self::Folder,
        reference: MessageRef,
    ) -> impl Future<Output = mailpoll_proto::Result<Message>> + Send;

    /// Marks a message consumed so the next cycle does not deliver it again.
    fn mark_consumed(
        &self,
        store: &mut Self::Store,
        folder: &Self::Folder,
        reference: MessageRef,
    ) -> impl Future<Output = mailpoll_proto::Result<()>> + Send;

    /// Closes the folder (if open) and then the store.
    ///
    /// A non-graceful close skips the folder handshake and only reports
    /// failures to release the connection itself.
    fn close(
        &self,
        store: Self::Store,
        folder: Option<Self::Folder>,
        graceful: bool,
    ) -> impl Future<Output = mailpoll_proto::Result<()>> + Send;
}

/// Connection to a mail store.
#[derive(Debug)]
pub enum Store {
    /// IMAP or IMAPS session.
    Imap(ImapClient<MailStream>),
    /// POP3 or POP3S session.
    Pop3(Pop3Client<MailStream>),
}

impl Store {
    /// Returns true once the connection can no longer carry commands.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        match self {
            Self::Imap(client) => client.is_closed(),
            Self::Pop3(client) => client.is_closed(),
        }
    }
}

/// A folder opened on a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    name: String,
    exists: Option<u32>,
}

impl Folder {
    /// Folder name as requested.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Message count reported when the folder was selected (IMAP only).
    #[must_use]
    pub const fn exists(&self) -> Option<u32> {
        self.exists
    }
}

/// Generic store connector for all protocol variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConnector {
    variant: ProtocolVariant,
    policy: ConsumePolicy,
}

impl StoreConnector {
    /// Creates a connector using the variant's default policy.
    #[must_use]
    pub const fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            policy: variant.default_policy(),
        }
    }

    /// Replaces the consumption policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the protocol cannot apply it
    /// (POP3 has no `\Seen` flag).
    pub fn with_policy(self, policy: ConsumePolicy) -> Result<Self> {
        if !self.variant.supports(policy) {
            return Err(Error::Configuration(format!(
                "{} does not support the {policy} consumption policy",
                self.variant
            )));
        }
        Ok(Self { policy, ..self })
    }

    /// Protocol variant.
    #[must_use]
    pub const fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Whether the connection uses implicit TLS.
    #[must_use]
    pub const fn tls(&self) -> bool {
        self.variant.implicit_tls()
    }

    /// Consumption policy.
    #[must_use]
    pub const fn policy(&self) -> ConsumePolicy {
        self.policy
    }

    /// IMAP search criteria selecting the messages still pending under the
    /// active policy.
    #[must_use]
    pub const fn search_criteria(&self) -> &'static str {
        match self.policy {
            ConsumePolicy::MarkSeen => "UNSEEN",
            ConsumePolicy::Delete => "UNDELETED",
            ConsumePolicy::Leave => "ALL",
        }
    }

    /// Opens the stream, reads the greeting, upgrades and authenticates.
    async fn establish(&self, config: &SessionConfig) -> mailpoll_proto::Result<Store> {
        let stream = self.open_stream(config).await?;
        let upgrade = config.starttls() && !self.tls();
        let password = config.password().expose();

        let store = if self.variant.is_imap() {
            let mut client = ImapClient::from_stream(stream, config.debug()).await?;
            if upgrade {
                client = client.starttls(config.host()).await?;
            }
            client.login(config.username(), password).await?;
            Store::Imap(client)
        } else {
            let mut client = Pop3Client::from_stream(stream, config.debug()).await?;
            if upgrade {
                client = client.stls(config.host()).await?;
            }
            client.login(config.username(), password).await?;
            Store::Pop3(client)
        };

        info!(
            protocol = %self.variant,
            username = config.username(),
            "Authenticated"
        );
        Ok(store)
    }

    async fn open_stream(&self, config: &SessionConfig) -> mailpoll_proto::Result<MailStream> {
        let host = config.host();
        let port = config.port_or(self.variant.default_port());
        info!(
            protocol = %self.variant,
            host,
            port,
            tls = self.tls(),
            "Connecting to mail store"
        );

        if self.tls() {
            stream::connect_tls(host, port, config.connect_timeout()).await
        } else {
            stream::connect_plain(host, port, config.connect_timeout()).await
        }
    }
}

impl Backend for StoreConnector {
    type Store = Store;
    type Folder = Folder;

    async fn connect(&self, config: &SessionConfig) -> mailpoll_proto::Result<Store> {
        let limit = config.connect_timeout();
        tokio::time::timeout(limit, self.establish(config))
            .await
            .map_err(|_| mailpoll_proto::Error::Timeout(limit))?
    }

    async fn open_folder(&self, store: &mut Store, name: &str) -> mailpoll_proto::Result<Folder> {
        match store {
            Store::Imap(client) => {
                let status = client.select(name).await?;
                if status.read_only && self.policy != ConsumePolicy::Leave {
                    return Err(mailpoll_proto::Error::NotSupported(format!(
                        "read-write access to {name}"
                    )));
                }
                Ok(Folder {
                    name: name.to_string(),
                    exists: Some(status.exists),
                })
            }
            Store::Pop3(_) if name.eq_ignore_ascii_case(pop3::INBOX) => Ok(Folder {
                name: name.to_string(),
                exists: None,
            }),
            Store::Pop3(_) => Err(mailpoll_proto::Error::FolderNotFound(name.to_string())),
        }
    }

    async fn list_messages(
        &self,
        store: &mut Store,
        folder: &Folder,
    ) -> mailpoll_proto::Result<Vec<MessageRef>> {
        let snapshot: Vec<MessageRef> = match store {
            Store::Imap(client) => client
                .uid_search(self.search_criteria())
                .await?
                .into_iter()
                .map(MessageRef::new)
                .collect(),
            Store::Pop3(client) => client
                .list()
                .await?
                .into_iter()
                .map(|entry| MessageRef::with_size(entry.number, entry.size))
                .collect(),
        };

        if let Some(exists) = folder.exists()
            && snapshot.len() > exists as usize
        {
            // Mail delivered after SELECT; the extra UIDs are still valid.
            warn!(
                folder = folder.name(),
                exists,
                pending = snapshot.len(),
                "Snapshot larger than the selected message count"
            );
        }
        info!(
            folder = folder.name(),
            exists = folder.exists(),
            pending = snapshot.len(),
            policy = %self.policy,
            "Listed messages"
        );
        Ok(snapshot)
    }

    async fn fetch(
        &self,
        store: &mut Store,
        _folder: &Folder,
        reference: MessageRef,
    ) -> mailpoll_proto::Result<Message> {
        let raw = match store {
            Store::Imap(client) => client.uid_fetch_body(reference.id).await?,
            Store::Pop3(client) => client.retr(reference.id).await?,
        };
        Ok(Message::new(reference, raw))
    }

    async fn mark_consumed(
        &self,
        store: &mut Store,
        _folder: &Folder,
        reference: MessageRef,
    ) -> mailpoll_proto::Result<()> {
        match (store, self.policy) {
            (Store::Imap(client), ConsumePolicy::MarkSeen) => {
                client.uid_store(reference.id, FlagUpdate::Seen).await
            }
            (Store::Imap(client), ConsumePolicy::Delete) => {
                client.uid_store(reference.id, FlagUpdate::Deleted).await
            }
            (Store::Pop3(client), ConsumePolicy::Delete) => client.dele(reference.id).await,
            (Store::Pop3(_), ConsumePolicy::MarkSeen) => Err(mailpoll_proto::Error::InvalidState(
                "POP3 messages have no seen flag".to_string(),
            )),
            (store, ConsumePolicy::Leave) => {
                if store.is_closed() {
                    Err(mailpoll_proto::Error::Closed)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn close(
        &self,
        store: Store,
        folder: Option<Folder>,
        graceful: bool,
    ) -> mailpoll_proto::Result<()> {
        match (store, graceful) {
            (Store::Imap(mut client), true) => {
                let closed_folder = match folder {
                    Some(_) => client.close_mailbox().await,
                    None => Ok(()),
                };
                let logged_out = client.logout().await;
                closed_folder.and(logged_out)
            }
            (Store::Pop3(mut client), true) => client.quit().await,
            (Store::Imap(mut client), false) => {
                if let Err(e) = client.logout().await {
                    debug!(error = %e, "Ignoring failed LOGOUT during forced close");
                }
                client.shutdown().await
            }
            (Store::Pop3(mut client), false) => {
                if let Err(e) = client.quit().await {
                    debug!(error = %e, "Ignoring failed QUIT during forced close");
                }
                client.shutdown().await
            }
        }
    }
}
