//! Session configuration for a polling target.
//!
//! A [`SessionConfig`] is validated once, when it is built or deserialized,
//! and is immutable afterwards.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::protocol::ConsumePolicy;
use crate::{Error, Result};

/// Folder polled when none is configured.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Default timeout for establishing the TCP/TLS connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A password that is never printed.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value for use on the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Immutable connection parameters for one polling target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSessionConfig")]
pub struct SessionConfig {
    host: String,
    port: u16,
    folder: String,
    username: String,
    password: Secret,
    debug: bool,
    starttls: bool,
    connect_timeout: Duration,
    consume_policy: Option<ConsumePolicy>,
}

impl SessionConfig {
    /// Creates a configuration builder for `host`.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }

    /// Server hostname.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configured port; 0 means the protocol default.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the configured port, or `default` when it is 0.
    #[must_use]
    pub const fn port_or(&self, default: u16) -> u16 {
        if self.port == 0 { default } else { self.port }
    }

    /// Folder to poll.
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login password.
    #[must_use]
    pub const fn password(&self) -> &Secret {
        &self.password
    }

    /// Whether protocol traffic is traced.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Whether plain connections are upgraded with STARTTLS/STLS.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
    }

    /// Timeout for establishing the connection.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Consumption policy override; `None` uses the protocol default.
    #[must_use]
    pub const fn consume_policy(&self) -> Option<ConsumePolicy> {
        self.consume_policy
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: u16,
    folder: String,
    username: String,
    password: Secret,
    debug: bool,
    starttls: bool,
    connect_timeout: Duration,
    consume_policy: Option<ConsumePolicy>,
}

impl SessionConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 0,
            folder: DEFAULT_FOLDER.to_string(),
            username: String::new(),
            password: Secret::default(),
            debug: false,
            starttls: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            consume_policy: None,
        }
    }

    /// Sets the port (0 selects the protocol default).
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the folder to poll.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<Secret>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Enables protocol tracing.
    #[must_use]
    pub const fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enables the STARTTLS/STLS upgrade on plain connections.
    #[must_use]
    pub const fn starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the protocol's default consumption policy.
    #[must_use]
    pub const fn consume_policy(mut self, policy: ConsumePolicy) -> Self {
        self.consume_policy = Some(policy);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the host or folder is empty, the
    /// connect timeout is zero, or the folder or credentials contain CR, LF
    /// or NUL.
    pub fn build(self) -> Result<SessionConfig> {
        let host = self.host.trim().to_string();
        if host.is_empty() {
            return Err(Error::Configuration("mail server host is required".into()));
        }
        if self.folder.trim().is_empty() {
            return Err(Error::Configuration("mail folder is required".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Configuration(
                "connect timeout must be greater than zero".into(),
            ));
        }
        for (field, value) in [
            ("folder", self.folder.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.expose()),
        ] {
            if has_line_break(value) {
                return Err(Error::Configuration(format!(
                    "{field} must not contain CR, LF or NUL"
                )));
            }
        }

        Ok(SessionConfig {
            host,
            port: self.port,
            folder: self.folder,
            username: self.username,
            password: self.password,
            debug: self.debug,
            starttls: self.starttls,
            connect_timeout: self.connect_timeout,
            consume_policy: self.consume_policy,
        })
    }
}

/// Protocol lines end at CRLF; these bytes would split a command.
fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n', '\0'])
}

/// Wire form of [`SessionConfig`], validated through `TryFrom`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSessionConfig {
    host: String,
    #[serde(default)]
    port: u16,
    #[serde(default = "default_folder")]
    folder: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: Secret,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    starttls: bool,
    #[serde(default)]
    connect_timeout_secs: Option<u64>,
    #[serde(default)]
    consume_policy: Option<ConsumePolicy>,
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

impl TryFrom<RawSessionConfig> for SessionConfig {
    type Error = Error;

    fn try_from(raw: RawSessionConfig) -> Result<Self> {
        let mut builder = SessionConfigBuilder::new(raw.host)
            .port(raw.port)
            .folder(raw.folder)
            .credentials(raw.username, raw.password)
            .debug(raw.debug)
            .starttls(raw.starttls);
        if let Some(secs) = raw.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(policy) = raw.consume_policy {
            builder = builder.consume_policy(policy);
        }
        builder.build()
    }
}
