//! Stateful session over the type-state client.
//!
//! [`Session`] keeps the state transitions internal so callers work with
//! `&mut self`. It remembers the open mailbox and skips a redundant
//! EXAMINE/SELECT when the same mailbox is requested again with a
//! compatible access mode.
//!
//! ```ignore
//! use postern_imap::connection::{Config, Credentials, Session};
//!
//! let config = Config::new("imap.example.com");
//! let mut session = Session::connect(config, Credentials::new("me", "pw")).await?;
//! session.examine("INBOX").await?;
//! let message = session.uid_fetch(uid, &items).await?;
//! ```

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use super::client::{Authenticated, Client, Selected};
use super::config::Config;
use super::stream::{ImapStream, connect};
use crate::command::{FetchAttribute, StoreAction};
use crate::fetch::FetchedMessage;
use crate::types::{MailboxStatus, Uid};
use crate::{Error, Result};

/// Login name and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

enum SessionState<S> {
    Disconnected,
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>, MailboxStatus),
}

/// Logged-in IMAP session.
pub struct Session<S = ImapStream> {
    state: SessionState<S>,
    remote: Option<(Config, Credentials)>,
}

impl Session<ImapStream> {
    /// Connects and logs in.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the server cannot be reached and
    /// [`Error::Auth`] if the credentials are rejected.
    pub async fn connect(config: Config, credentials: Credentials) -> Result<Self> {
        let mut session = Self {
            state: SessionState::Disconnected,
            remote: Some((config, credentials)),
        };
        session.reconnect().await?;
        Ok(session)
    }

    /// Drops the current connection, if any, and logs in again.
    ///
    /// # Errors
    ///
    /// Same as [`Session::connect`].
    pub async fn reconnect(&mut self) -> Result<()> {
        self.state = SessionState::Disconnected;
        let Some((config, credentials)) = &self.remote else {
            return Err(Error::InvalidState("no server configured".into()));
        };

        tracing::info!(host = %config.host, port = config.port, "connecting");
        let stream = connect(config).await?;
        let authenticated = login(stream, config, credentials).await?;
        self.state = SessionState::Authenticated(authenticated);
        Ok(())
    }

    /// Reconnects if the previous command left the session disconnected.
    ///
    /// # Errors
    ///
    /// Same as [`Session::connect`].
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.reconnect().await
    }
}

async fn login<S>(
    stream: S,
    config: &Config,
    credentials: &Credentials,
) -> Result<Client<S, Authenticated>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = tokio::time::timeout(config.io_timeout, Client::from_stream(stream))
        .await
        .map_err(|_| Error::Timeout(config.io_timeout))??;
    greeting
        .with_io_timeout(config.io_timeout)
        .login(&credentials.username, &credentials.password)
        .await
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Logs in over an already open stream. Such a session cannot
    /// reconnect by itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bye`] on a rejecting greeting and [`Error::Auth`]
    /// if the credentials are rejected.
    pub async fn from_stream(stream: S, config: &Config, credentials: &Credentials) -> Result<Self> {
        let authenticated = login(stream, config, credentials).await?;
        Ok(Self {
            state: SessionState::Authenticated(authenticated),
            remote: None,
        })
    }

    /// True unless a failed command tore the connection down.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        !matches!(self.state, SessionState::Disconnected)
    }

    /// Currently open mailbox.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        match &self.state {
            SessionState::Selected(client, _) => Some(client.mailbox()),
            _ => None,
        }
    }

    /// Opens `mailbox` read-only. Any open mailbox with the same name is
    /// reused, including a read-write one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the mailbox cannot be opened. The session
    /// is disconnected afterwards.
    pub async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open(mailbox, true).await
    }

    /// Opens `mailbox` read-write, upgrading a read-only selection.
    ///
    /// # Errors
    ///
    /// Same as [`Session::examine`].
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open(mailbox, false).await
    }

    async fn open(&mut self, mailbox: &str, read_only: bool) -> Result<MailboxStatus> {
        if let SessionState::Selected(client, status) = &self.state
            && client.mailbox() == mailbox
            && (read_only || !client.is_read_only())
        {
            return Ok(status.clone());
        }

        let result = match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Authenticated(client) if read_only => client.examine(mailbox).await,
            SessionState::Authenticated(client) => client.select(mailbox).await,
            SessionState::Selected(client, _) if read_only => client.examine(mailbox).await,
            SessionState::Selected(client, _) => client.select(mailbox).await,
            SessionState::Disconnected => {
                return Err(Error::InvalidState("not connected".into()));
            }
        };

        match result {
            Ok((client, status)) => {
                self.state = SessionState::Selected(client, status.clone());
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(error = %e, mailbox, "failed to open mailbox");
                Err(e)
            }
        }
    }

    /// Fetches items for one message in the open mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no mailbox is open, or the
    /// server's error.
    pub async fn uid_fetch(
        &mut self,
        uid: Uid,
        items: &[FetchAttribute],
    ) -> Result<Option<FetchedMessage>> {
        let client = self.selected_client()?;
        let result = client.uid_fetch(uid, items).await;
        self.drop_on_connection_error(result)
    }

    /// Changes flags of one message in the open mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no mailbox is open or it is open
    /// read-only, or the server's error.
    pub async fn uid_store(&mut self, uid: Uid, action: StoreAction) -> Result<()> {
        let client = self.selected_client()?;
        let result = client.uid_store(uid, action).await;
        self.drop_on_connection_error(result)
    }

    /// Logs out. The session is disconnected afterwards.
    ///
    /// # Errors
    ///
    /// Currently always succeeds.
    pub async fn logout(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Authenticated(client) => client.logout().await,
            SessionState::Selected(client, _) => client.logout().await,
            SessionState::Disconnected => Ok(()),
        }
    }

    fn selected_client(&mut self) -> Result<&mut Client<S, Selected>> {
        match &mut self.state {
            SessionState::Selected(client, _) => Ok(client),
            _ => Err(Error::InvalidState("no mailbox selected".into())),
        }
    }

    fn drop_on_connection_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && (e.is_connection() || matches!(e, Error::Timeout(_)))
        {
            tracing::warn!(error = %e, "connection lost");
            self.state = SessionState::Disconnected;
        }
        result
    }
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            SessionState::Disconnected => "disconnected",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Selected(..) => "selected",
        };
        f.debug_struct("Session")
            .field("state", &state)
            .field("host", &self.remote.as_ref().map(|(c, _)| c.host.as_str()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", Credentials::new("me", "hunter2"));
        assert!(debug.contains("me"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_same_mailbox_is_not_reopened() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN me pw\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 EXAMINE INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0002 OK [READ-ONLY] done\r\n")
            .write(b"A0003 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0003 OK [READ-WRITE] done\r\n")
            .build();
        let config = Config::new("localhost");
        let mut session = Session::from_stream(mock, &config, &Credentials::new("me", "pw"))
            .await
            .unwrap();

        assert!(session.examine("INBOX").await.unwrap().read_only);
        assert!(session.examine("INBOX").await.unwrap().read_only);
        assert!(!session.select("INBOX").await.unwrap().read_only);
        // read-write selection also serves read-only access
        assert!(!session.examine("INBOX").await.unwrap().read_only);
        assert_eq!(session.selected_mailbox(), Some("INBOX"));
    }

    #[tokio::test]
    async fn test_fetch_without_mailbox() {
        let mock = Builder::new()
            .read(b"* PREAUTH ready\r\n")
            .write(b"A0001 LOGIN me pw\r\n")
            .read(b"A0001 OK\r\n")
            .build();
        let config = Config::new("localhost");
        let mut session = Session::from_stream(mock, &config, &Credentials::new("me", "pw"))
            .await
            .unwrap();

        let err = session
            .uid_fetch(Uid::new(1).unwrap(), &[FetchAttribute::Uid])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(session.is_connected());
    }
}
