//! Type-state IMAP client.
//!
//! The connection moves through three states, and each state only exposes
//! the commands that are valid in it:
//!
//! - [`NotAuthenticated`]: right after the greeting
//! - [`Authenticated`]: after LOGIN
//! - [`Selected`]: after SELECT or EXAMINE

#![allow(clippy::missing_errors_doc)]

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::framed::FramedStream;
use crate::command::{Command, FetchAttribute, StoreAction, TagGenerator};
use crate::fetch::FetchedMessage;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{MailboxStatus, ResponseCode, Status, Uid};
use crate::{Error, Result};

/// Connected, greeting received.
#[derive(Debug, Clone, Copy)]
pub struct NotAuthenticated;

/// Logged in, no mailbox open.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

/// Mailbox open.
#[derive(Debug, Clone, Copy)]
pub struct Selected;

/// IMAP client whose `State` parameter tracks the protocol state.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    tag_gen: TagGenerator,
    capabilities: Vec<String>,
    io_timeout: Option<Duration>,
    mailbox: Option<String>,
    read_only: bool,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("capabilities", &self.capabilities)
            .field("mailbox", &self.mailbox)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn into_state<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            mailbox: self.mailbox,
            read_only: self.read_only,
            _state: PhantomData,
        }
    }

    /// Capabilities advertised so far, uppercased.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Checks for a capability, ignoring case.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Bounds every following command round trip.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Sends a NOOP.
    pub async fn noop(&mut self) -> Result<()> {
        let responses = self.run(&Command::Noop).await?;
        check_tagged_ok(&responses)
    }

    /// Sends LOGOUT and drops the connection. The server's reply is not
    /// required.
    pub async fn logout(mut self) -> Result<()> {
        let _ = self.run(&Command::Logout).await;
        Ok(())
    }

    /// Writes `command` and reads everything up to its tagged completion.
    async fn run(&mut self, command: &Command) -> Result<Vec<Vec<u8>>> {
        let tag = self.tag_gen.next();
        tracing::debug!(command = command.name(), %tag, "sending");

        let bytes = command.serialize(&tag);
        let limit = self.io_timeout;
        let stream = &mut self.stream;
        let round_trip = async {
            stream.write_command(&bytes).await?;
            stream.read_until_tagged(&tag).await
        };

        let responses = match limit {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => round_trip.await?,
        };

        self.absorb_capabilities(&responses);
        Ok(responses)
    }

    fn absorb_capabilities(&mut self, responses: &[Vec<u8>]) {
        for bytes in responses {
            if let Ok(
                Response::Untagged(UntaggedResponse::Capability(caps))
                | Response::Tagged {
                    code: Some(ResponseCode::Capability(caps)),
                    ..
                },
            ) = ResponseParser::parse(bytes)
            {
                self.capabilities = caps;
            }
        }
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the server greeting from a freshly opened stream.
    ///
    /// A `BYE` greeting is returned as [`Error::Bye`].
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);
        let greeting = framed.read_response().await?;

        let mut capabilities = Vec::new();
        match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Condition {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            Response::Untagged(UntaggedResponse::Condition {
                code: Some(ResponseCode::Capability(caps)),
                ..
            }) => capabilities = caps,
            Response::Untagged(UntaggedResponse::Condition { .. }) => {}
            _ => return Err(Error::Protocol("unexpected greeting".to_string())),
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            io_timeout: None,
            mailbox: None,
            read_only: false,
            _state: PhantomData,
        })
    }

    /// Authenticates with LOGIN. A `NO` reply becomes [`Error::Auth`].
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let responses = self.run(&command).await?;
        match check_tagged_ok(&responses) {
            Ok(()) => Ok(self.into_state()),
            Err(Error::No(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Opens a mailbox read-write.
    pub async fn select(self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        self.open(mailbox, false).await
    }

    /// Opens a mailbox read-only.
    pub async fn examine(self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        self.open(mailbox, true).await
    }

    async fn open(
        mut self,
        mailbox: &str,
        read_only: bool,
    ) -> Result<(Client<S, Selected>, MailboxStatus)> {
        let command = if read_only {
            Command::Examine {
                mailbox: mailbox.to_string(),
            }
        } else {
            Command::Select {
                mailbox: mailbox.to_string(),
            }
        };
        let responses = self.run(&command).await?;
        check_tagged_ok(&responses)?;

        let mut status = parse_mailbox_status(&responses);
        status.read_only |= read_only;
        self.mailbox = Some(mailbox.to_string());
        self.read_only = status.read_only;
        Ok((self.into_state(), status))
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Name of the open mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.mailbox.as_deref().unwrap_or_default()
    }

    /// True if the mailbox was opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Switches to another mailbox read-write. SELECT from the selected
    /// state implicitly closes the current mailbox.
    pub async fn select(self, mailbox: &str) -> Result<(Self, MailboxStatus)> {
        self.into_state::<Authenticated>().select(mailbox).await
    }

    /// Switches to another mailbox read-only.
    pub async fn examine(self, mailbox: &str) -> Result<(Self, MailboxStatus)> {
        self.into_state::<Authenticated>().examine(mailbox).await
    }

    /// Fetches `items` for one message by UID.
    ///
    /// Returns `None` if the server sent no FETCH data for that UID, which
    /// is how a nonexistent UID shows up. Several untagged FETCH responses
    /// for the same message are merged.
    pub async fn uid_fetch(
        &mut self,
        uid: Uid,
        items: &[FetchAttribute],
    ) -> Result<Option<FetchedMessage>> {
        let command = Command::UidFetch {
            uid,
            items: items.to_vec(),
        };
        let responses = self.run(&command).await?;
        check_tagged_ok(&responses)?;

        let mut message: Option<FetchedMessage> = None;
        for bytes in &responses {
            let Response::Untagged(UntaggedResponse::Fetch { seq, items }) =
                ResponseParser::parse(bytes)?
            else {
                continue;
            };
            // unsolicited flag updates for other messages carry a different UID
            let other = items
                .iter()
                .any(|item| matches!(item, crate::parser::FetchItem::Uid(u) if *u != uid));
            if other {
                continue;
            }
            match message.as_mut() {
                Some(existing) if existing.seq == Some(seq) => existing.merge(items),
                Some(_) => {}
                None => message = Some(FetchedMessage::from_items(seq, items)),
            }
        }

        Ok(message.filter(|m| m.uid.is_some() || m.has_sections() || m.structure.is_some()))
    }

    /// Changes flags on one message by UID.
    pub async fn uid_store(&mut self, uid: Uid, action: StoreAction) -> Result<()> {
        if self.read_only {
            return Err(Error::InvalidState(format!(
                "{} is open read-only",
                self.mailbox()
            )));
        }
        let command = Command::UidStore {
            uid,
            action,
            silent: true,
        };
        let responses = self.run(&command).await?;
        check_tagged_ok(&responses)
    }
}

/// Maps the tagged completion (the last response) to a result.
fn check_tagged_ok(responses: &[Vec<u8>]) -> Result<()> {
    let last = responses
        .last()
        .ok_or_else(|| Error::Protocol("missing tagged response".to_string()))?;

    match ResponseParser::parse(last)? {
        Response::Tagged { status, text, .. } => match status {
            Status::Ok | Status::PreAuth => Ok(()),
            Status::No => Err(Error::No(text)),
            Status::Bad => Err(Error::Bad(text)),
            Status::Bye => Err(Error::Bye(text)),
        },
        _ => Err(Error::Protocol("missing tagged response".to_string())),
    }
}

/// Collects mailbox data from SELECT/EXAMINE responses.
fn parse_mailbox_status(responses: &[Vec<u8>]) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for bytes in responses {
        let code = match ResponseParser::parse(bytes) {
            Ok(Response::Untagged(UntaggedResponse::Exists(n))) => {
                status.exists = n;
                continue;
            }
            Ok(Response::Untagged(UntaggedResponse::Recent(n))) => {
                status.recent = n;
                continue;
            }
            Ok(Response::Untagged(UntaggedResponse::Flags(flags))) => {
                status.flags = flags;
                continue;
            }
            Ok(
                Response::Untagged(UntaggedResponse::Condition {
                    code: Some(code), ..
                })
                | Response::Tagged {
                    code: Some(code), ..
                },
            ) => code,
            _ => continue,
        };

        match code {
            ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
            ResponseCode::UidNext(v) => status.uid_next = Some(v),
            ResponseCode::Unseen(v) => status.unseen = Some(v),
            ResponseCode::ReadOnly => status.read_only = true,
            ResponseCode::ReadWrite => status.read_only = false,
            _ => {}
        }
    }

    status
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

    fn lines(raw: &[&str]) -> Vec<Vec<u8>> {
        raw.iter().map(|l| l.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_check_tagged_ok() {
        assert!(check_tagged_ok(&lines(&["A0001 OK done\r\n"])).is_ok());
        assert!(matches!(
            check_tagged_ok(&lines(&["* 1 EXISTS\r\n", "A0001 NO nope\r\n"])),
            Err(Error::No(text)) if text == "nope"
        ));
        assert!(matches!(
            check_tagged_ok(&lines(&["A0001 BAD syntax\r\n"])),
            Err(Error::Bad(_))
        ));
        assert!(check_tagged_ok(&[]).is_err());
    }

    #[test]
    fn test_parse_mailbox_status() {
        let status = parse_mailbox_status(&lines(&[
            "* FLAGS (\\Seen \\Answered)\r\n",
            "* 12 EXISTS\r\n",
            "* 1 RECENT\r\n",
            "* OK [UIDVALIDITY 3857529045] UIDs valid\r\n",
            "* OK [UIDNEXT 4392] Predicted next UID\r\n",
            "A0002 OK [READ-ONLY] EXAMINE completed\r\n",
        ]));
        assert_eq!(status.exists, 12);
        assert_eq!(status.recent, 1);
        assert_eq!(status.flags.len(), 2);
        assert_eq!(status.uid_validity.unwrap().get(), 3857529045);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert!(status.read_only);
    }

    #[tokio::test]
    async fn test_bye_greeting() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Client::from_stream(mock).await.unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn test_greeting_capabilities() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert!(client.has_capability("idle"));
    }

    #[tokio::test]
    async fn test_login_rejected_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN user secret\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] bad credentials\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "secret").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_store_on_read_only_mailbox_is_refused() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN user secret\r\n")
            .read(b"A0001 OK logged in\r\n")
            .write(b"A0002 EXAMINE INBOX\r\n")
            .read(b"* 1 EXISTS\r\nA0002 OK [READ-ONLY] done\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "secret").await.unwrap();
        let (mut client, status) = client.examine("INBOX").await.unwrap();
        assert!(status.read_only);
        assert_eq!(client.mailbox(), "INBOX");

        let err = client
            .uid_store(
                Uid::new(1).unwrap(),
                StoreAction::AddFlags(vec![crate::types::Flag::Seen]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_timeout() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 NOOP\r\n")
            .wait(Duration::from_secs(5))
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let mut client = client.with_io_timeout(Duration::from_secs(1));
        let err = client.noop().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(1)));
    }
}
