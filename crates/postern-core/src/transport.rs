//! Mailbox access used by the fetcher and the compose service.

use std::future::Future;

use postern_imap::connection::ImapStream;
use postern_imap::{
    BodyStructure, FetchAttribute, FetchedMessage, Flag, Session, StoreAction, Uid,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::Result;

/// Read access to one folder at a time.
pub trait MailboxTransport {
    /// Opens `folder` read-only. FETCH must not set `\Seen` afterwards.
    fn examine_folder(&mut self, folder: &str) -> impl Future<Output = Result<()>> + Send;

    /// Fetches only the BODYSTRUCTURE of a message in the open folder.
    fn fetch_structure(
        &mut self,
        uid: Uid,
    ) -> impl Future<Output = Result<Option<BodyStructure>>> + Send;

    /// Fetches `items` of a message in the open folder.
    fn fetch_items(
        &mut self,
        uid: Uid,
        items: &[FetchAttribute],
    ) -> impl Future<Output = Result<Option<FetchedMessage>>> + Send;
}

/// Write access to message flags.
pub trait FlagStore {
    /// Adds `flags` to one message.
    fn add_flags(
        &mut self,
        folder: &str,
        uid: Uid,
        flags: &[Flag],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`MailboxTransport`] and [`FlagStore`] over an IMAP session.
#[derive(Debug)]
pub struct ImapTransport<S = ImapStream> {
    session: Session<S>,
}

impl<S> ImapTransport<S> {
    /// Wraps a logged-in session.
    #[must_use]
    pub const fn new(session: Session<S>) -> Self {
        Self { session }
    }

    /// Returns the session, e.g. to log out.
    pub fn into_session(self) -> Session<S> {
        self.session
    }
}

impl<S> MailboxTransport for ImapTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn examine_folder(&mut self, folder: &str) -> Result<()> {
        self.session.examine(folder).await?;
        Ok(())
    }

    async fn fetch_structure(&mut self, uid: Uid) -> Result<Option<BodyStructure>> {
        let message = self
            .session
            .uid_fetch(uid, &[FetchAttribute::BodyStructure])
            .await?;
        Ok(message.and_then(|m| m.structure))
    }

    async fn fetch_items(
        &mut self,
        uid: Uid,
        items: &[FetchAttribute],
    ) -> Result<Option<FetchedMessage>> {
        Ok(self.session.uid_fetch(uid, items).await?)
    }
}

impl<S> FlagStore for ImapTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn add_flags(&mut self, folder: &str, uid: Uid, flags: &[Flag]) -> Result<()> {
        self.session.select(folder).await?;
        self.session
            .uid_store(uid, StoreAction::AddFlags(flags.to_vec()))
            .await?;
        Ok(())
    }
}
