//! Sending and saving composed messages.
//!
//! [`ComposeService`] resolves the sender, assembles the MIME message and
//! hands it to a [`MailDelivery`] backend. After a successful send it
//! marks the original message as answered or forwarded and tells the
//! extension hooks which addresses were used. Those follow-up steps are
//! best effort: their failures are logged and never fail the send.

use std::collections::BTreeMap;
use std::future::Future;

use postern_imap::{Flag, Uid};
use postern_mime::{
    AssembledMessage, AttachmentStore, ComposeRequest, DraftKind, MessageBuilder, SenderContext,
};
use tracing::{debug, info, warn};

use crate::config::MailConfig;
use crate::error::{Error, Result};
use crate::hooks::{ExtensionHooks, NoHooks};
use crate::model::{Account, Fetcher, Identity};
use crate::transport::FlagStore;

/// Picks the From candidates for a message sent from `account`.
///
/// A fetcher owned by another user is ignored.
#[must_use]
pub fn resolve_sender(
    account: &Account,
    identity: Option<&Identity>,
    fetcher: Option<&Fetcher>,
) -> SenderContext {
    let fetcher = fetcher.filter(|f| {
        let owned = f.user_id == account.user_id;
        if !owned {
            warn!(fetcher = f.id, account = account.id, "fetcher belongs to another user");
        }
        owned
    });

    SenderContext::new(account.address())
        .with_identity(identity.map(Identity::address))
        .with_fetcher(fetcher.map(Fetcher::address))
}

/// Where a sent message came from and where its copies go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Folder for the sent copy, if one is kept.
    pub sent_folder: Option<String>,
    /// Drafts folder of the draft being sent.
    pub draft_folder: Option<String>,
    /// UID of the draft being sent, removed after delivery.
    pub draft_uid: Option<Uid>,
    /// Message whose read confirmation this send answers.
    pub confirm: Option<(String, Uid)>,
}

impl SendOptions {
    /// No sent copy, no draft, no confirmation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a sent copy in `folder`.
    #[must_use]
    pub fn sent_folder(mut self, folder: impl Into<String>) -> Self {
        self.sent_folder = Some(folder.into());
        self
    }

    /// Marks the message as the final version of a saved draft.
    #[must_use]
    pub fn replacing_draft(mut self, folder: impl Into<String>, uid: Uid) -> Self {
        self.draft_folder = Some(folder.into());
        self.draft_uid = Some(uid);
        self
    }

    /// Flags `uid` in `folder` with `$ReadConfirm` after sending.
    #[must_use]
    pub fn confirming(mut self, folder: impl Into<String>, uid: Uid) -> Self {
        self.confirm = Some((folder.into(), uid));
        self
    }
}

/// Outbound delivery and draft storage.
pub trait MailDelivery {
    /// Delivers `message` to its recipients.
    fn send(
        &mut self,
        message: &AssembledMessage,
        options: &SendOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Appends `message` to `folder`, deleting `replace` if given.
    ///
    /// Returns the UID of the new draft when the server reports it.
    fn save_draft(
        &mut self,
        message: &AssembledMessage,
        folder: &str,
        replace: Option<Uid>,
    ) -> impl Future<Output = Result<Option<Uid>>> + Send;
}

/// Builds and dispatches composed messages.
#[derive(Debug, Clone)]
pub struct ComposeService<S, H = NoHooks> {
    builder: MessageBuilder,
    store: S,
    hooks: H,
}

impl<S: AttachmentStore> ComposeService<S> {
    /// Creates a service reading uploads from `store`.
    pub fn new(config: &MailConfig, store: S) -> Self {
        Self {
            builder: MessageBuilder::new().with_x_mailer(config.x_mailer.clone()),
            store,
            hooks: NoHooks,
        }
    }
}

impl<S, H> ComposeService<S, H>
where
    S: AttachmentStore,
    H: ExtensionHooks,
{
    /// Replaces the extension hooks.
    pub fn with_hooks<H2: ExtensionHooks>(self, hooks: H2) -> ComposeService<S, H2> {
        ComposeService {
            builder: self.builder,
            store: self.store,
            hooks,
        }
    }

    /// Assembles `request` without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mime`] if the request cannot be assembled.
    pub fn build(&self, request: &ComposeRequest) -> Result<AssembledMessage> {
        Ok(self.builder.build(request, &self.store)?)
    }

    /// Saves `request` as a draft in `folder`.
    ///
    /// The draft keeps its `X-Draft-Info` header so the reply or forward
    /// can be resumed later.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `folder` is blank.
    /// - [`Error::Mime`] if the request cannot be assembled.
    /// - Whatever `delivery` returns.
    pub async fn save_draft<D: MailDelivery>(
        &self,
        request: &ComposeRequest,
        folder: &str,
        replace: Option<Uid>,
        delivery: &mut D,
    ) -> Result<Option<Uid>> {
        if folder.trim().is_empty() {
            return Err(Error::InvalidInput("draft folder is empty".into()));
        }

        let message = self.build(request)?;
        debug!(folder, message_id = %message.message_id, "saving draft");
        delivery.save_draft(&message, folder, replace).await
    }

    /// Sends `request`, then updates the original message's flags.
    ///
    /// # Errors
    ///
    /// - [`Error::Mime`] if the request cannot be assembled.
    /// - Whatever `delivery` returns. Flagging and hook failures after a
    ///   successful delivery are only logged.
    pub async fn send<D, F>(
        &self,
        request: &ComposeRequest,
        options: &SendOptions,
        delivery: &mut D,
        flags: &mut F,
    ) -> Result<AssembledMessage>
    where
        D: MailDelivery,
        F: FlagStore,
    {
        let request = request.clone().with_draft_info_header(false);
        let message = self.build(&request)?;

        delivery.send(&message, options).await?;
        info!(
            message_id = %message.message_id,
            recipients = message.recipients.len(),
            "message sent"
        );

        if let Err(e) = self.hooks.on_emails_used(&used_emails(&message)) {
            warn!(error = %e, "emails-used hook failed");
        }

        for (folder, uid, flag) in follow_up_flags(&request, options) {
            if let Err(e) = flags.add_flags(&folder, uid, std::slice::from_ref(&flag)).await {
                warn!(
                    error = %e,
                    folder = %folder,
                    uid = uid.get(),
                    flag = flag.as_str(),
                    "could not flag original message"
                );
            }
        }

        Ok(message)
    }
}

/// Recipients keyed by lowercased address, valued by trimmed display name.
fn used_emails(message: &AssembledMessage) -> BTreeMap<String, String> {
    message
        .recipients
        .iter()
        .map(|r| {
            (
                r.email.trim().to_lowercase(),
                r.name.as_deref().unwrap_or_default().trim().to_string(),
            )
        })
        .collect()
}

fn follow_up_flags(request: &ComposeRequest, options: &SendOptions) -> Vec<(String, Uid, Flag)> {
    let mut out = Vec::new();

    if let Some(info) = request.draft_info.as_ref().filter(|i| i.is_complete()) {
        let flag = match info.draft_kind() {
            Some(DraftKind::Reply | DraftKind::ReplyAll) => Some(Flag::Answered),
            Some(DraftKind::Forward) => Some(Flag::Forwarded),
            None => None,
        };
        match (flag, info.uid.trim().parse().ok().and_then(Uid::new)) {
            (Some(flag), Some(uid)) => out.push((info.folder.clone(), uid, flag)),
            (Some(_), None) => warn!(uid = %info.uid, "draft info has no usable uid"),
            (None, _) => debug!(kind = %info.kind, "draft info kind needs no flag"),
        }
    }

    if let Some((folder, uid)) = options.confirm.as_ref().filter(|(f, _)| !f.trim().is_empty()) {
        out.push((folder.clone(), *uid, Flag::ReadConfirm));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use postern_mime::{DraftInfo, EmailAddress};

    use super::*;
    use crate::model::UserId;

    fn account() -> Account {
        Account::new(1, UserId(7), "me@example.com").friendly_name("Me")
    }

    #[test]
    fn test_resolve_sender_prefers_identity() {
        let identity = Identity {
            id: 2,
            user_id: UserId(7),
            email: "alias@example.com".into(),
            friendly_name: " Alias ".into(),
        };
        let ctx = resolve_sender(&account(), Some(&identity), None);
        assert_eq!(
            ctx.from_address(),
            &EmailAddress::with_name("Alias", "alias@example.com")
        );
    }

    #[test]
    fn test_resolve_sender_ignores_foreign_fetcher() {
        let fetcher = Fetcher {
            id: 3,
            user_id: UserId(8),
            email: "other@example.net".into(),
            friendly_name: String::new(),
        };
        let ctx = resolve_sender(&account(), None, Some(&fetcher));
        assert!(ctx.fetcher.is_none());
        assert_eq!(ctx.from_address().email, "me@example.com");

        let own = Fetcher {
            user_id: UserId(7),
            ..fetcher
        };
        let ctx = resolve_sender(&account(), None, Some(&own));
        assert_eq!(ctx.from_address().email, "other@example.net");
    }

    fn request_with(info: DraftInfo) -> ComposeRequest {
        ComposeRequest::new(SenderContext::new(EmailAddress::new("me@example.com")))
            .to("a@example.com")
            .draft_info(info)
    }

    #[test]
    fn test_follow_up_flags() {
        let uid = Uid::new(4).unwrap();

        let flags = follow_up_flags(
            &request_with(DraftInfo::new("reply-all", "12", "INBOX")),
            &SendOptions::new().confirming("Archive", uid),
        );
        assert_eq!(
            flags,
            vec![
                ("INBOX".to_string(), Uid::new(12).unwrap(), Flag::Answered),
                ("Archive".to_string(), uid, Flag::ReadConfirm),
            ]
        );

        let flags = follow_up_flags(
            &request_with(DraftInfo::new("forward", "5", "Work")),
            &SendOptions::new(),
        );
        assert_eq!(flags, vec![("Work".to_string(), Uid::new(5).unwrap(), Flag::Forwarded)]);

        let flags = follow_up_flags(
            &request_with(DraftInfo::new("reply", "abc", "INBOX")),
            &SendOptions::new(),
        );
        assert!(flags.is_empty());
    }
}
