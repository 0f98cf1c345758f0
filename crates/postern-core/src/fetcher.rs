//! Selective message retrieval.
//!
//! Opening a message costs two round trips: the first asks only for the
//! BODYSTRUCTURE, the second names the header and just the sections the
//! client will display. Large text parts are fetched truncated, so a
//! multi-megabyte HTML newsletter or a big attachment never crosses the
//! wire just to render a preview.

use std::future::Future;

use postern_imap::{BodyStructure, FetchAttribute, FetchedMessage, PartInfo, PartTree, Uid};
use postern_mime::TransferEncoding;
use postern_mime::encoding::decode_charset;
use tracing::{debug, warn};

use crate::config::MailConfig;
use crate::error::{Error, ErrorKind, ProtocolKind, Result};
use crate::hooks::{CustomPartData, ExtensionHooks, NoHooks};
use crate::message::{DetachedSignature, Message, MessageHeaders};
use crate::model::UserId;
use crate::transport::MailboxTransport;
use crate::trust::{SenderTrustLookup, TrustedSenders};

/// A text part chosen for the second FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPart {
    /// Structure entry.
    pub info: PartInfo,
    /// Fetched as `<0.limit>` because the part is larger than the limit.
    pub truncated: bool,
}

/// What the second FETCH will ask for, derived from the BODYSTRUCTURE.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    /// Folder.
    pub folder: String,
    /// Message UID.
    pub uid: Uid,
    /// Section of an encapsulated message to show instead of the outer one.
    pub nested: Option<String>,
    /// Whole-message structure from the first FETCH, if it came back.
    pub structure: Option<BodyStructure>,
    /// Body text parts.
    pub text_parts: Vec<SelectedPart>,
    /// Parts matched by file-name suffix.
    pub signature_parts: Vec<PartInfo>,
    /// Parts nominated by extension hooks.
    pub custom_parts: Vec<PartInfo>,
    body_text_limit: u32,
}

impl FetchPlan {
    /// Selects the parts to fetch.
    ///
    /// With a nested section only the first text part of that message is
    /// kept. A nested section that does not name a `message/rfc822` part
    /// is treated like a missing structure.
    #[must_use]
    pub fn new(
        folder: &str,
        uid: Uid,
        nested: Option<&str>,
        structure: Option<BodyStructure>,
        config: &MailConfig,
        hooks: &impl ExtensionHooks,
    ) -> Self {
        let mut plan = Self {
            folder: folder.to_string(),
            uid,
            nested: nested.map(str::to_string),
            structure,
            text_parts: Vec::new(),
            signature_parts: Vec::new(),
            custom_parts: Vec::new(),
            body_text_limit: config.body_text_limit,
        };

        let Some(tree) = plan.tree() else {
            if plan.structure.is_some() {
                warn!(nested = ?plan.nested, "nested section is not an encapsulated message");
                plan.structure = None;
            }
            return plan;
        };

        let mut text = tree.html_or_plain_parts();
        if plan.nested.is_some() {
            text.truncate(1);
        }
        let limit = config.body_text_limit;
        let text_parts: Vec<SelectedPart> = text
            .into_iter()
            .map(|info| SelectedPart {
                truncated: limit > 0 && info.size > limit,
                info,
            })
            .collect();

        let signature_parts = tree.find_by_filename_suffix(&config.signature_suffixes);

        let all_parts = tree.all_parts();
        let custom_parts = hooks
            .on_body_structure_parts(&all_parts)
            .into_iter()
            .filter_map(|id| {
                let found = all_parts.iter().find(|p| p.part_id == id).cloned();
                if found.is_none() {
                    warn!(part_id = %id, "hook nominated an unknown part");
                }
                found
            })
            .collect();

        plan.text_parts = text_parts;
        plan.signature_parts = signature_parts;
        plan.custom_parts = custom_parts;
        plan
    }

    /// Structure view rooted at the displayed message.
    #[must_use]
    pub fn tree(&self) -> Option<PartTree<'_>> {
        tree_for(self.structure.as_ref()?, self.nested.as_deref())
    }

    /// `HEADER`, or `<nested>.HEADER` for an encapsulated message.
    #[must_use]
    pub fn header_section(&self) -> String {
        self.nested
            .as_ref()
            .map_or_else(|| "HEADER".to_string(), |n| format!("{n}.HEADER"))
    }

    /// Items of the second FETCH.
    #[must_use]
    pub fn attributes(&self) -> Vec<FetchAttribute> {
        let mut items = vec![
            FetchAttribute::Uid,
            FetchAttribute::Rfc822Size,
            FetchAttribute::InternalDate,
            FetchAttribute::Flags,
            FetchAttribute::peek(self.header_section()),
        ];

        let mut seen: Vec<&str> = Vec::new();
        for part in &self.text_parts {
            seen.push(&part.info.part_id);
            items.push(if part.truncated {
                FetchAttribute::peek_truncated(part.info.part_id.clone(), self.body_text_limit)
            } else {
                FetchAttribute::peek(part.info.part_id.clone())
            });
        }
        for info in self.signature_parts.iter().chain(&self.custom_parts) {
            if !seen.contains(&info.part_id.as_str()) {
                seen.push(&info.part_id);
                items.push(FetchAttribute::peek(info.part_id.clone()));
            }
        }

        if self.structure.is_none() {
            items.push(FetchAttribute::BodyStructure);
        }
        items
    }
}

fn tree_for<'a>(structure: &'a BodyStructure, nested: Option<&'a str>) -> Option<PartTree<'a>> {
    match nested {
        Some(section) => PartTree::nested(structure, section),
        None => Some(PartTree::new(structure)),
    }
}

/// Retrieves messages for one user.
#[derive(Debug, Clone)]
pub struct MessageFetcher<H = NoHooks, T = TrustedSenders> {
    user: UserId,
    config: MailConfig,
    hooks: H,
    trust: T,
}

impl MessageFetcher {
    /// Creates a fetcher without hooks and with an empty trust list.
    #[must_use]
    pub fn new(user: UserId, config: MailConfig) -> Self {
        Self {
            user,
            config,
            hooks: NoHooks,
            trust: TrustedSenders::new(),
        }
    }
}

impl<H, T> MessageFetcher<H, T>
where
    H: ExtensionHooks,
    T: SenderTrustLookup,
{
    /// Replaces the extension hooks.
    #[must_use]
    pub fn with_hooks<H2: ExtensionHooks>(self, hooks: H2) -> MessageFetcher<H2, T> {
        MessageFetcher {
            user: self.user,
            config: self.config,
            hooks,
            trust: self.trust,
        }
    }

    /// Replaces the sender trust lookup.
    #[must_use]
    pub fn with_trust<T2: SenderTrustLookup>(self, trust: T2) -> MessageFetcher<H, T2> {
        MessageFetcher {
            user: self.user,
            config: self.config,
            hooks: self.hooks,
            trust,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Fetches one message for display.
    ///
    /// `nested` names a `message/rfc822` part (e.g. `"2"`) to show the
    /// encapsulated message instead of the outer one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for a blank folder, UID 0 or a malformed
    ///   nested section.
    /// - [`Error::NotFound`] if the server returns nothing for the UID.
    /// - [`Error::Cancelled`] if a round trip exceeds the configured limit.
    /// - [`Error::Imap`] for connection, login and server failures.
    pub async fn fetch_message<M>(
        &self,
        transport: &mut M,
        folder: &str,
        uid: u32,
        nested: Option<&str>,
    ) -> Result<Message>
    where
        M: MailboxTransport,
    {
        let (folder, uid, nested) = validate(folder, uid, nested)?;

        debug!(folder, uid = uid.get(), "select folder");
        self.round_trip(transport.examine_folder(folder)).await?;

        debug!(folder, uid = uid.get(), "fetch body structure");
        let structure = match self.round_trip(transport.fetch_structure(uid)).await {
            Ok(structure) => structure,
            Err(e) if e.kind() == ErrorKind::Protocol(ProtocolKind::MailServer) => {
                warn!(error = %e, folder, uid = uid.get(), "body structure unavailable");
                None
            }
            Err(e) => return Err(e),
        };

        let plan = FetchPlan::new(folder, uid, nested, structure, &self.config, &self.hooks);
        debug!(
            folder,
            uid = uid.get(),
            text_parts = plan.text_parts.len(),
            signature_parts = plan.signature_parts.len(),
            custom_parts = plan.custom_parts.len(),
            "fetch selected parts"
        );

        let items = plan.attributes();
        let fetched = self
            .round_trip(transport.fetch_items(uid, &items))
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {uid} in {folder}")))?;

        self.assemble(plan, fetched).await
    }

    async fn round_trip<F, R>(&self, fut: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        let limit = self.config.round_trip_timeout_duration();
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Cancelled(limit))?
    }

    async fn assemble(&self, plan: FetchPlan, fetched: FetchedMessage) -> Result<Message> {
        let mut message = Message {
            folder: plan.folder.clone(),
            uid: fetched.uid.or(Some(plan.uid)),
            seq: fetched.seq,
            size: fetched.size,
            internal_date: fetched.internal_date.clone(),
            flags: fetched.flags.clone(),
            nested_part: plan.nested.clone(),
            headers: fetched
                .section(&plan.header_section())
                .map(MessageHeaders::parse)
                .unwrap_or_default(),
            ..Message::default()
        };

        let mut html = Vec::new();
        let mut plain = Vec::new();
        for part in &plan.text_parts {
            let Some(data) = fetched.section(&part.info.part_id) else {
                continue;
            };
            message.body_truncated |= part.truncated;
            let text = decode_text(&part.info, data);
            if part.info.is_html() {
                html.push(text);
            } else {
                plain.push(text);
            }
        }
        message.html = (!html.is_empty()).then(|| html.join("\n"));
        message.plain = (!plain.is_empty()).then(|| plain.join("\n"));

        message.signatures = plan
            .signature_parts
            .iter()
            .filter_map(|info| {
                let data = fetched.section(&info.part_id)?;
                Some(DetachedSignature {
                    part_id: info.part_id.clone(),
                    filename: info.filename.clone().unwrap_or_default(),
                    armored: decode_text(info, data),
                })
            })
            .collect();

        let structure = plan.structure.as_ref().or(fetched.structure.as_ref());
        if let Some(tree) = structure.and_then(|s| tree_for(s, plan.nested.as_deref())) {
            message.attachments = attachments(&tree, &plan.text_parts);
        }

        message.safe_sender = self.is_safe_sender(&message).await;

        let custom: Vec<CustomPartData> = plan
            .custom_parts
            .iter()
            .map(|info| CustomPartData {
                part: info.clone(),
                data: fetched
                    .section(&info.part_id)
                    .map(|data| decode_text(info, data))
                    .unwrap_or_default(),
            })
            .collect();
        if let Err(e) = self.hooks.on_message_assembled(&custom, &mut message) {
            warn!(error = %e, uid = plan.uid.get(), "message extension hook failed");
        }

        Ok(message)
    }

    async fn is_safe_sender(&self, message: &Message) -> bool {
        if self.config.always_show_images {
            return true;
        }
        let Some(email) = message.from_email() else {
            return false;
        };
        match self.trust.is_trusted(self.user, email).await {
            Ok(trusted) => trusted,
            Err(e) => {
                warn!(error = %e, "sender trust lookup failed");
                false
            }
        }
    }
}

fn validate<'a>(
    folder: &'a str,
    uid: u32,
    nested: Option<&'a str>,
) -> Result<(&'a str, Uid, Option<&'a str>)> {
    if folder.trim().is_empty() {
        return Err(Error::InvalidInput("folder is empty".into()));
    }
    let uid = Uid::new(uid).ok_or_else(|| Error::InvalidInput("uid must be positive".into()))?;

    let nested = nested.map(str::trim).filter(|n| !n.is_empty());
    if let Some(section) = nested {
        let valid = section
            .split('.')
            .all(|s| s.parse::<u32>().is_ok_and(|n| n > 0));
        if !valid {
            return Err(Error::InvalidInput(format!("bad part index {section}")));
        }
    }
    Ok((folder, uid, nested))
}

/// Decodes transfer encoding, then charset.
fn decode_text(info: &PartInfo, data: &[u8]) -> String {
    let bytes = TransferEncoding::parse(&info.encoding)
        .decode(data)
        .unwrap_or_else(|e| {
            warn!(part_id = %info.part_id, error = %e, "undecodable part, using raw bytes");
            data.to_vec()
        });
    decode_charset(&bytes, info.charset.as_deref().unwrap_or("utf-8"))
}

/// File-like parts, excluding the displayed text and anything inside an
/// attached message.
fn attachments(tree: &PartTree<'_>, text_parts: &[SelectedPart]) -> Vec<PartInfo> {
    let parts = tree.all_parts();
    let attached_messages: Vec<String> = parts
        .iter()
        .filter(|p| p.mime_type == "message/rfc822")
        .map(|p| format!("{}.", p.part_id))
        .collect();

    parts
        .into_iter()
        .filter(|p| !text_parts.iter().any(|t| t.info.part_id == p.part_id))
        .filter(|p| !attached_messages.iter().any(|prefix| p.part_id.starts_with(prefix)))
        .filter(|p| p.is_attachment() || p.content_id.is_some() || p.mime_type == "message/rfc822")
        .collect()
}
