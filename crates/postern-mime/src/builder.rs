//! Outgoing message assembly.
//!
//! [`MessageBuilder`] turns a [`ComposeRequest`] into an [`AssembledMessage`]:
//! a MIME tree plus the top-level headers. The layout is
//!
//! ```text
//! multipart/mixed
//! ├── multipart/related
//! │   ├── multipart/alternative
//! │   │   ├── text/plain
//! │   │   └── text/html
//! │   └── inline images (cid)
//! └── attachments
//! ```
//!
//! with every wrapper that would hold a single child left out.

use crate::address::{AddressList, EmailAddress};
use crate::attachment::{AttachmentDescriptor, AttachmentStore};
use crate::content_type::ContentType;
use crate::encoding::{encode_base64, encode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::html::{PreparedHtml, html_to_plain, prepare_html};
use crate::part::Part;
use tracing::{debug, warn};

/// Message importance, carried on the wire as `X-Priority` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    /// Code 1.
    High,
    /// Code 3.
    Normal,
    /// Code 5.
    Low,
}

impl Importance {
    /// Maps a client code to an importance. Unknown codes give `None`.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::High),
            3 => Some(Self::Normal),
            5 => Some(Self::Low),
            _ => None,
        }
    }

    /// `X-Priority` header value.
    #[must_use]
    pub const fn x_priority(self) -> &'static str {
        match self {
            Self::High => "1 (Highest)",
            Self::Normal => "3 (Normal)",
            Self::Low => "5 (Lowest)",
        }
    }

    /// `Importance` header value.
    #[must_use]
    pub const fn importance(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Normal => "Normal",
            Self::Low => "Low",
        }
    }
}

/// Message sensitivity (RFC 2156).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Code 0; valid but produces no header.
    Nothing,
    /// Code 1.
    Confidential,
    /// Code 2.
    Private,
    /// Code 3.
    Personal,
}

impl Sensitivity {
    /// Maps a client code to a sensitivity. Unknown codes give `None`.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Nothing),
            1 => Some(Self::Confidential),
            2 => Some(Self::Private),
            3 => Some(Self::Personal),
            _ => None,
        }
    }

    /// `Sensitivity` header value, if one is emitted.
    #[must_use]
    pub const fn header_value(self) -> Option<&'static str> {
        match self {
            Self::Nothing => None,
            Self::Confidential => Some("Company-Confidential"),
            Self::Private => Some("Private"),
            Self::Personal => Some("Personal"),
        }
    }
}

/// How a draft relates to the message it was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftKind {
    /// Reply to the sender.
    Reply,
    /// Reply to everyone.
    ReplyAll,
    /// Forward.
    Forward,
}

impl DraftKind {
    /// Parses the client's kind string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reply" => Some(Self::Reply),
            "reply-all" => Some(Self::ReplyAll),
            "forward" => Some(Self::Forward),
            _ => None,
        }
    }
}

/// Link from a composed message back to its original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DraftInfo {
    /// `reply`, `reply-all` or `forward`.
    pub kind: String,
    /// UID of the original message.
    pub uid: String,
    /// Folder of the original message.
    pub folder: String,
}

impl DraftInfo {
    /// Creates draft info.
    #[must_use]
    pub fn new(kind: impl Into<String>, uid: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            uid: uid.into(),
            folder: folder.into(),
        }
    }

    /// True when all three fields are non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.kind.trim().is_empty() && !self.uid.trim().is_empty() && !self.folder.is_empty()
    }

    /// Parsed kind, if recognised.
    #[must_use]
    pub fn draft_kind(&self) -> Option<DraftKind> {
        DraftKind::parse(&self.kind)
    }

    /// `X-Draft-Info` header value. The folder is base64 so any mailbox
    /// name survives header transport.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!(
            "type={}; uid={}; folder={}",
            self.kind.trim(),
            self.uid.trim(),
            encode_base64(self.folder.as_bytes())
        )
    }
}

/// The addresses a message can be sent as.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SenderContext {
    /// The mail account's own address.
    pub account: EmailAddress,
    /// A configured identity, if the user picked one.
    pub identity: Option<EmailAddress>,
    /// An external fetcher account, if the message is sent through it.
    pub fetcher: Option<EmailAddress>,
}

impl SenderContext {
    /// Creates a context for the account address alone.
    #[must_use]
    pub const fn new(account: EmailAddress) -> Self {
        Self {
            account,
            identity: None,
            fetcher: None,
        }
    }

    /// Sets the identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Option<EmailAddress>) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Option<EmailAddress>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// The From address: identity, then fetcher, then account.
    #[must_use]
    pub fn from_address(&self) -> &EmailAddress {
        self.identity
            .as_ref()
            .or(self.fetcher.as_ref())
            .unwrap_or(&self.account)
    }

    /// Where read receipts go: fetcher, then account. Never the identity.
    #[must_use]
    pub fn confirmation_address(&self) -> &EmailAddress {
        self.fetcher.as_ref().unwrap_or(&self.account)
    }
}

/// Everything the client sends when composing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComposeRequest {
    /// Sender addresses.
    pub sender: SenderContext,
    /// Raw To list.
    pub to: String,
    /// Raw Cc list.
    pub cc: String,
    /// Raw Bcc list.
    pub bcc: String,
    /// Subject line.
    pub subject: String,
    /// Body, plain or HTML depending on `is_html`.
    pub text: String,
    /// The body is HTML.
    pub is_html: bool,
    /// Importance code (1, 3, 5); anything else is ignored.
    pub importance: i32,
    /// Sensitivity code (0..=3); anything else is ignored.
    pub sensitivity: i32,
    /// Ask for a read receipt.
    pub reading_confirmation: bool,
    /// `In-Reply-To` value.
    pub in_reply_to: String,
    /// `References` value.
    pub references: String,
    /// Link to the original message.
    pub draft_info: Option<DraftInfo>,
    /// Build the draft form: `X-Draft-Info` and `Bcc` are written. Set
    /// when saving a draft, cleared when sending.
    pub emit_draft_info: bool,
    /// Attached files.
    pub attachments: Vec<AttachmentDescriptor>,
    /// Attachment cache scope, usually the user's id.
    pub attachment_scope: String,
}

impl ComposeRequest {
    /// Creates an empty plain-text request from `sender`.
    #[must_use]
    pub fn new(sender: SenderContext) -> Self {
        Self {
            sender,
            to: String::new(),
            cc: String::new(),
            bcc: String::new(),
            subject: String::new(),
            text: String::new(),
            is_html: false,
            importance: 0,
            sensitivity: 0,
            reading_confirmation: false,
            in_reply_to: String::new(),
            references: String::new(),
            draft_info: None,
            emit_draft_info: true,
            attachments: Vec::new(),
            attachment_scope: String::new(),
        }
    }

    /// Sets the To list.
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    /// Sets the Cc list.
    #[must_use]
    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = cc.into();
        self
    }

    /// Sets the Bcc list.
    #[must_use]
    pub fn bcc(mut self, bcc: impl Into<String>) -> Self {
        self.bcc = bcc.into();
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets a plain-text body.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self.is_html = false;
        self
    }

    /// Sets an HTML body.
    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.text = html.into();
        self.is_html = true;
        self
    }

    /// Sets the importance code.
    #[must_use]
    pub const fn importance(mut self, code: i32) -> Self {
        self.importance = code;
        self
    }

    /// Sets the sensitivity code.
    #[must_use]
    pub const fn sensitivity(mut self, code: i32) -> Self {
        self.sensitivity = code;
        self
    }

    /// Requests a read receipt.
    #[must_use]
    pub const fn reading_confirmation(mut self, on: bool) -> Self {
        self.reading_confirmation = on;
        self
    }

    /// Sets the threading headers.
    #[must_use]
    pub fn thread(mut self, in_reply_to: impl Into<String>, references: impl Into<String>) -> Self {
        self.in_reply_to = in_reply_to.into();
        self.references = references.into();
        self
    }

    /// Sets the draft info.
    #[must_use]
    pub fn draft_info(mut self, info: DraftInfo) -> Self {
        self.draft_info = Some(info);
        self
    }

    /// Controls whether the draft-only headers (`X-Draft-Info`, `Bcc`) are
    /// written.
    #[must_use]
    pub const fn with_draft_info_header(mut self, emit: bool) -> Self {
        self.emit_draft_info = emit;
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: AttachmentDescriptor) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Sets the attachment cache scope.
    #[must_use]
    pub fn attachment_scope(mut self, scope: impl Into<String>) -> Self {
        self.attachment_scope = scope.into();
        self
    }
}

/// A built message ready to hand to a sender or a drafts folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Top-level headers, excluding the root part's Content-* headers.
    pub headers: Headers,
    /// Root of the MIME tree.
    pub root: Part,
    /// Bracketed Message-ID.
    pub message_id: String,
    /// Resolved From address.
    pub from: EmailAddress,
    /// To, Cc and Bcc recipients in that order.
    pub recipients: Vec<EmailAddress>,
    /// Remote resource URLs found in the HTML body.
    pub content_locations: Vec<String>,
}

impl AssembledMessage {
    /// Renders the message as RFC 5322 text with CRLF line endings.
    #[must_use]
    pub fn to_rfc5322(&self) -> String {
        let mut out = self.headers.to_string();
        self.root.render(&mut out);
        out
    }

    /// Renders the message as bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_rfc5322().into_bytes()
    }

    /// Leaf parts of the tree, depth-first.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Part> {
        self.root.leaves()
    }
}

/// Builds outgoing MIME messages.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct MessageBuilder {
    x_mailer: Option<String>,
}

impl MessageBuilder {
    /// Creates a builder with no `X-Mailer`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `X-Mailer` value. Blank values are ignored.
    pub fn with_x_mailer(mut self, x_mailer: impl Into<String>) -> Self {
        let x_mailer = x_mailer.into();
        self.x_mailer = (!x_mailer.trim().is_empty()).then_some(x_mailer);
        self
    }

    /// Assembles `request`, reading attachment bytes from `store`.
    ///
    /// Linked attachments whose content id is not referenced by the HTML
    /// body are dropped. Attachments missing from the store are skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if a recipient list does not parse.
    /// - [`Error::MissingSender`] if the resolved From address is blank.
    /// - [`Error::Attachment`] if a cached file exists but cannot be read.
    pub fn build(
        &self,
        request: &ComposeRequest,
        store: &impl AttachmentStore,
    ) -> Result<AssembledMessage> {
        let to = AddressList::parse(&request.to)?;
        let cc = AddressList::parse(&request.cc)?;
        let bcc = AddressList::parse(&request.bcc)?;

        let from = request.sender.from_address().clone();
        if from.email.trim().is_empty() {
            return Err(Error::MissingSender);
        }

        let message_id = new_message_id(&from);
        let headers = self.top_headers(request, &from, [&to, &cc, &bcc], &message_id);

        let (text_parts, prepared) = body_parts(request);
        let mut related = Vec::new();
        related.extend(Part::wrap("alternative", text_parts));
        related.extend(prepared.inline_images.iter().map(|image| {
            binary_part(
                ContentType::parse(&image.content_type)
                    .unwrap_or_else(|_| ContentType::octet_stream()),
                image.data.clone(),
                &image.filename,
                "inline",
            )
            .with_header("Content-ID", format!("<{}>", image.content_id))
        }));

        let mut mixed = Vec::new();
        for attachment in &request.attachments {
            let Some((part, linked)) = attachment_part(attachment, &prepared, request, store)?
            else {
                continue;
            };
            if linked {
                related.push(part);
            } else {
                mixed.push(part);
            }
        }

        let mut top = Vec::new();
        top.extend(Part::wrap("related", related));
        top.extend(mixed);
        let root = Part::wrap("mixed", top)
            .unwrap_or_else(|| Part::text(ContentType::text_plain(), String::new()));

        debug!(
            message_id = %message_id,
            leaves = root.leaves().len(),
            "Assembled message"
        );

        let recipients = to.0.into_iter().chain(cc.0).chain(bcc.0).collect();
        Ok(AssembledMessage {
            headers,
            root,
            message_id,
            from,
            recipients,
            content_locations: prepared.content_locations,
        })
    }

    fn top_headers(
        &self,
        request: &ComposeRequest,
        from: &EmailAddress,
        [to, cc, bcc]: [&AddressList; 3],
        message_id: &str,
    ) -> Headers {
        let mut headers = Headers::new();
        headers.add("Date", chrono::Utc::now().to_rfc2822());
        headers.add("From", from.to_string());
        if !to.is_empty() {
            headers.add("To", to.to_header_value());
        }
        if !cc.is_empty() {
            headers.add("Cc", cc.to_header_value());
        }
        // Bcc only on drafts
        if request.emit_draft_info && !bcc.is_empty() {
            headers.add("Bcc", bcc.to_header_value());
        }
        headers.add("Subject", encode_rfc2047(&request.subject));
        headers.add("Message-ID", message_id);

        if !request.in_reply_to.trim().is_empty() {
            headers.add("In-Reply-To", request.in_reply_to.trim());
        }
        if !request.references.trim().is_empty() {
            headers.add("References", request.references.trim());
        }

        if let Some(importance) = Importance::from_code(request.importance) {
            headers.add("X-Priority", importance.x_priority());
            headers.add("Importance", importance.importance());
        }
        if let Some(value) =
            Sensitivity::from_code(request.sensitivity).and_then(Sensitivity::header_value)
        {
            headers.add("Sensitivity", value);
        }

        if request.reading_confirmation {
            let target = request.sender.confirmation_address().to_string();
            headers.add("Disposition-Notification-To", target.clone());
            headers.add("X-Confirm-Reading-To", target);
        }

        if request.emit_draft_info {
            if let Some(info) = request.draft_info.as_ref().filter(|i| i.is_complete()) {
                headers.add("X-Draft-Info", info.header_value());
            }
        }

        if let Some(x_mailer) = &self.x_mailer {
            headers.add("X-Mailer", x_mailer.clone());
        }
        headers.add("MIME-Version", "1.0");
        headers
    }
}

/// Text parts for the body plus the HTML scan used for attachment linking.
fn body_parts(request: &ComposeRequest) -> (Vec<Part>, PreparedHtml) {
    if !request.is_html {
        let plain = Part::text(ContentType::text_plain(), request.text.clone());
        return (vec![plain], PreparedHtml::default());
    }

    let prepared = prepare_html(&request.text);
    let plain = Part::text(ContentType::text_plain(), html_to_plain(&prepared.html));
    let html = Part::text(ContentType::text_html(), prepared.html.clone());
    (vec![plain, html], prepared)
}

/// Returns the part and whether it belongs in the related group.
fn attachment_part(
    attachment: &AttachmentDescriptor,
    prepared: &PreparedHtml,
    request: &ComposeRequest,
    store: &impl AttachmentStore,
) -> Result<Option<(Part, bool)>> {
    let cid = attachment.trimmed_content_id();
    let found = !cid.is_empty() && prepared.references_cid(cid);

    if attachment.linked && !found {
        debug!(
            file = %attachment.file_name,
            cid = %cid,
            "Dropping linked attachment not referenced by the body"
        );
        return Ok(None);
    }

    let scope = request.attachment_scope.as_str();
    if !store.exists(scope, &attachment.temp_name) {
        warn!(file = %attachment.temp_name, "Attachment missing from cache, skipping");
        return Ok(None);
    }

    let data = store
        .read(scope, &attachment.temp_name)
        .map_err(|source| Error::Attachment {
            name: attachment.temp_name.clone(),
            source,
        })?;

    let file_name = if attachment.file_name.trim().is_empty() {
        attachment.temp_name.as_str()
    } else {
        attachment.file_name.trim()
    };
    let content_type =
        ContentType::parse(&attachment.mime_type()).unwrap_or_else(|_| ContentType::octet_stream());
    let disposition = if attachment.inline { "inline" } else { "attachment" };

    let mut part = binary_part(content_type, data, file_name, disposition);
    if attachment.linked {
        part = part.with_header("Content-ID", format!("<{cid}>"));
    }
    if !attachment.content_location.trim().is_empty() {
        part = part.with_header("Content-Location", attachment.content_location.trim());
    }

    Ok(Some((part, attachment.linked)))
}

fn binary_part(content_type: ContentType, data: Vec<u8>, file_name: &str, disposition: &str) -> Part {
    let encoded_name = encode_rfc2047(file_name);
    let quoted = encoded_name.replace('\\', "\\\\").replace('"', "\\\"");
    Part::binary(content_type.with_parameter("name", encoded_name), data)
        .with_header("Content-Disposition", format!("{disposition}; filename=\"{quoted}\""))
}

fn new_message_id(from: &EmailAddress) -> String {
    let domain = from.domain();
    let domain = if domain.is_empty() || domain == from.email {
        "localhost"
    } else {
        domain
    };
    format!(
        "<{:016x}.{}@{domain}>",
        rand::random::<u64>(),
        chrono::Utc::now().timestamp()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::attachment::MemoryAttachmentStore;

    fn sender() -> SenderContext {
        SenderContext::new(EmailAddress::new("me@example.com"))
    }

    #[test]
    fn test_sender_precedence() {
        let ctx = sender()
            .with_identity(Some(EmailAddress::with_name("Me", "id@example.com")))
            .with_fetcher(Some(EmailAddress::new("fetch@example.net")));
        assert_eq!(ctx.from_address().email, "id@example.com");
        assert_eq!(ctx.confirmation_address().email, "fetch@example.net");

        let ctx = sender().with_fetcher(Some(EmailAddress::new("fetch@example.net")));
        assert_eq!(ctx.from_address().email, "fetch@example.net");

        let ctx = sender().with_identity(Some(EmailAddress::new("id@example.com")));
        assert_eq!(ctx.confirmation_address().email, "me@example.com");
    }

    #[test]
    fn test_codes() {
        assert_eq!(Importance::from_code(3), Some(Importance::Normal));
        assert_eq!(Importance::from_code(7), None);
        assert_eq!(Sensitivity::from_code(0).and_then(Sensitivity::header_value), None);
        assert_eq!(Sensitivity::from_code(4), None);
        assert_eq!(DraftKind::parse("Reply-All"), Some(DraftKind::ReplyAll));
    }

    #[test]
    fn test_draft_info_header_value() {
        let info = DraftInfo::new("reply", "42", "INBOX");
        assert!(info.is_complete());
        assert_eq!(info.header_value(), "type=reply; uid=42; folder=SU5CT1g=");
        assert!(!DraftInfo::new("reply", "", "INBOX").is_complete());
    }

    #[test]
    fn test_disposition_rendering() {
        let part = binary_part(ContentType::octet_stream(), vec![1], "a b.bin", "attachment");
        assert_eq!(
            part.headers.get("Content-Disposition"),
            Some("attachment; filename=\"a b.bin\"")
        );
        assert_eq!(part.content_type.parameter("name"), Some("a b.bin"));
    }

    #[test]
    fn test_message_id_shape() {
        let id = new_message_id(&EmailAddress::new("me@example.com"));
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
    }

    #[test]
    fn test_plain_only_is_single_part() {
        let request = ComposeRequest::new(sender()).to("a@example.com").text_body("hi");
        let message = MessageBuilder::new()
            .build(&request, &MemoryAttachmentStore::new())
            .unwrap();
        assert_eq!(message.root.content_type.mime_type(), "text/plain");
        assert!(message.root.children().is_empty());
    }
}
