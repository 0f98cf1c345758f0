//! End-to-end tests for outgoing message assembly.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use postern_mime::{
    AttachmentDescriptor, ComposeRequest, DraftInfo, EmailAddress, Error, MemoryAttachmentStore,
    MessageBuilder, Part, SenderContext,
};

const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";
const GIF: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

fn sender() -> SenderContext {
    SenderContext::new(EmailAddress::with_name("Account", "account@example.com"))
}

fn store() -> MemoryAttachmentStore {
    let mut store = MemoryAttachmentStore::new();
    store.insert("u1", "tmp-logo", b"logo-bytes".to_vec());
    store.insert("u1", "tmp-report", b"%PDF-1.4".to_vec());
    store.insert("u1", "tmp-chart", b"chart-bytes".to_vec());
    store
}

fn mime_types(parts: &[&Part]) -> Vec<String> {
    parts.iter().map(|p| p.content_type.mime_type()).collect()
}

fn text_of(message: &postern_mime::AssembledMessage, sub_type: &str) -> String {
    message
        .leaves()
        .into_iter()
        .find_map(|p| match &p.body {
            postern_mime::PartBody::Text(text) if p.content_type.sub_type == sub_type => {
                Some(text.clone())
            }
            _ => None,
        })
        .unwrap()
}

#[test]
fn html_with_data_images_and_attachments_has_full_layout() {
    let html = format!(
        "<p>Hi</p><img src=\"data:image/png;base64,{PNG}\"><img src=\"data:image/gif;base64,{GIF}\"><img src=\"cid:logo@local\">"
    );
    let request = ComposeRequest::new(sender())
        .to("alice@example.com")
        .subject("Report")
        .html_body(html)
        .attachment_scope("u1")
        .attach(AttachmentDescriptor::new("tmp-logo", "logo.png").linked_as("<logo@local>"))
        .attach(AttachmentDescriptor::new("tmp-report", "report.pdf"));

    let message = MessageBuilder::new().build(&request, &store()).unwrap();

    assert_eq!(message.root.content_type.mime_type(), "multipart/mixed");
    let top = message.root.children();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].content_type.mime_type(), "multipart/related");
    assert_eq!(top[1].content_type.mime_type(), "application/pdf");

    let related = top[0].children();
    assert_eq!(related[0].content_type.mime_type(), "multipart/alternative");
    assert_eq!(
        mime_types(&related[0].leaves()),
        vec!["text/plain", "text/html"]
    );
    // two data-URL images then the linked logo
    assert_eq!(related.len(), 4);
    assert_eq!(related[3].content_id(), Some("<logo@local>"));
}

#[test]
fn each_data_image_gets_one_part_and_one_reference() {
    let html = format!(
        "<img src=\"data:image/png;base64,{PNG}\"><img src=\"data:image/gif;base64,{GIF}\"><img src=\"data:image/png;base64,{GIF}\">"
    );
    let request = ComposeRequest::new(sender())
        .to("alice@example.com")
        .html_body(html);
    let message = MessageBuilder::new()
        .build(&request, &MemoryAttachmentStore::new())
        .unwrap();

    let inline: Vec<&Part> = message
        .leaves()
        .into_iter()
        .filter(|p| p.content_type.main_type == "image")
        .collect();
    assert_eq!(inline.len(), 3);

    let html = text_of(&message, "html");
    assert!(!html.contains("data:image"));

    for part in inline {
        let cid = part.content_id().unwrap();
        let bare = cid.trim_start_matches('<').trim_end_matches('>');
        assert_eq!(html.matches(&format!("cid:{bare}")).count(), 1);
        assert!(
            part.headers
                .get("Content-Disposition")
                .unwrap()
                .starts_with("inline")
        );
    }
}

#[test]
fn unreferenced_linked_attachment_is_dropped_deterministically() {
    let request = ComposeRequest::new(sender())
        .to("alice@example.com")
        .html_body("<p>no images here</p>")
        .attachment_scope("u1")
        .attach(AttachmentDescriptor::new("tmp-chart", "chart.png").linked_as("chart@local"))
        .attach(AttachmentDescriptor::new("tmp-report", "report.pdf"));

    let builder = MessageBuilder::new();
    let first = builder.build(&request, &store()).unwrap();
    let second = builder.build(&request, &store()).unwrap();

    let first_types = mime_types(&first.leaves());
    assert_eq!(
        first_types,
        vec!["text/plain", "text/html", "application/pdf"]
    );
    assert_eq!(first_types, mime_types(&second.leaves()));
    assert!(first.leaves().iter().all(|p| p.content_id().is_none()));
}

#[test]
fn missing_cached_file_is_skipped() {
    let request = ComposeRequest::new(sender())
        .to("alice@example.com")
        .text_body("see attached")
        .attachment_scope("other-user")
        .attach(AttachmentDescriptor::new("tmp-report", "report.pdf"));

    let message = MessageBuilder::new().build(&request, &store()).unwrap();
    assert_eq!(message.root.content_type.mime_type(), "text/plain");
}

#[test]
fn importance_and_sensitivity_outside_range_are_dropped() {
    let build = |importance, sensitivity| {
        let request = ComposeRequest::new(sender())
            .to("alice@example.com")
            .importance(importance)
            .sensitivity(sensitivity);
        MessageBuilder::new()
            .build(&request, &MemoryAttachmentStore::new())
            .unwrap()
    };

    let message = build(7, 9);
    assert!(message.headers.get("X-Priority").is_none());
    assert!(message.headers.get("Importance").is_none());
    assert!(message.headers.get("Sensitivity").is_none());

    let message = build(3, 1);
    assert_eq!(message.headers.get("X-Priority"), Some("3 (Normal)"));
    assert_eq!(message.headers.get("Sensitivity"), Some("Company-Confidential"));

    let message = build(1, 0);
    assert_eq!(message.headers.get("X-Priority"), Some("1 (Highest)"));
    assert!(message.headers.get("Sensitivity").is_none());
}

#[test]
fn invalid_recipient_fails_before_assembly() {
    let request = ComposeRequest::new(sender()).to("alice@example.com, bogus");
    let err = MessageBuilder::new()
        .build(&request, &MemoryAttachmentStore::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));
}

#[test]
fn recipients_and_sender_headers() {
    let ctx = sender()
        .with_identity(Some(EmailAddress::with_name("Identity", "id@example.com")))
        .with_fetcher(Some(EmailAddress::new("fetcher@example.net")));
    let request = ComposeRequest::new(ctx)
        .to("a@example.com")
        .cc("")
        .bcc("hidden@example.com")
        .reading_confirmation(true)
        .with_draft_info_header(false);

    let message = MessageBuilder::new()
        .with_x_mailer("postern")
        .build(&request, &MemoryAttachmentStore::new())
        .unwrap();

    assert_eq!(message.headers.get_all("From"), vec!["Identity <id@example.com>"]);
    assert!(message.headers.get("Cc").is_none());
    assert!(message.headers.get("Bcc").is_none());
    assert_eq!(message.recipients.len(), 2);
    assert_eq!(
        message.headers.get("Disposition-Notification-To"),
        Some("fetcher@example.net")
    );
    assert_eq!(message.headers.get("X-Mailer"), Some("postern"));
    assert!(message.message_id.starts_with('<') && message.message_id.ends_with("@example.com>"));

    let rendered = message.to_rfc5322();
    assert!(!rendered.contains("hidden@example.com"));
    assert!(rendered.contains("MIME-Version: 1.0\r\n"));
}

#[test]
fn draft_info_only_when_complete_and_requested() {
    let base = ComposeRequest::new(sender())
        .to("a@example.com")
        .thread("<orig@example.com>", "<root@example.com> <orig@example.com>");

    let complete = base
        .clone()
        .draft_info(DraftInfo::new("reply", "17", "INBOX"));
    let builder = MessageBuilder::new();
    let store = MemoryAttachmentStore::new();

    let saved = builder.build(&complete, &store).unwrap();
    assert_eq!(
        saved.headers.get("X-Draft-Info"),
        Some("type=reply; uid=17; folder=SU5CT1g=")
    );
    assert_eq!(saved.headers.get("In-Reply-To"), Some("<orig@example.com>"));

    let sent = builder
        .build(&complete.clone().with_draft_info_header(false), &store)
        .unwrap();
    assert!(sent.headers.get("X-Draft-Info").is_none());
    assert!(sent.headers.get("References").is_some());

    let partial = base.draft_info(DraftInfo::new("reply", "", "INBOX"));
    let built = builder.build(&partial, &store).unwrap();
    assert!(built.headers.get("X-Draft-Info").is_none());
}

#[test]
fn non_ascii_subject_and_filename_are_encoded() {
    let request = ComposeRequest::new(sender())
        .to("a@example.com")
        .subject("Résumé")
        .attachment_scope("u1")
        .attach(AttachmentDescriptor::new("tmp-report", "résumé.pdf"));
    let message = MessageBuilder::new().build(&request, &store()).unwrap();

    assert!(message.headers.get("Subject").unwrap().starts_with("=?utf-8?B?"));
    let rendered = message.to_rfc5322();
    assert!(rendered.is_ascii());
    assert!(rendered.contains("filename=\"=?utf-8?B?"));
}

#[test]
fn plain_alternative_carries_no_image_payload() {
    let request = ComposeRequest::new(sender())
        .to("alice@example.com")
        .html_body(format!(
            "<p>Hi</p><img src=\"data:image/png;base64,{PNG}\"><img src=\"cid:logo@local\">"
        ));
    let message = MessageBuilder::new()
        .build(&request, &MemoryAttachmentStore::new())
        .unwrap();

    let plain = text_of(&message, "plain");
    assert!(plain.contains("Hi"));
    assert!(!plain.contains("data:"));
    assert!(!plain.contains(PNG));
    assert!(!plain.contains("cid:"));
}

#[test]
fn linked_cid_must_match_exactly() {
    let build = |body_cid: &str, attachment_cid: &str| {
        let request = ComposeRequest::new(sender())
            .to("alice@example.com")
            .html_body(format!("<img src=\"cid:{body_cid}\">"))
            .attachment_scope("u1")
            .attach(AttachmentDescriptor::new("tmp-logo", "logo.png").linked_as(attachment_cid));
        let message = MessageBuilder::new().build(&request, &store()).unwrap();
        let leaves = message.leaves();
        leaves
            .iter()
            .filter_map(|p| p.content_id().map(str::to_string))
            .collect::<Vec<_>>()
    };

    assert_eq!(build("logo@local", " <logo@local> "), vec!["<logo@local>"]);
    // a case difference drops the attachment
    assert!(build("Logo@Local", "<logo@local>").is_empty());
}

#[test]
fn bcc_is_kept_on_drafts_only() {
    let request = ComposeRequest::new(sender())
        .to("a@example.com")
        .bcc("Hidden <hidden@example.com>");
    let builder = MessageBuilder::new();
    let store = MemoryAttachmentStore::new();

    let draft = builder.build(&request, &store).unwrap();
    assert_eq!(draft.headers.get("Bcc"), Some("Hidden <hidden@example.com>"));
    assert!(draft.to_rfc5322().contains("hidden@example.com"));

    let sent = builder
        .build(&request.with_draft_info_header(false), &store)
        .unwrap();
    assert!(sent.headers.get("Bcc").is_none());
    assert!(!sent.to_rfc5322().contains("hidden@example.com"));
    assert_eq!(sent.recipients.len(), 2);
}
