//! Send and save-draft flows with recording backends.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use postern_core::{
    Account, ComposeService, Error, ErrorKind, ExtensionHooks, FlagStore, MailConfig,
    MailDelivery, Result, SendOptions, UserId, resolve_sender,
};
use postern_imap::{Flag, Uid};
use postern_mime::{
    AssembledMessage, AttachmentDescriptor, ComposeRequest, DraftInfo, MemoryAttachmentStore,
};

#[derive(Default)]
struct RecordingDelivery {
    sent: Vec<(AssembledMessage, SendOptions)>,
    drafts: Vec<(AssembledMessage, String, Option<Uid>)>,
    reject: bool,
}

impl MailDelivery for RecordingDelivery {
    async fn send(&mut self, message: &AssembledMessage, options: &SendOptions) -> Result<()> {
        if self.reject {
            return Err(Error::Delivery("relay denied".into()));
        }
        self.sent.push((message.clone(), options.clone()));
        Ok(())
    }

    async fn save_draft(
        &mut self,
        message: &AssembledMessage,
        folder: &str,
        replace: Option<Uid>,
    ) -> Result<Option<Uid>> {
        self.drafts
            .push((message.clone(), folder.to_string(), replace));
        Ok(Uid::new(100))
    }
}

#[derive(Default)]
struct RecordingFlags {
    added: Vec<(String, Uid, Vec<Flag>)>,
    fail_folder: Option<String>,
}

impl FlagStore for RecordingFlags {
    async fn add_flags(&mut self, folder: &str, uid: Uid, flags: &[Flag]) -> Result<()> {
        if self.fail_folder.as_deref() == Some(folder) {
            return Err(postern_imap::Error::No("no such folder".into()).into());
        }
        self.added.push((folder.to_string(), uid, flags.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
struct UsedEmails(Mutex<Vec<BTreeMap<String, String>>>);

impl ExtensionHooks for &UsedEmails {
    fn on_emails_used(&self, emails: &BTreeMap<String, String>) -> Result<()> {
        self.0.lock().unwrap().push(emails.clone());
        Ok(())
    }
}

fn service() -> ComposeService<MemoryAttachmentStore> {
    let mut store = MemoryAttachmentStore::new();
    store.insert("7", "upload-1", b"%PDF".to_vec());
    ComposeService::new(&MailConfig::default(), store)
}

fn reply() -> ComposeRequest {
    let account = Account::new(1, UserId(7), "me@example.com").friendly_name("Me");
    ComposeRequest::new(resolve_sender(&account, None, None))
        .to("Alice <ALICE@example.com>, bob@example.com")
        .subject("Re: plans")
        .text_body("sounds good")
        .attachment_scope("7")
        .attach(AttachmentDescriptor::new("upload-1", "plan.pdf"))
        .thread("<orig@example.com>", "<orig@example.com>")
        .draft_info(DraftInfo::new("reply", "31", "INBOX"))
}

#[tokio::test]
async fn send_flags_original_and_reports_recipients() {
    let used = UsedEmails::default();
    let service = service().with_hooks(&used);
    let mut delivery = RecordingDelivery::default();
    let mut flags = RecordingFlags::default();
    let options = SendOptions::new()
        .sent_folder("Sent")
        .confirming("INBOX", Uid::new(30).unwrap());

    let message = service
        .send(&reply(), &options, &mut delivery, &mut flags)
        .await
        .unwrap();

    assert_eq!(delivery.sent.len(), 1);
    assert_eq!(delivery.sent[0].1.sent_folder.as_deref(), Some("Sent"));
    assert!(message.headers.get("X-Draft-Info").is_none());
    assert_eq!(message.headers.get("X-Mailer"), Some("postern"));
    assert_eq!(message.headers.get("In-Reply-To"), Some("<orig@example.com>"));

    assert_eq!(
        flags.added,
        vec![
            ("INBOX".to_string(), Uid::new(31).unwrap(), vec![Flag::Answered]),
            ("INBOX".to_string(), Uid::new(30).unwrap(), vec![Flag::ReadConfirm]),
        ]
    );

    let used = used.0.lock().unwrap();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].get("alice@example.com").map(String::as_str), Some("Alice"));
    assert_eq!(used[0].get("bob@example.com").map(String::as_str), Some(""));
}

#[tokio::test]
async fn flagging_failure_does_not_fail_send() {
    let mut delivery = RecordingDelivery::default();
    let mut flags = RecordingFlags {
        fail_folder: Some("INBOX".into()),
        ..RecordingFlags::default()
    };
    let request = reply().draft_info(DraftInfo::new("forward", "31", "INBOX"));

    service()
        .send(&request, &SendOptions::new(), &mut delivery, &mut flags)
        .await
        .unwrap();

    assert_eq!(delivery.sent.len(), 1);
    assert!(flags.added.is_empty());
}

#[tokio::test]
async fn rejected_delivery_skips_follow_up() {
    let mut delivery = RecordingDelivery {
        reject: true,
        ..RecordingDelivery::default()
    };
    let mut flags = RecordingFlags::default();

    let err = service()
        .send(&reply(), &SendOptions::new(), &mut delivery, &mut flags)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Delivery(_)));
    assert!(flags.added.is_empty());
}

#[tokio::test]
async fn draft_keeps_draft_info() {
    let mut delivery = RecordingDelivery::default();

    let uid = service()
        .save_draft(&reply(), "Drafts", Uid::new(12), &mut delivery)
        .await
        .unwrap();

    assert_eq!(uid, Uid::new(100));
    let (message, folder, replace) = &delivery.drafts[0];
    assert_eq!(folder, "Drafts");
    assert_eq!(*replace, Uid::new(12));
    assert!(message.headers.get("X-Draft-Info").unwrap().starts_with("type=reply; uid=31;"));
    assert_eq!(message.root.content_type.mime_type(), "multipart/mixed");
}

#[tokio::test]
async fn bcc_is_kept_on_the_draft_only() {
    let request = reply().bcc("Hidden <hidden@example.com>");
    let mut delivery = RecordingDelivery::default();
    let mut flags = RecordingFlags::default();
    let service = service();

    service
        .save_draft(&request, "Drafts", None, &mut delivery)
        .await
        .unwrap();
    let sent = service
        .send(&request, &SendOptions::new(), &mut delivery, &mut flags)
        .await
        .unwrap();

    let draft = &delivery.drafts[0].0;
    assert_eq!(draft.headers.get("Bcc"), Some("Hidden <hidden@example.com>"));
    assert!(sent.headers.get("Bcc").is_none());
    assert!(!String::from_utf8(sent.to_bytes()).unwrap().contains("hidden@"));
    assert!(sent.recipients.iter().any(|r| r.email == "hidden@example.com"));
}

#[tokio::test]
async fn draft_needs_a_folder() {
    let mut delivery = RecordingDelivery::default();

    let err = service()
        .save_draft(&reply(), "  ", None, &mut delivery)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(delivery.drafts.is_empty());
}

#[tokio::test]
async fn bad_recipient_fails_before_delivery() {
    let mut delivery = RecordingDelivery::default();
    let mut flags = RecordingFlags::default();
    let request = reply().to("not an address");

    let err = service()
        .send(&request, &SendOptions::new(), &mut delivery, &mut flags)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(delivery.sent.is_empty());
}
