//! Message retrieval against a scripted mailbox.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use postern_core::{
    CustomPartData, Error, ErrorKind, ExtensionHooks, ImapTransport, MailConfig, MailboxTransport,
    Message, MessageFetcher, Result, TrustedSenders, UserId,
};
use postern_imap::parser::{Lexer, parse_body_structure};
use postern_imap::{
    BodyStructure, Config, Credentials, FetchAttribute, FetchedMessage, PartInfo, Session, Uid,
};

const HEADER: &[u8] = b"From: Boss <boss@example.com>\r\nTo: me@example.com\r\nSubject: =?utf-8?B?UmFwcG9ydA==?=\r\nDate: Tue, 1 Oct 2024 10:00:00 +0200\r\n\r\n";

fn structure(raw: &str) -> BodyStructure {
    parse_body_structure(&mut Lexer::new(raw.as_bytes())).unwrap()
}

fn text(subtype: &str, charset: &str, encoding: &str, size: u32) -> String {
    format!(
        "(\"TEXT\" \"{subtype}\" (\"CHARSET\" \"{charset}\") NIL NIL \"{encoding}\" {size} 1 NIL NIL NIL NIL)"
    )
}

fn file(media: &str, name: &str, size: u32) -> String {
    let (main, sub) = media.split_once('/').unwrap();
    format!(
        "(\"{main}\" \"{sub}\" (\"NAME\" \"{name}\") NIL NIL \"7BIT\" {size} NIL (\"ATTACHMENT\" (\"FILENAME\" \"{name}\")) NIL NIL)"
    )
}

/// In-memory mailbox that records what the fetcher asked for.
#[derive(Default)]
struct ScriptedMailbox {
    structure: Option<BodyStructure>,
    structure_fails: bool,
    sections: Vec<(&'static str, Vec<u8>)>,
    missing: bool,
    stall: bool,
    examined: Vec<String>,
    requests: Vec<Vec<FetchAttribute>>,
}

impl ScriptedMailbox {
    fn new(structure: Option<BodyStructure>) -> Self {
        Self {
            structure,
            sections: vec![("HEADER", HEADER.to_vec())],
            ..Self::default()
        }
    }

    fn with_section(mut self, section: &'static str, data: &[u8]) -> Self {
        self.sections.push((section, data.to_vec()));
        self
    }

    fn requested(&self) -> &[FetchAttribute] {
        &self.requests[0]
    }
}

impl MailboxTransport for ScriptedMailbox {
    async fn examine_folder(&mut self, folder: &str) -> Result<()> {
        self.examined.push(folder.to_string());
        if self.stall {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn fetch_structure(&mut self, _uid: Uid) -> Result<Option<BodyStructure>> {
        if self.structure_fails {
            return Err(postern_imap::Error::No("BODYSTRUCTURE unavailable".into()).into());
        }
        Ok(self.structure.clone())
    }

    async fn fetch_items(
        &mut self,
        uid: Uid,
        items: &[FetchAttribute],
    ) -> Result<Option<FetchedMessage>> {
        self.requests.push(items.to_vec());
        if self.missing {
            return Ok(None);
        }
        let mut message = FetchedMessage {
            uid: Some(uid),
            size: Some(4096),
            ..FetchedMessage::default()
        };
        for (section, data) in &self.sections {
            message.sections.insert(section.to_uppercase(), data.clone());
        }
        Ok(Some(message))
    }
}

fn fetcher() -> MessageFetcher {
    MessageFetcher::new(UserId(1), MailConfig::default())
}

#[tokio::test]
async fn oversized_text_part_is_fetched_truncated() {
    let mut mailbox = ScriptedMailbox::new(Some(structure(&text("PLAIN", "utf-8", "7BIT", 620_000))))
        .with_section("1", b"first 600000 bytes");

    let message = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 42, None)
        .await
        .unwrap();

    assert!(mailbox.requested().contains(&FetchAttribute::peek_truncated("1", 600_000)));
    assert_eq!(mailbox.examined, vec!["INBOX"]);
    assert!(message.body_truncated);
    assert_eq!(message.plain.as_deref(), Some("first 600000 bytes"));
    assert_eq!(message.headers.subject, "Rapport");
    assert_eq!(message.uid, Uid::new(42));
    assert!(message.headers.sent_at.is_some());
}

#[tokio::test]
async fn text_part_under_limit_is_fetched_whole() {
    let mut mailbox = ScriptedMailbox::new(Some(structure(&text("PLAIN", "utf-8", "7BIT", 500_000))))
        .with_section("1", b"all of it");

    let message = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 42, None)
        .await
        .unwrap();

    assert!(mailbox.requested().contains(&FetchAttribute::peek("1")));
    assert!(!message.body_truncated);
}

#[tokio::test]
async fn html_is_decoded_and_attachments_listed() {
    let raw = format!(
        "(({}{} \"ALTERNATIVE\"){} \"MIXED\")",
        text("PLAIN", "utf-8", "7BIT", 10),
        text("HTML", "iso-8859-1", "QUOTED-PRINTABLE", 20),
        file("APPLICATION/PDF", "r.pdf", 5000),
    );
    let mut mailbox =
        ScriptedMailbox::new(Some(structure(&raw))).with_section("1.2", b"<p>caf=E9</p>");

    let message = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 7, None)
        .await
        .unwrap();

    assert_eq!(message.html.as_deref(), Some("<p>café</p>"));
    assert!(message.plain.is_none());
    assert!(!mailbox.requested().contains(&FetchAttribute::peek("2")));
    assert!(!mailbox.requested().contains(&FetchAttribute::peek("1.1")));

    let names: Vec<_> = message
        .attachments
        .iter()
        .map(|a| a.filename.as_deref().unwrap())
        .collect();
    assert_eq!(names, vec!["r.pdf"]);
}

#[tokio::test]
async fn nested_message_fetches_only_its_first_text_part() {
    let inner = format!(
        "({}{} \"MIXED\")",
        text("PLAIN", "utf-8", "7BIT", 10),
        text("PLAIN", "utf-8", "7BIT", 10)
    );
    let raw = format!(
        "({} (\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 900 (NIL NIL NIL NIL NIL NIL NIL NIL NIL NIL) {inner} 40) \"MIXED\")",
        text("PLAIN", "utf-8", "7BIT", 10)
    );
    let mut mailbox = ScriptedMailbox::new(Some(structure(&raw)))
        .with_section("2.HEADER", b"Subject: inner\r\n\r\n")
        .with_section("2.1", b"forwarded text");

    let message = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 7, Some("2"))
        .await
        .unwrap();

    let requested = mailbox.requested();
    assert!(requested.contains(&FetchAttribute::peek("2.HEADER")));
    assert!(requested.contains(&FetchAttribute::peek("2.1")));
    assert!(!requested.contains(&FetchAttribute::peek("2.2")));
    assert!(!requested.contains(&FetchAttribute::peek("1")));
    assert_eq!(message.headers.subject, "inner");
    assert_eq!(message.plain.as_deref(), Some("forwarded text"));
    assert_eq!(message.nested_part.as_deref(), Some("2"));
}

#[tokio::test]
async fn empty_structure_yields_headers_only() {
    let mut mailbox = ScriptedMailbox::new(None);

    let message = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 3, None)
        .await
        .unwrap();

    assert_eq!(mailbox.requested().last(), Some(&FetchAttribute::BodyStructure));
    assert!(message.has_no_body());
    assert_eq!(message.from_email(), Some("boss@example.com"));
    assert_eq!(message.headers.to.len(), 1);
}

#[tokio::test]
async fn structure_failure_is_not_fatal() {
    let mut mailbox = ScriptedMailbox {
        structure_fails: true,
        ..ScriptedMailbox::new(None)
    };

    let message = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 3, None)
        .await
        .unwrap();
    assert!(message.has_no_body());
    assert_eq!(message.headers.subject, "Rapport");
}

#[tokio::test]
async fn unknown_uid_is_not_found() {
    let mut mailbox = ScriptedMailbox {
        missing: true,
        ..ScriptedMailbox::new(None)
    };

    let err = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 99, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn invalid_arguments_never_reach_the_server() {
    let mut mailbox = ScriptedMailbox::new(None);
    let fetcher = fetcher();

    for (folder, uid, nested) in [("", 1, None), ("INBOX", 0, None), ("INBOX", 1, Some("a.1"))] {
        let err = fetcher
            .fetch_message(&mut mailbox, folder, uid, nested)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
    assert!(mailbox.examined.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_round_trip_is_cancelled() {
    let mut mailbox = ScriptedMailbox {
        stall: true,
        ..ScriptedMailbox::new(None)
    };
    let config = MailConfig::default().round_trip_timeout(Duration::from_secs(5));

    let err = MessageFetcher::new(UserId(1), config)
        .fetch_message(&mut mailbox, "INBOX", 1, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(d) if d == Duration::from_secs(5)));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn trusted_sender_may_show_images() {
    let mut trusted = TrustedSenders::new();
    trusted.insert(UserId(1), "BOSS@example.com");
    let fetcher = fetcher().with_trust(trusted);

    let mut mailbox = ScriptedMailbox::new(None);
    let message = fetcher
        .fetch_message(&mut mailbox, "INBOX", 1, None)
        .await
        .unwrap();
    assert!(message.safe_sender);

    let other_user = MessageFetcher::new(UserId(2), MailConfig::default());
    let message = other_user
        .fetch_message(&mut mailbox, "INBOX", 1, None)
        .await
        .unwrap();
    assert!(!message.safe_sender);

    let always = MessageFetcher::new(UserId(2), MailConfig::default().always_show_images(true));
    let message = always
        .fetch_message(&mut mailbox, "INBOX", 1, None)
        .await
        .unwrap();
    assert!(message.safe_sender);
}

#[tokio::test]
async fn detached_signature_is_fetched() {
    let raw = format!(
        "({}{} \"SIGNED\")",
        text("PLAIN", "utf-8", "7BIT", 10),
        file("APPLICATION/PGP-SIGNATURE", "signature.asc", 300)
    );
    let mut mailbox = ScriptedMailbox::new(Some(structure(&raw)))
        .with_section("1", b"signed text")
        .with_section("2", b"-----BEGIN PGP SIGNATURE-----");

    let message = fetcher()
        .fetch_message(&mut mailbox, "INBOX", 1, None)
        .await
        .unwrap();

    assert_eq!(message.signatures.len(), 1);
    assert_eq!(message.signatures[0].filename, "signature.asc");
    assert_eq!(message.signatures[0].armored, "-----BEGIN PGP SIGNATURE-----");
}

/// Asks for `application/pgp-keys` parts and stores them on the message.
struct KeyImport {
    fail: bool,
}

impl ExtensionHooks for KeyImport {
    fn on_body_structure_parts(&self, parts: &[PartInfo]) -> Vec<String> {
        parts
            .iter()
            .filter(|p| p.mime_type == "application/pgp-keys")
            .map(|p| p.part_id.clone())
            .collect()
    }

    fn on_message_assembled(&self, parts: &[CustomPartData], message: &mut Message) -> Result<()> {
        if self.fail {
            return Err(Error::InvalidInput("key rejected".into()));
        }
        message
            .extensions
            .insert("keys".into(), serde_json::json!(parts[0].data));
        Ok(())
    }
}

#[tokio::test]
async fn hooks_receive_nominated_parts() {
    let raw = format!(
        "({}{} \"MIXED\")",
        text("PLAIN", "utf-8", "7BIT", 10),
        file("APPLICATION/PGP-KEYS", "key.txt", 100)
    );
    let mailbox = || {
        ScriptedMailbox::new(Some(structure(&raw)))
            .with_section("1", b"hello")
            .with_section("2", b"KEYDATA")
    };

    let mut ok = mailbox();
    let message = fetcher()
        .with_hooks(KeyImport { fail: false })
        .fetch_message(&mut ok, "INBOX", 1, None)
        .await
        .unwrap();
    assert!(ok.requested().contains(&FetchAttribute::peek("2")));
    assert_eq!(message.extensions["keys"], serde_json::json!("KEYDATA"));

    let mut failing = mailbox();
    let message = fetcher()
        .with_hooks(KeyImport { fail: true })
        .fetch_message(&mut failing, "INBOX", 1, None)
        .await
        .unwrap();
    assert!(message.extensions.is_empty());
    assert_eq!(message.plain.as_deref(), Some("hello"));
}

/// Records how many parts each assembled message carried.
struct PartCount;

impl ExtensionHooks for PartCount {
    fn on_body_structure_parts(&self, parts: &[PartInfo]) -> Vec<String> {
        parts
            .iter()
            .filter(|p| p.mime_type == "application/pgp-keys")
            .map(|p| p.part_id.clone())
            .collect()
    }

    fn on_message_assembled(&self, parts: &[CustomPartData], message: &mut Message) -> Result<()> {
        let data: Vec<&str> = parts.iter().map(|p| p.data.as_str()).collect();
        message
            .extensions
            .insert("parts".into(), serde_json::json!(data));
        Ok(())
    }
}

#[tokio::test]
async fn assembled_hook_runs_without_nominated_parts() {
    let raw = text("PLAIN", "utf-8", "7BIT", 10);
    let mut mailbox = ScriptedMailbox::new(Some(structure(&raw))).with_section("1", b"hello");

    let message = fetcher()
        .with_hooks(PartCount)
        .fetch_message(&mut mailbox, "INBOX", 1, None)
        .await
        .unwrap();
    assert_eq!(message.extensions["parts"], serde_json::json!([]));

    let mut headers_only = ScriptedMailbox::new(None);
    let message = fetcher()
        .with_hooks(PartCount)
        .fetch_message(&mut headers_only, "INBOX", 2, None)
        .await
        .unwrap();
    assert!(message.has_no_body());
    assert_eq!(message.extensions["parts"], serde_json::json!([]));
}

#[tokio::test]
async fn unreturned_nominated_part_arrives_empty() {
    let raw = format!(
        "({}{} \"MIXED\")",
        text("PLAIN", "utf-8", "7BIT", 10),
        file("APPLICATION/PGP-KEYS", "key.txt", 100)
    );
    // section 2 is requested but never answered
    let mut mailbox = ScriptedMailbox::new(Some(structure(&raw))).with_section("1", b"hello");

    let message = fetcher()
        .with_hooks(PartCount)
        .fetch_message(&mut mailbox, "INBOX", 1, None)
        .await
        .unwrap();
    assert!(mailbox.requested().contains(&FetchAttribute::peek("2")));
    assert_eq!(message.extensions["parts"], serde_json::json!([""]));
    assert_eq!(message.plain.as_deref(), Some("hello"));
}

/// Replays server bytes and records client writes.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pos = usize::try_from(self.responses.position()).unwrap();
        let data = self.responses.get_ref();
        let n = data.len().saturating_sub(pos).min(buf.remaining());
        buf.put_slice(&data[pos..pos + n]);
        self.responses.set_position((pos + n) as u64);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn fetch_over_imap_session() {
    let raw = format!(
        "({}{} \"MIXED\")",
        text("PLAIN", "utf-8", "BASE64", 12),
        file("APPLICATION/PDF", "r.pdf", 5000)
    );
    let script = format!(
        concat!(
            "* OK ready\r\n",
            "A0001 OK logged in\r\n",
            "* 1 EXISTS\r\n",
            "A0002 OK [READ-ONLY] done\r\n",
            "* 1 FETCH (UID 5 BODYSTRUCTURE {})\r\n",
            "A0003 OK done\r\n",
            "* 1 FETCH (UID 5 RFC822.SIZE 5300 FLAGS () BODY[HEADER] {{20}}\r\n",
            "Subject: Invoice\r\n\r\n",
            " BODY[1] {{12}}\r\nSGVsbG8gdGhl)\r\n",
            "A0004 OK done\r\n",
        ),
        raw
    );
    let sent = Arc::new(Mutex::new(Vec::new()));
    let stream = MockStream {
        responses: Cursor::new(script.into_bytes()),
        sent: Arc::clone(&sent),
    };
    let session = Session::from_stream(
        stream,
        &Config::new("imap.example.com"),
        &Credentials::new("me", "pw"),
    )
    .await
    .unwrap();
    let mut transport = ImapTransport::new(session);

    let message = fetcher()
        .fetch_message(&mut transport, "INBOX", 5, None)
        .await
        .unwrap();

    assert_eq!(message.headers.subject, "Invoice");
    assert_eq!(message.plain.as_deref(), Some("Hello the"));
    assert_eq!(message.size, Some(5300));
    assert_eq!(message.attachments.len(), 1);

    let wire = String::from_utf8(sent.lock().unwrap().clone()).unwrap();
    assert!(wire.contains("A0002 EXAMINE INBOX\r\n"));
    assert!(wire.contains("A0003 UID FETCH 5 BODYSTRUCTURE\r\n"));
    assert!(wire.contains("BODY.PEEK[HEADER] BODY.PEEK[1])\r\n"));
    assert!(!wire.contains("BODY.PEEK[2]"));
    assert!(!wire.contains("\\Seen"));
}

#[tokio::test]
async fn unreadable_structure_falls_back_to_headers() {
    let broken = "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"7BIT\" abc 1)";
    let script = format!(
        concat!(
            "* OK ready\r\n",
            "A0001 OK logged in\r\n",
            "A0002 OK [READ-ONLY] done\r\n",
            "* 1 FETCH (UID 5 BODYSTRUCTURE {0})\r\n",
            "A0003 OK done\r\n",
            "* 1 FETCH (UID 5 FLAGS () BODY[HEADER] {{20}}\r\n",
            "Subject: Invoice\r\n\r\n",
            " BODYSTRUCTURE {0})\r\n",
            "A0004 OK done\r\n",
        ),
        broken
    );
    let sent = Arc::new(Mutex::new(Vec::new()));
    let stream = MockStream {
        responses: Cursor::new(script.into_bytes()),
        sent: Arc::clone(&sent),
    };
    let session = Session::from_stream(
        stream,
        &Config::new("imap.example.com"),
        &Credentials::new("me", "pw"),
    )
    .await
    .unwrap();
    let mut transport = ImapTransport::new(session);

    let message = fetcher()
        .fetch_message(&mut transport, "INBOX", 5, None)
        .await
        .unwrap();

    assert!(message.has_no_body());
    assert_eq!(message.headers.subject, "Invoice");
    let wire = String::from_utf8(sent.lock().unwrap().clone()).unwrap();
    assert_eq!(wire.matches("BODYSTRUCTURE").count(), 2);
}
