//! The fetched message view.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use postern_imap::{Flags, PartInfo, SeqNum, Uid};
use postern_mime::{AddressList, Headers};

/// Headers a client needs to render a message, decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Subject, RFC 2047 decoded.
    pub subject: String,
    /// From.
    pub from: AddressList,
    /// To.
    pub to: AddressList,
    /// Cc.
    pub cc: AddressList,
    /// Bcc, present on sent and draft copies only.
    pub bcc: AddressList,
    /// Reply-To.
    pub reply_to: AddressList,
    /// `Date` as sent.
    pub date: Option<String>,
    /// `Date` parsed, if it is valid RFC 2822.
    pub sent_at: Option<DateTime<FixedOffset>>,
    /// Message-ID.
    pub message_id: Option<String>,
    /// In-Reply-To.
    pub in_reply_to: Option<String>,
    /// References.
    pub references: Option<String>,
    /// Reading confirmation requested to this address.
    pub read_confirmation_to: Option<String>,
    /// Every header, raw.
    pub raw: Headers,
}

impl MessageHeaders {
    /// Parses a raw header block. Malformed addresses are skipped.
    #[must_use]
    pub fn parse(block: &[u8]) -> Self {
        let raw = Headers::parse(&String::from_utf8_lossy(block));
        let addresses = |name: &str| {
            raw.get_all(name)
                .into_iter()
                .map(AddressList::parse_lenient)
                .fold(AddressList::default(), |mut acc, list| {
                    acc.0.extend(list.0);
                    acc
                })
        };
        let text = |name: &str| {
            raw.get(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let date = text("Date");
        let sent_at = date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok());

        Self {
            subject: raw.get_decoded("Subject").unwrap_or_default(),
            from: addresses("From"),
            to: addresses("To"),
            cc: addresses("Cc"),
            bcc: addresses("Bcc"),
            reply_to: addresses("Reply-To"),
            date,
            sent_at,
            message_id: text("Message-ID"),
            in_reply_to: text("In-Reply-To"),
            references: text("References"),
            read_confirmation_to: text("Disposition-Notification-To")
                .or_else(|| text("X-Confirm-Reading-To")),
            raw,
        }
    }
}

/// A detached signature (`.asc`) fetched with the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    /// Section number.
    pub part_id: String,
    /// File name.
    pub filename: String,
    /// Decoded, armored text.
    pub armored: String,
}

/// A message as returned to the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Folder the message lives in.
    pub folder: String,
    /// UID.
    pub uid: Option<Uid>,
    /// Sequence number at fetch time.
    pub seq: Option<SeqNum>,
    /// RFC822 size.
    pub size: Option<u32>,
    /// Internal date as sent by the server.
    pub internal_date: Option<String>,
    /// Flags.
    pub flags: Flags,
    /// Section of the encapsulated message shown, if any.
    pub nested_part: Option<String>,
    /// Decoded headers.
    pub headers: MessageHeaders,
    /// Plain text body.
    pub plain: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// True if a text part was fetched truncated.
    pub body_truncated: bool,
    /// Parts shown as files.
    pub attachments: Vec<PartInfo>,
    /// Detached signatures.
    pub signatures: Vec<DetachedSignature>,
    /// Remote images may be shown without asking.
    pub safe_sender: bool,
    /// Data added by extension hooks.
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Message {
    /// First From address, trimmed.
    #[must_use]
    pub fn from_email(&self) -> Option<&str> {
        self.headers
            .from
            .first()
            .map(|a| a.email.trim())
            .filter(|e| !e.is_empty())
    }

    /// True if the message has neither plain nor HTML text.
    #[must_use]
    pub const fn has_no_body(&self) -> bool {
        self.plain.is_none() && self.html.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HEADER: &[u8] = b"From: =?utf-8?B?SsO8cmdlbg==?= <jurgen@example.com>\r\n\
To: a@example.com, \"Doe, Jane\" <jane@example.com>\r\n\
Cc: bogus\r\n\
Subject: =?utf-8?Q?Gr=C3=BC=C3=9Fe?=\r\n\x20from Berlin\r\n\
Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\
Message-ID: <abc@example.com>\r\n\
Disposition-Notification-To: jurgen@example.com\r\n\
\r\n";

    #[test]
    fn test_parse_headers() {
        let headers = MessageHeaders::parse(HEADER);
        assert_eq!(headers.subject, "Grüße from Berlin");
        assert_eq!(headers.from.first().unwrap().name.as_deref(), Some("Jürgen"));
        assert_eq!(headers.to.len(), 2);
        assert!(headers.cc.is_empty());
        assert_eq!(headers.message_id.as_deref(), Some("<abc@example.com>"));
        assert_eq!(headers.sent_at.unwrap().timestamp(), 1_057_049_557);
        assert_eq!(
            headers.read_confirmation_to.as_deref(),
            Some("jurgen@example.com")
        );
    }

    #[test]
    fn test_from_email() {
        let message = Message {
            headers: MessageHeaders::parse(HEADER),
            ..Message::default()
        };
        assert_eq!(message.from_email(), Some("jurgen@example.com"));
        assert!(Message::default().from_email().is_none());
    }
}
