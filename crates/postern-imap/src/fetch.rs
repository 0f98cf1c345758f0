//! Aggregated view of one message's FETCH response.

use std::collections::BTreeMap;

use crate::parser::{BodyStructure, FetchItem};
use crate::types::{Flags, SeqNum, Uid};

/// Everything a single `* n FETCH (...)` response carried for one message.
///
/// Body sections are keyed by their section text as echoed by the server
/// (`HEADER`, `1.2`, `2.HEADER`), uppercased.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedMessage {
    /// Sequence number of the message.
    pub seq: Option<SeqNum>,
    /// UID of the message.
    pub uid: Option<Uid>,
    /// RFC822 size.
    pub size: Option<u32>,
    /// Internal date as sent by the server.
    pub internal_date: Option<String>,
    /// Flags.
    pub flags: Flags,
    /// BODYSTRUCTURE, if requested.
    pub structure: Option<BodyStructure>,
    /// Body sections.
    pub sections: BTreeMap<String, Vec<u8>>,
}

impl FetchedMessage {
    /// Folds the items of one FETCH response.
    #[must_use]
    pub fn from_items(seq: SeqNum, items: Vec<FetchItem>) -> Self {
        let mut message = Self {
            seq: Some(seq),
            ..Self::default()
        };
        message.merge(items);
        message
    }

    /// Adds more items, e.g. from a second untagged FETCH for the same
    /// message. Later values replace earlier ones.
    pub fn merge(&mut self, items: Vec<FetchItem>) {
        for item in items {
            match item {
                FetchItem::Flags(flags) => self.flags = flags,
                FetchItem::InternalDate(date) => self.internal_date = Some(date),
                FetchItem::Rfc822Size(size) => self.size = Some(size),
                FetchItem::Uid(uid) => self.uid = Some(uid),
                FetchItem::BodyStructure(structure) => self.structure = Some(structure),
                FetchItem::Body { section, data, .. } => {
                    if let Some(data) = data {
                        let key = section.unwrap_or_default().to_uppercase();
                        self.sections.insert(key, data);
                    }
                }
                FetchItem::Envelope(_) => {}
            }
        }
    }

    /// Returns a body section by its section text, ignoring case.
    #[must_use]
    pub fn section(&self, section: &str) -> Option<&[u8]> {
        self.sections
            .get(&section.to_uppercase())
            .map(Vec::as_slice)
    }

    /// Returns true if the response carried any body section.
    #[must_use]
    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
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
    use crate::parser::{Response, ResponseParser, UntaggedResponse};

    #[test]
    fn test_from_fetch_response() {
        let raw = b"* 3 FETCH (UID 42 RFC822.SIZE 1200 FLAGS (\\Seen) BODY[HEADER] {13}\r\nSubject: hi\r\n BODY[1]<0> {4}\r\nbody)\r\n";
        let Response::Untagged(UntaggedResponse::Fetch { seq, items }) =
            ResponseParser::parse(raw).unwrap()
        else {
            panic!("expected FETCH");
        };

        let message = FetchedMessage::from_items(seq, items);
        assert_eq!(message.seq.unwrap().get(), 3);
        assert_eq!(message.uid.unwrap().get(), 42);
        assert_eq!(message.size, Some(1200));
        assert!(message.flags.is_seen());
        assert_eq!(message.section("header"), Some(&b"Subject: hi\r\n"[..]));
        assert_eq!(message.section("1"), Some(&b"body"[..]));
        assert!(message.has_sections());
    }

    #[test]
    fn test_nil_sections_are_dropped() {
        let message = FetchedMessage::from_items(
            SeqNum::new(1).unwrap(),
            vec![FetchItem::Body {
                section: Some("2".into()),
                origin: None,
                data: None,
            }],
        );
        assert!(!message.has_sections());
    }
}
