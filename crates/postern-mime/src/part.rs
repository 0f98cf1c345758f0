//! MIME part tree and RFC 2045/2046 rendering.

use crate::content_type::ContentType;
use crate::encoding::{TransferEncoding, encode_base64_wrapped, encode_quoted_printable};
use crate::header::Headers;
use std::fmt::Write as _;

/// Body of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    /// UTF-8 text, rendered quoted-printable.
    Text(String),
    /// Raw bytes, rendered base64.
    Binary(Vec<u8>),
    /// Child parts separated by the boundary of the part's content type.
    Multipart(Vec<Part>),
}

/// A node in the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Content type, including the boundary for multiparts.
    pub content_type: ContentType,
    /// Additional headers such as `Content-ID` and `Content-Disposition`.
    pub headers: Headers,
    /// Part body.
    pub body: PartBody,
}

impl Part {
    /// Creates a text leaf.
    #[must_use]
    pub fn text(content_type: ContentType, text: impl Into<String>) -> Self {
        Self {
            content_type,
            headers: Headers::new(),
            body: PartBody::Text(text.into()),
        }
    }

    /// Creates a binary leaf.
    #[must_use]
    pub fn binary(content_type: ContentType, data: Vec<u8>) -> Self {
        Self {
            content_type,
            headers: Headers::new(),
            body: PartBody::Binary(data),
        }
    }

    /// Creates a multipart node with a fresh random boundary.
    #[must_use]
    pub fn multipart(sub_type: &str, children: Vec<Self>) -> Self {
        Self {
            content_type: ContentType::multipart(sub_type, new_boundary()),
            headers: Headers::new(),
            body: PartBody::Multipart(children),
        }
    }

    /// Wraps `children` in a multipart node, or returns the only child as is.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn wrap(sub_type: &str, mut children: Vec<Self>) -> Option<Self> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Self::multipart(sub_type, children)),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Transfer encoding used when rendering this part.
    #[must_use]
    pub const fn transfer_encoding(&self) -> Option<TransferEncoding> {
        match self.body {
            PartBody::Text(_) => Some(TransferEncoding::QuotedPrintable),
            PartBody::Binary(_) => Some(TransferEncoding::Base64),
            PartBody::Multipart(_) => None,
        }
    }

    /// Returns the bracketed `Content-ID` header, if set.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> {
        self.headers.get("Content-ID")
    }

    /// Returns the child parts of a multipart node.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match &self.body {
            PartBody::Multipart(children) => children,
            PartBody::Text(_) | PartBody::Binary(_) => &[],
        }
    }

    /// Collects the leaf parts depth-first.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        match &self.body {
            PartBody::Multipart(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            PartBody::Text(_) | PartBody::Binary(_) => out.push(self),
        }
    }

    /// Writes the part headers, a blank line and the encoded body.
    pub fn render(&self, out: &mut String) {
        let _ = write!(out, "Content-Type: {}\r\n", self.content_type);
        if let Some(encoding) = self.transfer_encoding() {
            let _ = write!(out, "Content-Transfer-Encoding: {encoding}\r\n");
        }
        out.push_str(&self.headers.to_string());
        out.push_str("\r\n");
        self.render_body(out);
    }

    fn render_body(&self, out: &mut String) {
        match &self.body {
            PartBody::Text(text) => {
                out.push_str(&encode_quoted_printable(text));
                out.push_str("\r\n");
            }
            PartBody::Binary(data) => {
                out.push_str(&encode_base64_wrapped(data));
                out.push_str("\r\n");
            }
            PartBody::Multipart(children) => {
                let boundary = self.content_type.boundary().unwrap_or_default();
                for child in children {
                    let _ = write!(out, "--{boundary}\r\n");
                    child.render(out);
                }
                let _ = write!(out, "--{boundary}--\r\n");
            }
        }
    }
}

fn new_boundary() -> String {
    format!("----=_Part_{:016x}", rand::random::<u64>())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_collapses_single_child() {
        let only = Part::text(ContentType::text_plain(), "hi");
        let wrapped = Part::wrap("mixed", vec![only.clone()]).unwrap();
        assert_eq!(wrapped, only);
        assert!(Part::wrap("mixed", Vec::new()).is_none());

        let two = Part::wrap("alternative", vec![only.clone(), only]).unwrap();
        assert_eq!(two.content_type.mime_type(), "multipart/alternative");
        assert_eq!(two.children().len(), 2);
    }

    #[test]
    fn test_render_multipart() {
        let tree = Part::multipart(
            "mixed",
            vec![
                Part::text(ContentType::text_plain(), "Hello"),
                Part::binary(ContentType::octet_stream(), vec![1, 2, 3])
                    .with_header("Content-Disposition", "attachment; filename=\"a.bin\""),
            ],
        );
        let boundary = tree.content_type.boundary().unwrap().to_string();

        let mut out = String::new();
        tree.render(&mut out);

        assert!(out.starts_with("Content-Type: multipart/mixed; boundary=\""));
        assert_eq!(out.matches(&format!("--{boundary}\r\n")).count(), 2);
        assert!(out.ends_with(&format!("--{boundary}--\r\n")));
        assert!(out.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(out.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(out.contains("\r\n\r\nAQID\r\n"));
    }

    #[test]
    fn test_leaves_depth_first() {
        let tree = Part::multipart(
            "mixed",
            vec![
                Part::multipart(
                    "alternative",
                    vec![
                        Part::text(ContentType::text_plain(), "p"),
                        Part::text(ContentType::text_html(), "h"),
                    ],
                ),
                Part::binary(ContentType::octet_stream(), vec![0]),
            ],
        );
        let kinds: Vec<String> = tree
            .leaves()
            .iter()
            .map(|p| p.content_type.mime_type())
            .collect();
        assert_eq!(
            kinds,
            vec!["text/plain", "text/html", "application/octet-stream"]
        );
    }
}
