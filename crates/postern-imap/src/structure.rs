//! Part numbering and searches over a BODYSTRUCTURE tree.
//!
//! Section numbers follow RFC 9051: the children of a multipart are
//! numbered from 1, a non-multipart message body is part `1`, and the body
//! of an encapsulated `message/rfc822` part `N` is numbered under `N`
//! (`N.1`, `N.2`, ...).

use crate::parser::BodyStructure;

/// Flat description of one part, as selection code and hooks see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// IMAP section number, e.g. `1.2`.
    pub part_id: String,
    /// Lowercased `type/subtype`.
    pub mime_type: String,
    /// Encoded size in octets.
    pub size: u32,
    /// `charset` parameter, if any.
    pub charset: Option<String>,
    /// Lowercased transfer encoding.
    pub encoding: String,
    /// File name from the disposition or the `name` parameter.
    pub filename: Option<String>,
    /// Content-ID as sent by the server.
    pub content_id: Option<String>,
    /// Lowercased disposition type.
    pub disposition: Option<String>,
    /// Content-Location.
    pub location: Option<String>,
}

impl PartInfo {
    fn from_body(part_id: String, body: &BodyStructure) -> Self {
        let fields = body.fields();
        let extension = body.extension();
        let disposition = extension.disposition.as_ref();

        let filename = disposition
            .and_then(|d| param_value(&d.params, "filename"))
            .or_else(|| fields.and_then(|f| param_value(&f.params, "name")))
            .filter(|name| !name.trim().is_empty());

        Self {
            part_id,
            mime_type: body.mime_type(),
            size: fields.map_or(0, |f| f.size),
            charset: fields.and_then(|f| f.param("charset")).map(str::to_string),
            encoding: fields.map(|f| f.encoding.clone()).unwrap_or_default(),
            filename,
            content_id: fields.and_then(|f| f.id.clone()),
            disposition: disposition.map(|d| d.kind.clone()),
            location: extension.location.clone(),
        }
    }

    /// Returns true for `text/html`.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.mime_type == "text/html"
    }

    /// Returns true for `text/plain`.
    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.mime_type == "text/plain"
    }

    /// Returns true if the part is presented as a file rather than as body
    /// text: an `attachment` disposition, or a file name on a non-inline part.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        match self.disposition.as_deref() {
            Some("attachment") => true,
            Some("inline") => false,
            _ => self.filename.is_some(),
        }
    }
}

/// A BODYSTRUCTURE viewed from some section prefix.
///
/// The top-level tree has no prefix. [`PartTree::nested`] re-roots the view
/// at an encapsulated message so searches only see that message's parts
/// while still reporting absolute section numbers.
#[derive(Debug, Clone, Copy)]
pub struct PartTree<'a> {
    root: &'a BodyStructure,
    prefix: Option<&'a str>,
}

impl<'a> PartTree<'a> {
    /// Views the whole message.
    #[must_use]
    pub const fn new(root: &'a BodyStructure) -> Self {
        Self { root, prefix: None }
    }

    /// Views the message encapsulated at `part_id`.
    ///
    /// Returns `None` if the section does not exist or is not a
    /// `message/rfc822` part.
    #[must_use]
    pub fn nested(root: &'a BodyStructure, part_id: &'a str) -> Option<Self> {
        match find(root, part_id)? {
            BodyStructure::Message { body, .. } => Some(Self {
                root: body,
                prefix: Some(part_id),
            }),
            _ => None,
        }
    }

    /// Returns the structure at the root of this view.
    #[must_use]
    pub const fn root(&self) -> &'a BodyStructure {
        self.root
    }

    /// Every non-multipart part, depth first, including the parts of
    /// encapsulated messages.
    #[must_use]
    pub fn all_parts(&self) -> Vec<PartInfo> {
        let mut out = Vec::new();
        walk_node(
            self.root,
            &section_for_root(self.root, self.prefix),
            &mut |body, id| {
                if !body.is_multipart() {
                    out.push(PartInfo::from_body(id.to_string(), body));
                }
            },
        );
        out
    }

    /// Parts that carry the displayable body text.
    ///
    /// In a `multipart/alternative` the HTML candidates win when there are
    /// any, otherwise the plain ones are kept. Other multiparts contribute
    /// every child. Attachments and encapsulated messages are not searched.
    #[must_use]
    pub fn html_or_plain_parts(&self) -> Vec<PartInfo> {
        let mut out = Vec::new();
        search_text(self.root, &section_for_root(self.root, self.prefix), &mut out);
        out
    }

    /// Parts whose trimmed file name ends with one of `suffixes`,
    /// compared case-insensitively.
    #[must_use]
    pub fn find_by_filename_suffix(&self, suffixes: &[String]) -> Vec<PartInfo> {
        let suffixes: Vec<String> = suffixes
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if suffixes.is_empty() {
            return Vec::new();
        }

        self.all_parts()
            .into_iter()
            .filter(|part| {
                part.filename.as_ref().is_some_and(|name| {
                    let name = name.trim().to_lowercase();
                    suffixes.iter().any(|suffix| name.ends_with(suffix))
                })
            })
            .collect()
    }
}

/// Section number of a tree root under `prefix`.
fn section_for_root(body: &BodyStructure, prefix: Option<&str>) -> String {
    if body.is_multipart() {
        prefix.unwrap_or_default().to_string()
    } else {
        child_id(prefix, 1)
    }
}

fn child_id(prefix: Option<&str>, index: usize) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}.{index}"),
        _ => index.to_string(),
    }
}

fn walk_node(body: &BodyStructure, id: &str, visit: &mut dyn FnMut(&BodyStructure, &str)) {
    visit(body, id);
    match body {
        BodyStructure::Multipart { bodies, .. } => {
            for (i, child) in bodies.iter().enumerate() {
                walk_node(child, &child_id(Some(id), i + 1), visit);
            }
        }
        BodyStructure::Message { body: inner, .. } => {
            let inner_id = section_for_root(inner, Some(id));
            walk_node(inner, &inner_id, visit);
        }
        _ => {}
    }
}

fn search_text(body: &BodyStructure, id: &str, out: &mut Vec<PartInfo>) {
    match body {
        BodyStructure::Text { .. } => {
            let part = PartInfo::from_body(id.to_string(), body);
            if (part.is_html() || part.is_plain()) && !part.is_attachment() {
                out.push(part);
            }
        }
        BodyStructure::Multipart {
            bodies, subtype, ..
        } => {
            let mut found = Vec::new();
            for (i, child) in bodies.iter().enumerate() {
                search_text(child, &child_id(Some(id), i + 1), &mut found);
            }
            if subtype == "alternative" && found.iter().any(PartInfo::is_html) {
                found.retain(PartInfo::is_html);
            }
            out.extend(found);
        }
        BodyStructure::Basic { .. } | BodyStructure::Message { .. } => {}
    }
}

/// Resolves a dotted section number against the whole message.
fn find<'a>(root: &'a BodyStructure, part_id: &str) -> Option<&'a BodyStructure> {
    let mut current = root;
    let mut at_root = true;
    for segment in part_id.split('.') {
        let index: usize = segment.parse().ok().filter(|&i| i > 0)?;
        current = step(current, index, at_root)?;
        at_root = false;
    }
    Some(current)
}

fn step(body: &BodyStructure, index: usize, at_root: bool) -> Option<&BodyStructure> {
    match body {
        BodyStructure::Multipart { bodies, .. } => bodies.get(index - 1),
        BodyStructure::Message { body: inner, .. } if !at_root => step(inner, index, true),
        _ if at_root && index == 1 => Some(body),
        _ => None,
    }
}

/// Reads a parameter, joining RFC 2231 continuations and decoding the
/// extended `name*` form.
fn param_value(params: &[(String, String)], name: &str) -> Option<String> {
    let lookup = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    };

    if let Some(value) = lookup(&format!("{name}*")) {
        return Some(decode_extended(value, true));
    }
    if let Some(value) = lookup(name) {
        return Some(value.to_string());
    }

    let mut joined = String::new();
    let mut extended = false;
    for index in 0.. {
        if let Some(value) = lookup(&format!("{name}*{index}*")) {
            joined.push_str(&decode_extended(value, index == 0));
            extended = true;
        } else if let Some(value) = lookup(&format!("{name}*{index}")) {
            joined.push_str(value);
        } else {
            break;
        }
    }
    (extended || !joined.is_empty()).then_some(joined)
}

/// Decodes `charset'lang'percent-encoded` (first segment) or a bare
/// percent-encoded continuation. Only UTF-8 compatible charsets are
/// decoded exactly; anything else is decoded lossily.
fn decode_extended(value: &str, first: bool) -> String {
    let encoded = if first {
        value.splitn(3, '\'').nth(2).unwrap_or(value)
    } else {
        value
    };

    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2]))
        {
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

const fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
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
    use crate::parser::{Lexer, parse_body_structure};

    fn structure(input: &str) -> BodyStructure {
        parse_body_structure(&mut Lexer::new(input.as_bytes())).unwrap()
    }

    const PLAIN: &str = r#"("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "7BIT" 100 2 NIL NIL NIL NIL)"#;
    const HTML: &str = r#"("TEXT" "HTML" ("CHARSET" "iso-8859-1") NIL NIL "QUOTED-PRINTABLE" 620000 900 NIL NIL NIL NIL)"#;
    const PDF: &str = r#"("APPLICATION" "PDF" ("NAME" "report.pdf") NIL NIL "BASE64" 5000 NIL ("ATTACHMENT" ("FILENAME" "report.pdf")) NIL NIL)"#;
    const SIG: &str = r#"("APPLICATION" "PGP-SIGNATURE" ("NAME" "signature.ASC ") NIL NIL "7BIT" 300 NIL NIL NIL NIL)"#;

    fn ids(parts: &[PartInfo]) -> Vec<&str> {
        parts.iter().map(|p| p.part_id.as_str()).collect()
    }

    #[test]
    fn test_single_part_is_section_one() {
        let body = structure(PLAIN);
        let tree = PartTree::new(&body);
        assert_eq!(ids(&tree.html_or_plain_parts()), vec!["1"]);
        assert_eq!(tree.all_parts()[0].charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_alternative_prefers_html() {
        let body = structure(&format!(
            "(({PLAIN}{HTML} \"ALTERNATIVE\" NIL NIL NIL NIL){PDF} \"MIXED\" NIL NIL NIL NIL)"
        ));
        let parts = PartTree::new(&body).html_or_plain_parts();
        assert_eq!(ids(&parts), vec!["1.2"]);
        assert_eq!(parts[0].size, 620000);
        assert_eq!(parts[0].encoding, "quoted-printable");
    }

    #[test]
    fn test_alternative_without_html_keeps_plain() {
        let body = structure(&format!("({PLAIN}{PDF} \"ALTERNATIVE\")"));
        assert_eq!(ids(&PartTree::new(&body).html_or_plain_parts()), vec!["1"]);
    }

    #[test]
    fn test_mixed_collects_every_text_child() {
        let body = structure(&format!("({PLAIN}{PLAIN} \"MIXED\")"));
        assert_eq!(
            ids(&PartTree::new(&body).html_or_plain_parts()),
            vec!["1", "2"]
        );
    }

    #[test]
    fn test_attachment_text_is_not_body() {
        let attached = r#"("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1 NIL ("ATTACHMENT" ("FILENAME" "notes.txt")) NIL NIL)"#;
        let body = structure(&format!("({PLAIN}{attached} \"MIXED\")"));
        let tree = PartTree::new(&body);
        assert_eq!(ids(&tree.html_or_plain_parts()), vec!["1"]);
        assert!(tree.all_parts()[1].is_attachment());
    }

    fn with_nested_message() -> BodyStructure {
        structure(&format!(
            concat!(
                "({PLAIN}(\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 900 ",
                "(NIL \"inner\" NIL NIL NIL NIL NIL NIL NIL NIL) ",
                "({HTML}{SIG} \"MIXED\") 40) \"MIXED\")"
            ),
            PLAIN = PLAIN,
            HTML = HTML,
            SIG = SIG
        ))
    }

    #[test]
    fn test_nested_message_numbering() {
        let body = with_nested_message();
        let tree = PartTree::new(&body);
        assert_eq!(ids(&tree.all_parts()), vec!["1", "2", "2.1", "2.2"]);
        // encapsulated messages are not searched for body text
        assert_eq!(ids(&tree.html_or_plain_parts()), vec!["1"]);
    }

    #[test]
    fn test_nested_view() {
        let body = with_nested_message();
        let nested = PartTree::nested(&body, "2").unwrap();
        assert_eq!(ids(&nested.html_or_plain_parts()), vec!["2.1"]);
        assert!(PartTree::nested(&body, "1").is_none());
        assert!(PartTree::nested(&body, "9").is_none());
        assert!(PartTree::nested(&body, "0").is_none());
    }

    #[test]
    fn test_nested_single_part_body() {
        let body = structure(&format!(
            "({PLAIN}(\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 90 (NIL NIL NIL NIL NIL NIL NIL NIL NIL NIL) {PLAIN} 4) \"MIXED\")"
        ));
        let nested = PartTree::nested(&body, "2").unwrap();
        assert_eq!(ids(&nested.html_or_plain_parts()), vec!["2.1"]);
    }

    #[test]
    fn test_find_by_filename_suffix() {
        let body = with_nested_message();
        let tree = PartTree::new(&body);
        let found = tree.find_by_filename_suffix(&[".asc".to_string()]);
        assert_eq!(ids(&found), vec!["2.2"]);
        assert!(tree.find_by_filename_suffix(&[]).is_empty());
        assert!(tree.find_by_filename_suffix(&["  ".to_string()]).is_empty());
    }

    #[test]
    fn test_rfc2231_filename() {
        let part = r#"("APPLICATION" "OCTET-STREAM" NIL NIL NIL "BASE64" 10 NIL ("ATTACHMENT" ("FILENAME*" "utf-8''r%C3%A9sum%C3%A9.pdf")) NIL NIL)"#;
        let body = structure(part);
        let parts = PartTree::new(&body).all_parts();
        assert_eq!(parts[0].filename.as_deref(), Some("résumé.pdf"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let params = vec![
            ("filename*0".to_string(), "long-".to_string()),
            ("filename*1".to_string(), "name.txt".to_string()),
        ];
        assert_eq!(param_value(&params, "filename").as_deref(), Some("long-name.txt"));
        assert_eq!(param_value(&params, "name"), None);
    }
}
