//! BODYSTRUCTURE and ENVELOPE parsing.
//!
//! Media types and subtypes are lowercased on the way in; parameter names
//! keep their original case and are looked up case-insensitively.

use crate::Result;
use crate::parser::lexer::{Lexer, Token};

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Email address from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Mailbox name (local part).
    pub mailbox: Option<String>,
    /// Host name (domain part).
    pub host: Option<String>,
}

impl Address {
    /// Returns the full email address.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }
}

/// Fields shared by every non-multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyFields {
    /// Content-Type parameters.
    pub params: Vec<(String, String)>,
    /// Content-ID.
    pub id: Option<String>,
    /// Content-Description.
    pub description: Option<String>,
    /// Content-Transfer-Encoding, lowercased.
    pub encoding: String,
    /// Encoded size in octets.
    pub size: u32,
}

impl BodyFields {
    /// Looks up a Content-Type parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name)
    }
}

/// Content-Disposition from the extension data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// Disposition type, lowercased (`attachment`, `inline`).
    pub kind: String,
    /// Disposition parameters.
    pub params: Vec<(String, String)>,
}

impl Disposition {
    /// Looks up a disposition parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name)
    }
}

/// Optional extension data trailing a body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyExtension {
    /// Content-MD5 (non-multipart only).
    pub md5: Option<String>,
    /// Content-Disposition.
    pub disposition: Option<Disposition>,
    /// Content-Language values.
    pub language: Vec<String>,
    /// Content-Location.
    pub location: Option<String>,
}

/// Structure of a message or body part.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyStructure {
    /// Any non-text, non-message single part.
    Basic {
        /// MIME type.
        media_type: String,
        /// MIME subtype.
        media_subtype: String,
        /// Body fields.
        fields: BodyFields,
        /// Extension data.
        extension: BodyExtension,
    },
    /// `text/*` part.
    Text {
        /// Text subtype.
        subtype: String,
        /// Body fields.
        fields: BodyFields,
        /// Size in lines.
        lines: u32,
        /// Extension data.
        extension: BodyExtension,
    },
    /// Encapsulated `message/rfc822` part.
    Message {
        /// Body fields.
        fields: BodyFields,
        /// Envelope of the nested message.
        envelope: Box<Envelope>,
        /// Structure of the nested message.
        body: Box<Self>,
        /// Size in lines.
        lines: u32,
        /// Extension data.
        extension: BodyExtension,
    },
    /// `multipart/*` container.
    Multipart {
        /// Child parts in order.
        bodies: Vec<Self>,
        /// Multipart subtype.
        subtype: String,
        /// Content-Type parameters.
        params: Vec<(String, String)>,
        /// Extension data.
        extension: BodyExtension,
    },
}

impl BodyStructure {
    /// Returns the `type/subtype` string.
    #[must_use]
    pub fn mime_type(&self) -> String {
        match self {
            Self::Basic {
                media_type,
                media_subtype,
                ..
            } => format!("{media_type}/{media_subtype}"),
            Self::Text { subtype, .. } => format!("text/{subtype}"),
            Self::Message { .. } => "message/rfc822".to_string(),
            Self::Multipart { subtype, .. } => format!("multipart/{subtype}"),
        }
    }

    /// Returns the body fields of a non-multipart body.
    #[must_use]
    pub const fn fields(&self) -> Option<&BodyFields> {
        match self {
            Self::Basic { fields, .. } | Self::Text { fields, .. } | Self::Message { fields, .. } => {
                Some(fields)
            }
            Self::Multipart { .. } => None,
        }
    }

    /// Returns the extension data.
    #[must_use]
    pub const fn extension(&self) -> &BodyExtension {
        match self {
            Self::Basic { extension, .. }
            | Self::Text { extension, .. }
            | Self::Message { extension, .. }
            | Self::Multipart { extension, .. } => extension,
        }
    }

    /// Returns true for `multipart/*`.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart { .. })
    }
}

fn find_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parses a BODYSTRUCTURE (or non-extensible BODY) value.
///
/// # Errors
///
/// Returns [`crate::Error::Parse`] if the input is not a well-formed body.
pub fn parse_body_structure(lexer: &mut Lexer<'_>) -> Result<BodyStructure> {
    lexer.expect(Token::LParen)?;

    if lexer.peek() == Some(b'(') {
        parse_multipart(lexer)
    } else {
        parse_single_part(lexer)
    }
}

fn parse_multipart(lexer: &mut Lexer<'_>) -> Result<BodyStructure> {
    let mut bodies = Vec::new();
    while lexer.peek() == Some(b'(') {
        bodies.push(parse_body_structure(lexer)?);
        lexer.eat_space();
    }

    let subtype = lexer.read_nstring()?.unwrap_or_default().to_lowercase();

    let mut params = Vec::new();
    let mut extension = BodyExtension::default();
    if lexer.eat_space() {
        params = parse_body_params(lexer)?;
        if lexer.eat_space() {
            extension.disposition = parse_disposition(lexer)?;
            parse_language_and_location(lexer, &mut extension)?;
        }
    }
    skip_to_close_paren(lexer)?;

    Ok(BodyStructure::Multipart {
        bodies,
        subtype,
        params,
        extension,
    })
}

fn parse_single_part(lexer: &mut Lexer<'_>) -> Result<BodyStructure> {
    let media_type = lexer.read_nstring()?.unwrap_or_default().to_lowercase();
    lexer.expect_space()?;
    let media_subtype = lexer.read_nstring()?.unwrap_or_default().to_lowercase();
    lexer.expect_space()?;

    let params = parse_body_params(lexer)?;
    lexer.expect_space()?;
    let id = lexer.read_nstring()?;
    lexer.expect_space()?;
    let description = lexer.read_nstring()?;
    lexer.expect_space()?;
    let encoding = lexer.read_nstring()?.unwrap_or_default().to_lowercase();
    lexer.expect_space()?;
    let size = lexer.read_number()?;

    let fields = BodyFields {
        params,
        id,
        description,
        encoding,
        size,
    };

    let is_message = media_type == "message"
        && (media_subtype == "rfc822" || media_subtype == "global")
        && lexer.peek() == Some(b' ')
        && lexer.peek_at(1) == Some(b'(');

    let mut nested = None;
    let mut lines = 0;
    if is_message {
        lexer.expect_space()?;
        let envelope = parse_envelope(lexer)?;
        lexer.expect_space()?;
        let body = parse_body_structure(lexer)?;
        if lexer.eat_space() {
            lines = lexer.read_number()?;
        }
        nested = Some((envelope, body));
    } else if media_type == "text" && lexer.peek() == Some(b' ') {
        lexer.advance();
        lines = lexer.read_number()?;
    }

    let mut extension = BodyExtension::default();
    if lexer.eat_space() {
        extension.md5 = lexer.read_nstring()?;
        if lexer.eat_space() {
            extension.disposition = parse_disposition(lexer)?;
            parse_language_and_location(lexer, &mut extension)?;
        }
    }
    skip_to_close_paren(lexer)?;

    Ok(match nested {
        Some((envelope, body)) => BodyStructure::Message {
            fields,
            envelope: Box::new(envelope),
            body: Box::new(body),
            lines,
            extension,
        },
        None if media_type == "text" => BodyStructure::Text {
            subtype: media_subtype,
            fields,
            lines,
            extension,
        },
        None => BodyStructure::Basic {
            media_type,
            media_subtype,
            fields,
            extension,
        },
    })
}

/// Parses body parameters: NIL or `(key value key value ...)`.
fn parse_body_params(lexer: &mut Lexer<'_>) -> Result<Vec<(String, String)>> {
    if lexer.peek() != Some(b'(') {
        let _ = lexer.read_nstring()?;
        return Ok(Vec::new());
    }
    lexer.advance();

    let mut params = Vec::new();
    loop {
        match lexer.peek() {
            Some(b')') => {
                lexer.advance();
                break;
            }
            Some(b' ') => {
                lexer.advance();
            }
            Some(_) => {
                let key = lexer.read_nstring()?.unwrap_or_default();
                lexer.eat_space();
                let value = lexer.read_nstring()?.unwrap_or_default();
                params.push((key, value));
            }
            None => return Err(lexer.error("Unterminated body parameter list")),
        }
    }
    Ok(params)
}

fn parse_disposition(lexer: &mut Lexer<'_>) -> Result<Option<Disposition>> {
    if lexer.peek() != Some(b'(') {
        let _ = lexer.read_nstring()?;
        return Ok(None);
    }
    lexer.advance();

    let kind = lexer.read_nstring()?.unwrap_or_default().to_lowercase();
    let params = if lexer.eat_space() {
        parse_body_params(lexer)?
    } else {
        Vec::new()
    };
    skip_to_close_paren(lexer)?;

    Ok(Some(Disposition { kind, params }))
}

fn parse_language_and_location(lexer: &mut Lexer<'_>, extension: &mut BodyExtension) -> Result<()> {
    if !lexer.eat_space() {
        return Ok(());
    }

    if lexer.peek() == Some(b'(') {
        lexer.advance();
        loop {
            match lexer.next_token()? {
                Token::RParen => break,
                Token::Space => {}
                Token::QuotedString(s) => extension.language.push(s),
                Token::Atom(s) => extension.language.push(s.to_string()),
                Token::Literal(data) => {
                    extension
                        .language
                        .push(String::from_utf8_lossy(&data).into_owned());
                }
                Token::Eof => return Err(lexer.error("Unterminated language list")),
                _ => {}
            }
        }
    } else if let Some(lang) = lexer.read_nstring()? {
        extension.language.push(lang);
    }

    if lexer.eat_space() {
        extension.location = lexer.read_nstring()?;
    }
    Ok(())
}

/// Skips any remaining extension data up to and including the closing
/// parenthesis of the current body.
fn skip_to_close_paren(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen if depth == 0 => return Ok(()),
            Token::RParen => depth -= 1,
            Token::Eof | Token::Crlf => return Err(lexer.error("Unterminated body structure")),
            _ => {}
        }
    }
}

/// Parses an envelope structure.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;

    let date = lexer.read_nstring()?;
    lexer.expect_space()?;
    let subject = lexer.read_nstring()?;
    lexer.expect_space()?;
    let from = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let sender = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let reply_to = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let to = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let cc = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let bcc = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;
    let message_id = lexer.read_nstring()?;
    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();
            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b'(') => addresses.push(parse_address(lexer)?),
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => return Err(lexer.error("Unterminated address list")),
                }
            }
            Ok(addresses)
        }
        token => Err(lexer.error(&format!("Expected address list, got {token:?}"))),
    }
}

fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;
    let name = lexer.read_nstring()?;
    lexer.expect_space()?;
    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;
    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;
    let host = lexer.read_nstring()?;
    lexer.expect(Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
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

    fn parse(input: &str) -> BodyStructure {
        parse_body_structure(&mut Lexer::new(input.as_bytes())).unwrap()
    }

    #[test]
    fn test_simple_text() {
        let body = parse(r#"("TEXT" "PLAIN" ("CHARSET" "us-ascii") NIL NIL "7BIT" 3028 92)"#);
        match body {
            BodyStructure::Text {
                subtype,
                fields,
                lines,
                ..
            } => {
                assert_eq!(subtype, "plain");
                assert_eq!(fields.param("charset"), Some("us-ascii"));
                assert_eq!(fields.encoding, "7bit");
                assert_eq!(fields.size, 3028);
                assert_eq!(lines, 92);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_attachment_with_disposition() {
        let body = parse(
            r#"("APPLICATION" "PDF" ("NAME" "a.pdf") NIL NIL "BASE64" 4000 NIL ("ATTACHMENT" ("FILENAME" "a.pdf")) NIL NIL)"#,
        );
        assert_eq!(body.mime_type(), "application/pdf");
        let disposition = body.extension().disposition.as_ref().unwrap();
        assert_eq!(disposition.kind, "attachment");
        assert_eq!(disposition.param("filename"), Some("a.pdf"));
    }

    #[test]
    fn test_multipart_alternative_with_extensions() {
        let body = parse(concat!(
            r#"(("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "QUOTED-PRINTABLE" 120 4 NIL NIL NIL NIL)"#,
            r#"("TEXT" "HTML" ("CHARSET" "utf-8") NIL NIL "BASE64" 640 9 NIL NIL NIL NIL)"#,
            r#" "ALTERNATIVE" ("BOUNDARY" "b1") NIL NIL NIL)"#
        ));
        match body {
            BodyStructure::Multipart {
                bodies,
                subtype,
                params,
                ..
            } => {
                assert_eq!(subtype, "alternative");
                assert_eq!(bodies.len(), 2);
                assert_eq!(params[0].1, "b1");
                assert_eq!(bodies[1].mime_type(), "text/html");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_message_rfc822() {
        let body = parse(concat!(
            r#"("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 900 "#,
            r#"("Mon, 1 Jan 2024 00:00:00 +0000" "Inner" (("Ann" NIL "ann" "example.com")) NIL NIL NIL NIL NIL NIL "<in@x>") "#,
            r#"("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "7BIT" 20 1) 30)"#
        ));
        match body {
            BodyStructure::Message {
                envelope,
                body,
                lines,
                ..
            } => {
                assert_eq!(envelope.subject.as_deref(), Some("Inner"));
                assert_eq!(envelope.from[0].email().as_deref(), Some("ann@example.com"));
                assert_eq!(body.mime_type(), "text/plain");
                assert_eq!(lines, 30);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_language_list_and_location() {
        let body = parse(
            r#"("TEXT" "HTML" NIL NIL NIL "8BIT" 10 1 NIL NIL ("EN" "DE") "http://x/y" "future")"#,
        );
        let ext = body.extension();
        assert_eq!(ext.language, vec!["EN".to_string(), "DE".to_string()]);
        assert_eq!(ext.location.as_deref(), Some("http://x/y"));
    }

    #[test]
    fn test_unterminated_is_error() {
        let mut lexer = Lexer::new(br#"("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1"#);
        assert!(parse_body_structure(&mut lexer).is_err());
    }
}
