//! FETCH response parsing.

use crate::parser::lexer::{Lexer, Token};
use crate::parser::response::parse_flag_list;
use crate::types::{Flags, Uid};
use crate::{Error, Result};

use super::body::{BodyStructure, Envelope, parse_body_structure, parse_envelope};

/// FETCH response item.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Flags),
    /// Internal date.
    InternalDate(String),
    /// RFC822 size.
    Rfc822Size(u32),
    /// Envelope.
    Envelope(Box<Envelope>),
    /// UID.
    Uid(Uid),
    /// BODY section.
    Body {
        /// Section specifier, e.g. `HEADER` or `1.2`.
        section: Option<String>,
        /// Origin offset of a partial fetch.
        origin: Option<u32>,
        /// Body data.
        data: Option<Vec<u8>>,
    },
    /// BODYSTRUCTURE (or non-extensible BODY).
    BodyStructure(BodyStructure),
}

/// Parses the parenthesized list after `* n FETCH`.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                let upper = name.to_uppercase();
                match upper.as_str() {
                    "FLAGS" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Flags(parse_flag_list(lexer)?));
                    }
                    "UID" => {
                        lexer.expect_space()?;
                        let n = lexer.read_number()?;
                        let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: format!("invalid UID value: {n} (UID cannot be 0)"),
                        })?;
                        items.push(FetchItem::Uid(uid));
                    }
                    "RFC822.SIZE" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Rfc822Size(lexer.read_number()?));
                    }
                    "INTERNALDATE" => {
                        lexer.expect_space()?;
                        if let Some(date) = lexer.read_nstring()? {
                            items.push(FetchItem::InternalDate(date));
                        }
                    }
                    "ENVELOPE" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Envelope(Box::new(parse_envelope(lexer)?)));
                    }
                    "BODYSTRUCTURE" => {
                        lexer.expect_space()?;
                        push_body_structure(lexer, &mut items)?;
                    }
                    "BODY" | "BINARY" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                        let (section, origin) = parse_section_and_origin(lexer);
                        lexer.expect_space()?;

                        if section.is_none() && upper == "BODY" && lexer.peek() == Some(b'(') {
                            push_body_structure(lexer, &mut items)?;
                            continue;
                        }

                        let data = match lexer.next_token()? {
                            Token::Literal(d) => Some(d),
                            Token::QuotedString(s) => Some(s.into_bytes()),
                            _ => None,
                        };
                        let section = match upper.as_str() {
                            "RFC822" => Some(String::new()),
                            "RFC822.HEADER" => Some("HEADER".to_string()),
                            "RFC822.TEXT" => Some("TEXT".to_string()),
                            _ => section,
                        };
                        items.push(FetchItem::Body {
                            section,
                            origin,
                            data,
                        });
                    }
                    _ => skip_fetch_item(lexer)?,
                }
            }
            Token::Eof => return Err(lexer.error("Unterminated FETCH response")),
            _ => {}
        }
    }

    Ok(items)
}

/// Parses a body structure, or skips it if the server sent one this
/// parser cannot read. The rest of the response stays usable.
fn push_body_structure(lexer: &mut Lexer<'_>, items: &mut Vec<FetchItem>) -> Result<()> {
    let mut attempt = lexer.clone();
    match parse_body_structure(&mut attempt) {
        Ok(structure) => {
            *lexer = attempt;
            items.push(FetchItem::BodyStructure(structure));
        }
        Err(e) => {
            tracing::warn!(error = %e, position = lexer.position(), "skipping unreadable BODYSTRUCTURE");
            skip_fetch_item(lexer)?;
        }
    }
    Ok(())
}

/// Parses the optional `[section]` and `<origin>` after `BODY`.
///
/// The section is read raw because it may contain spaces and parentheses
/// (`HEADER.FIELDS (FROM TO)`).
fn parse_section_and_origin(lexer: &mut Lexer<'_>) -> (Option<String>, Option<u32>) {
    let mut section = None;
    let mut origin = None;

    if lexer.peek() == Some(b'[') {
        lexer.advance();
        let mut buf = String::new();
        while let Some(b) = lexer.advance() {
            if b == b']' {
                break;
            }
            buf.push(char::from(b));
        }
        section = Some(buf);
    }

    if lexer.peek() == Some(b'<') {
        lexer.advance();
        let mut buf = String::new();
        while let Some(b) = lexer.peek() {
            lexer.advance();
            if b == b'>' {
                break;
            }
            buf.push(char::from(b));
        }
        origin = buf.parse().ok();
    }

    (section, origin)
}

/// Skips the value of a fetch item this client does not interpret.
fn skip_fetch_item(lexer: &mut Lexer<'_>) -> Result<()> {
    lexer.eat_space();

    let mut depth = 0usize;
    loop {
        match lexer.peek() {
            None => return Ok(()),
            Some(b')') if depth == 0 => return Ok(()),
            Some(b' ') if depth == 0 => return Ok(()),
            Some(b'(' | b'"' | b'{') => match lexer.next_token()? {
                Token::LParen => depth += 1,
                _ if depth == 0 => return Ok(()),
                _ => {}
            },
            Some(b')') => {
                lexer.advance();
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Some(_) => {
                lexer.advance();
            }
        }
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

    fn parse(input: &[u8]) -> Vec<FetchItem> {
        parse_fetch_response(&mut Lexer::new(input)).unwrap()
    }

    #[test]
    fn test_parse_fetch_uid_valid() {
        let items = parse(b"(UID 123 FLAGS (\\Seen))");
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 123));
    }

    #[test]
    fn test_parse_fetch_uid_zero_rejected() {
        let result = parse_fetch_response(&mut Lexer::new(b"(UID 0)"));
        assert!(result.unwrap_err().to_string().contains("UID"));
    }

    #[test]
    fn test_body_section_literal() {
        let items = parse(b"(BODY[1.2] {5}\r\nhello UID 9)");
        assert_eq!(
            items[0],
            FetchItem::Body {
                section: Some("1.2".to_string()),
                origin: None,
                data: Some(b"hello".to_vec()),
            }
        );
        assert!(matches!(items[1], FetchItem::Uid(_)));
    }

    #[test]
    fn test_body_partial_origin() {
        let items = parse(b"(BODY[1]<0> {3}\r\nabc)");
        assert!(matches!(
            &items[0],
            FetchItem::Body { section: Some(s), origin: Some(0), .. } if s == "1"
        ));
    }

    #[test]
    fn test_header_fields_section() {
        let items = parse(b"(BODY[HEADER.FIELDS (FROM TO)] {4}\r\nab\r\n)");
        assert!(matches!(
            &items[0],
            FetchItem::Body { section: Some(s), .. } if s == "HEADER.FIELDS (FROM TO)"
        ));
    }

    #[test]
    fn test_nil_body() {
        let items = parse(b"(BODY[2] NIL)");
        assert!(matches!(&items[0], FetchItem::Body { data: None, .. }));
    }

    #[test]
    fn test_internaldate_and_size() {
        let items = parse(b"(INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 4286)");
        assert_eq!(
            items,
            vec![
                FetchItem::InternalDate("17-Jul-1996 02:44:25 -0700".to_string()),
                FetchItem::Rfc822Size(4286)
            ]
        );
    }

    #[test]
    fn test_unknown_items_are_skipped() {
        let items = parse(b"(MODSEQ (12345) X-GM-LABELS (\"a b\" c) UID 4)");
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 4));
    }

    #[test]
    fn test_bodystructure_item() {
        let items = parse(
            br#"(UID 5 BODYSTRUCTURE ("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "7BIT" 12 1 NIL NIL NIL NIL))"#,
        );
        assert!(matches!(&items[1], FetchItem::BodyStructure(b) if b.mime_type() == "text/plain"));
    }

    #[test]
    fn test_unreadable_bodystructure_is_skipped() {
        let items = parse(
            b"(UID 5 BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"7BIT\" abc 1) BODY[HEADER] {17}\r\nSubject: broken\r\n)",
        );
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 5));
        assert!(matches!(
            &items[1],
            FetchItem::Body { section: Some(s), data: Some(d), .. } if s == "HEADER" && d.starts_with(b"Subject")
        ));
    }
}
