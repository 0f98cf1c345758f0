//! IMAP response parser.

#![allow(clippy::missing_errors_doc)]

use crate::parser::fetch::{FetchItem, parse_fetch_response};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{Flag, Flags, ResponseCode, SeqNum, Status, Tag, Uid, UidValidity};
use crate::{Error, Result};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// Untagged condition (`OK`, `NO`, `BAD`, `PREAUTH`, `BYE`).
    Condition {
        /// Condition status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY response.
    Capability(Vec<String>),
    /// FLAGS response.
    Flags(Flags),
    /// EXISTS response (message count).
    Exists(u32),
    /// RECENT response.
    Recent(u32),
    /// EXPUNGE response.
    Expunge(SeqNum),
    /// FETCH response.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Fetch data items.
        items: Vec<FetchItem>,
    },
    /// Any other untagged data, kept as the keyword.
    Other(String),
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response, literals included.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => {
                lexer.eat_space();
                let text = read_text_until_crlf(&mut lexer);
                Ok(Response::Continuation {
                    text: if text.is_empty() { None } else { Some(text) },
                })
            }
            Token::Atom(tag) => {
                lexer.expect_space()?;
                let status = parse_status(&mut lexer)?;
                let (code, text) = parse_resp_text(&mut lexer)?;
                Ok(Response::Tagged {
                    tag: Tag::new(tag),
                    status,
                    code,
                    text,
                })
            }
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let untagged = match lexer.next_token()? {
            Token::Atom(keyword) => match keyword.to_uppercase().as_str() {
                "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                    let status = status_from_str(keyword).ok_or_else(|| lexer.error("status"))?;
                    let (code, text) = parse_resp_text(lexer)?;
                    UntaggedResponse::Condition { status, code, text }
                }
                "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
                "FLAGS" => {
                    lexer.expect_space()?;
                    UntaggedResponse::Flags(parse_flag_list(lexer)?)
                }
                other => UntaggedResponse::Other(other.to_string()),
            },
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?.to_uppercase();
                match keyword.as_str() {
                    "EXISTS" => UntaggedResponse::Exists(n),
                    "RECENT" => UntaggedResponse::Recent(n),
                    "EXPUNGE" => UntaggedResponse::Expunge(seq_num(lexer, n)?),
                    "FETCH" => {
                        let seq = seq_num(lexer, n)?;
                        lexer.expect_space()?;
                        let items = parse_fetch_response(lexer)?;
                        UntaggedResponse::Fetch { seq, items }
                    }
                    _ => UntaggedResponse::Other(keyword),
                }
            }
            token => {
                return Err(lexer.error(&format!(
                    "Unexpected token in untagged response: {token:?}"
                )));
            }
        };

        Ok(Response::Untagged(untagged))
    }
}

fn seq_num(lexer: &Lexer<'_>, n: u32) -> Result<SeqNum> {
    SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))
}

fn status_from_str(s: &str) -> Option<Status> {
    match s.to_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        "PREAUTH" => Some(Status::PreAuth),
        "BYE" => Some(Status::Bye),
        _ => None,
    }
}

fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
    let s = lexer.read_atom_string()?;
    status_from_str(s).ok_or_else(|| lexer.error(&format!("Invalid status: {s}")))
}

/// Parses `[SP] ["[" code "]" SP] text CRLF`.
fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    lexer.eat_space();

    let code = if lexer.peek() == Some(b'[') {
        Some(parse_response_code(lexer)?)
    } else {
        None
    };
    lexer.eat_space();

    Ok((code, read_text_until_crlf(lexer)))
}

fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let code = match atom.to_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| lexer.error("Invalid UID 0"))?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidValidity(
                UidValidity::new(n).ok_or_else(|| lexer.error("Invalid UIDVALIDITY 0"))?,
            )
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::Unseen(seq_num(lexer, n)?)
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?.into_iter().collect())
        }
        _ => ResponseCode::Unknown(atom.to_string()),
    };

    while lexer.peek().is_some_and(|b| b != b']' && b != b'\r') {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    let mut caps = Vec::new();
    while lexer.eat_space() {
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(s.to_uppercase());
        }
    }
    Ok(caps)
}

/// Parses a parenthesized flag list.
pub(crate) fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            // `\*` in PERMANENTFLAGS lexes as `\` followed by `*`.
            Token::Space | Token::Asterisk => {}
            token => {
                return Err(lexer.error(&format!("Unexpected token in flag list: {token:?}")));
            }
        }
    }
    Ok(flags)
}

fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();
    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());
    lexer.skip(end + 2);
    String::from_utf8_lossy(&remaining[..end]).into_owned()
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

    #[test]
    fn test_parse_greeting() {
        let response = ResponseParser::parse(b"* OK IMAP4rev2 server ready\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Condition { status, code, text }) => {
                assert_eq!(status, Status::Ok);
                assert!(code.is_none());
                assert_eq!(text, "IMAP4rev2 server ready");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged_no() {
        let response =
            ResponseParser::parse(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
                .unwrap();
        match response {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                assert_eq!(tag.as_str(), "A0001");
                assert_eq!(status, Status::No);
                assert_eq!(
                    code,
                    Some(ResponseCode::Unknown("AUTHENTICATIONFAILED".into()))
                );
                assert_eq!(text, "Invalid credentials");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_uidvalidity_code() {
        let response = ResponseParser::parse(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
            .unwrap();
        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Condition {
                code: Some(ResponseCode::UidValidity(v)),
                ..
            }) if v.get() == 3857529045
        ));
    }

    #[test]
    fn test_parse_permanent_flags_with_wildcard() {
        let response = ResponseParser::parse(
            b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n",
        )
        .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Condition {
                code: Some(ResponseCode::PermanentFlags(flags)),
                ..
            }) => assert!(flags.contains(&Flag::Seen)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_read_only_tagged() {
        let response = ResponseParser::parse(b"A0002 OK [READ-ONLY] EXAMINE completed\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged {
                code: Some(ResponseCode::ReadOnly),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_exists_and_recent() {
        assert_eq!(
            ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Exists(23))
        );
        assert_eq!(
            ResponseParser::parse(b"* 2 RECENT\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Recent(2))
        );
    }

    #[test]
    fn test_parse_fetch() {
        let response =
            ResponseParser::parse(b"* 12 FETCH (FLAGS (\\Seen) UID 4827313)\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                assert_eq!(seq.get(), 12);
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_untagged_is_other() {
        let response = ResponseParser::parse(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Other("LIST".to_string()))
        );
    }

    #[test]
    fn test_capability() {
        let response = ResponseParser::parse(b"* CAPABILITY IMAP4rev1 IDLE literal+\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Capability(vec![
                "IMAP4REV1".into(),
                "IDLE".into(),
                "LITERAL+".into()
            ]))
        );
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            ResponseParser::parse(b"+ Ready\r\n").unwrap(),
            Response::Continuation {
                text: Some("Ready".to_string())
            }
        );
    }
}
