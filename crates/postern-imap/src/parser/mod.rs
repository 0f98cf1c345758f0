//! Sans-I/O parser for IMAP server responses.
//!
//! Covers what selective retrieval needs: condition responses, mailbox
//! data from SELECT/EXAMINE, and FETCH with full BODYSTRUCTURE, ENVELOPE
//! and body sections. Other untagged data is recognised and skipped.
//!
//! ```
//! use postern_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 3 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
//! ```

mod body;
mod fetch;
mod lexer;
mod response;

pub use body::{
    Address, BodyExtension, BodyFields, BodyStructure, Disposition, Envelope, parse_body_structure,
};
pub use fetch::FetchItem;
pub use lexer::{Lexer, Token};
pub use response::{Response, ResponseParser, UntaggedResponse};
