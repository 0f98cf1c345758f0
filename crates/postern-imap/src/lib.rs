//! # postern-imap
//!
//! The slice of IMAP (RFC 3501 / RFC 9051) a webmail front end needs to
//! open one message: read its `BODYSTRUCTURE`, decide which sections are
//! worth transferring, and fetch just those.
//!
//! ## Features
//!
//! - **Type-state client**: `NotAuthenticated` → `Authenticated` → `Selected`
//! - **Session**: `&mut self` API over the client with mailbox reuse
//! - **BODYSTRUCTURE parser**: full extension data, nested `message/rfc822`
//! - **Part selection**: section numbering, text part search, file-name lookup
//! - **Partial fetch**: `BODY.PEEK[1]<0.600000>` style truncated sections
//! - **TLS via rustls**
//!
//! ## Quick Start
//!
//! ```ignore
//! use postern_imap::connection::{Config, Credentials, Session};
//! use postern_imap::{FetchAttribute, PartTree, Uid};
//!
//! let mut session = Session::connect(Config::new("imap.example.com"), Credentials::new("me", "pw")).await?;
//! session.examine("INBOX").await?;
//!
//! let uid = Uid::new(42).unwrap();
//! let first = session.uid_fetch(uid, &[FetchAttribute::BodyStructure]).await?;
//! if let Some(structure) = first.and_then(|m| m.structure) {
//!     for part in PartTree::new(&structure).html_or_plain_parts() {
//!         println!("{} {} {}", part.part_id, part.mime_type, part.size);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod parser;
pub mod structure;
pub mod types;

mod error;
mod fetch;

pub use command::{Command, FetchAttribute, StoreAction};
pub use connection::{Config, Credentials, Security, Session};
pub use error::{Error, Result};
pub use fetch::FetchedMessage;
pub use parser::{BodyStructure, FetchItem};
pub use structure::{PartInfo, PartTree};
pub use types::{Flag, Flags, MailboxStatus, SeqNum, Uid, UidValidity};
