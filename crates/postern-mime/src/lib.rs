//! # postern-mime
//!
//! MIME assembly for outgoing webmail messages, plus the decoding helpers
//! the fetch side needs for headers, transfer encodings and charsets.
//!
//! ## Features
//!
//! - **Message assembly**: compose request to a `mixed`/`related`/`alternative` tree
//! - **Inline images**: `data:` URLs in HTML become `cid:` parts
//! - **Linked attachments**: attached only when the body references their cid
//! - **Encoding/Decoding**: streaming Base64, Quoted-Printable, RFC 2047, charsets
//!
//! ## Quick Start
//!
//! ```ignore
//! use postern_mime::{ComposeRequest, EmailAddress, MemoryAttachmentStore, MessageBuilder, SenderContext};
//!
//! let sender = SenderContext::new(EmailAddress::new("me@example.com"));
//! let request = ComposeRequest::new(sender)
//!     .to("Alice <alice@example.com>")
//!     .subject("Lunch")
//!     .html_body("<p>Noon?</p>");
//!
//! let message = MessageBuilder::new()
//!     .with_x_mailer("postern")
//!     .build(&request, &MemoryAttachmentStore::new())?;
//! let bytes = message.to_bytes();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod attachment;
mod builder;
mod content_type;
mod error;
mod header;
mod part;

pub mod encoding;
pub mod html;

pub use address::{AddressList, EmailAddress};
pub use attachment::{AttachmentDescriptor, AttachmentStore, MemoryAttachmentStore};
pub use builder::{
    AssembledMessage, ComposeRequest, DraftInfo, DraftKind, Importance, MessageBuilder,
    SenderContext, Sensitivity,
};
pub use content_type::ContentType;
pub use encoding::TransferEncoding;
pub use error::{Error, Result};
pub use header::Headers;
pub use part::{Part, PartBody};
