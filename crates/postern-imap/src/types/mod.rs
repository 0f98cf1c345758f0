//! Core IMAP types.

mod flags;
mod identifiers;
mod status;

pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use status::{MailboxStatus, ResponseCode, Status};
