//! Response status, response codes and mailbox status.

use super::{Flag, Flags, SeqNum, Uid, UidValidity};

/// Status of a tagged or untagged condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed.
    Bad,
    /// Connection is already authenticated.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

/// Bracketed response code, e.g. `[UIDVALIDITY 3857529045]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// Human must read the text.
    Alert,
    /// Mailbox was opened read-only.
    ReadOnly,
    /// Mailbox was opened read-write.
    ReadWrite,
    /// Target mailbox does not exist.
    TryCreate,
    /// Server has no modification sequences for this mailbox.
    NoModSeq,
    /// Predicted next UID.
    UidNext(Uid),
    /// UIDVALIDITY of the mailbox.
    UidValidity(UidValidity),
    /// First unseen message.
    Unseen(SeqNum),
    /// Capabilities advertised inline.
    Capability(Vec<String>),
    /// Flags the client may change permanently.
    PermanentFlags(Vec<Flag>),
    /// Any code this client does not interpret.
    Unknown(String),
}

/// Mailbox information collected from SELECT/EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// Defined flags.
    pub flags: Flags,
    /// UIDVALIDITY.
    pub uid_validity: Option<UidValidity>,
    /// Next UID.
    pub uid_next: Option<Uid>,
    /// First unseen message.
    pub unseen: Option<SeqNum>,
    /// True if opened with EXAMINE or the server forced read-only.
    pub read_only: bool,
}
