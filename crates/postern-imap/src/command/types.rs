//! Command-related type definitions.

use crate::types::Flag;

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// Body structure.
    BodyStructure,
    /// UID.
    Uid,
    /// Body section.
    Body {
        /// Section specifier; `None` fetches the whole message.
        section: Option<String>,
        /// Peek (don't set `\Seen`).
        peek: bool,
        /// Partial fetch range as (start, length).
        partial: Option<(u32, u32)>,
    },
}

impl FetchAttribute {
    /// `BODY.PEEK[section]`.
    #[must_use]
    pub fn peek(section: impl Into<String>) -> Self {
        Self::Body {
            section: Some(section.into()),
            peek: true,
            partial: None,
        }
    }

    /// `BODY.PEEK[section]<0.limit>`.
    #[must_use]
    pub fn peek_truncated(section: impl Into<String>, limit: u32) -> Self {
        Self::Body {
            section: Some(section.into()),
            peek: true,
            partial: Some((0, limit)),
        }
    }
}

/// STORE action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace all flags.
    SetFlags(Vec<Flag>),
    /// Add flags.
    AddFlags(Vec<Flag>),
    /// Remove flags.
    RemoveFlags(Vec<Flag>),
}
