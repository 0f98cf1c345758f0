//! Extension points for other modules.
//!
//! A host can plug in modules that need extra MIME parts of a message (for
//! example an encryption module asking for its key parts) or want to learn
//! which addresses the user just wrote to.

use std::collections::BTreeMap;

use postern_imap::PartInfo;

use crate::Result;
use crate::message::Message;

/// A part fetched on behalf of a hook, decoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPartData {
    /// Structure entry of the part.
    pub part: PartInfo,
    /// Transfer- and charset-decoded content.
    pub data: String,
}

/// Hooks called by the fetcher and the compose service.
///
/// Every method has a no-op default.
pub trait ExtensionHooks: Send + Sync {
    /// Nominates additional part ids to fetch, given every leaf part of the
    /// message.
    fn on_body_structure_parts(&self, _parts: &[PartInfo]) -> Vec<String> {
        Vec::new()
    }

    /// Called for every assembled message with the nominated parts, which
    /// may be none. A part the server did not return has empty `data`.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller; the fetch still succeeds.
    fn on_message_assembled(&self, _parts: &[CustomPartData], _message: &mut Message) -> Result<()> {
        Ok(())
    }

    /// Receives the recipients of a sent message, lowercased address to
    /// trimmed display name.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller; the send still succeeds.
    fn on_emails_used(&self, _emails: &BTreeMap<String, String>) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ExtensionHooks for NoHooks {}
