//! Attachment descriptors and the cache they are read from.

use std::collections::HashMap;
use std::io;

/// A file the user attached while composing.
///
/// The bytes live in an external cache keyed by `temp_name`; the builder
/// only reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AttachmentDescriptor {
    /// Name of the cached file.
    pub temp_name: String,
    /// File name shown to the recipient.
    pub file_name: String,
    /// Content id as typed by the client, possibly with brackets.
    pub content_id: String,
    /// Render with `Content-Disposition: inline`.
    pub inline: bool,
    /// Only attach if the HTML body references `content_id`.
    pub linked: bool,
    /// Optional `Content-Location` value.
    pub content_location: String,
}

impl AttachmentDescriptor {
    /// Creates a regular (non-inline, non-linked) attachment.
    #[must_use]
    pub fn new(temp_name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            temp_name: temp_name.into(),
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    /// Marks the attachment as an inline image referenced by `cid`.
    #[must_use]
    pub fn linked_as(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = content_id.into();
        self.inline = true;
        self.linked = true;
        self
    }

    /// Sets the inline flag.
    #[must_use]
    pub const fn with_inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    /// Content id with surrounding whitespace and angle brackets removed.
    #[must_use]
    pub fn trimmed_content_id(&self) -> &str {
        self.content_id
            .trim()
            .trim_matches(|c| c == '<' || c == '>')
    }

    /// MIME type guessed from the file name.
    #[must_use]
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Read access to cached upload files.
///
/// `scope` isolates users from each other; implementations must never
/// resolve a name outside the given scope.
pub trait AttachmentStore {
    /// Returns true if the file exists.
    fn exists(&self, scope: &str, name: &str) -> bool;

    /// Returns the file size in bytes.
    fn size(&self, scope: &str, name: &str) -> Option<u64>;

    /// Reads the whole file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    fn read(&self, scope: &str, name: &str) -> io::Result<Vec<u8>>;
}

/// In-memory store, handy for tests and small deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryAttachmentStore {
    files: HashMap<(String, String), Vec<u8>>,
}

impl MemoryAttachmentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a file.
    pub fn insert(&mut self, scope: &str, name: &str, data: impl Into<Vec<u8>>) {
        self.files
            .insert((scope.to_string(), name.to_string()), data.into());
    }

    fn get(&self, scope: &str, name: &str) -> Option<&Vec<u8>> {
        self.files.get(&(scope.to_string(), name.to_string()))
    }
}

impl AttachmentStore for MemoryAttachmentStore {
    fn exists(&self, scope: &str, name: &str) -> bool {
        self.get(scope, name).is_some()
    }

    fn size(&self, scope: &str, name: &str) -> Option<u64> {
        self.get(scope, name)
            .and_then(|data| u64::try_from(data.len()).ok())
    }

    fn read(&self, scope: &str, name: &str) -> io::Result<Vec<u8>> {
        self.get(scope, name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_content_id() {
        let att = AttachmentDescriptor::new("t", "a.png").linked_as("  <logo@x>  ");
        assert_eq!(att.trimmed_content_id(), "logo@x");
        assert!(att.inline && att.linked);
    }

    #[test]
    fn test_mime_type_guess() {
        assert_eq!(AttachmentDescriptor::new("t", "report.pdf").mime_type(), "application/pdf");
        assert_eq!(AttachmentDescriptor::new("t", "photo.PNG").mime_type(), "image/png");
        assert_eq!(
            AttachmentDescriptor::new("t", "noext").mime_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_memory_store_scopes() {
        let mut store = MemoryAttachmentStore::new();
        store.insert("user-1", "f", b"abc".to_vec());
        assert!(store.exists("user-1", "f"));
        assert!(!store.exists("user-2", "f"));
        assert_eq!(store.size("user-1", "f"), Some(3));
        assert_eq!(store.read("user-1", "f").unwrap(), b"abc");
        assert_eq!(
            store.read("user-2", "f").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
