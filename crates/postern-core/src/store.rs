//! Directory-backed upload cache.

use std::io;
use std::path::{Path, PathBuf};

use postern_mime::AttachmentStore;

/// Reads cached uploads from `<root>/<scope>/<name>`.
///
/// Scopes and names must be single path components; anything else is
/// reported as missing.
#[derive(Debug, Clone)]
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, scope: &str, name: &str) -> Option<PathBuf> {
        (is_component(scope) && is_component(name)).then(|| self.root.join(scope).join(name))
    }
}

fn is_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

impl AttachmentStore for FsAttachmentStore {
    fn exists(&self, scope: &str, name: &str) -> bool {
        self.path(scope, name).is_some_and(|p| p.is_file())
    }

    fn size(&self, scope: &str, name: &str) -> Option<u64> {
        let meta = std::fs::metadata(self.path(scope, name)?).ok()?;
        meta.is_file().then(|| meta.len())
    }

    fn read(&self, scope: &str, name: &str) -> io::Result<Vec<u8>> {
        let path = self.path(scope, name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("invalid upload name: {name}"))
        })?;
        std::fs::read(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store_with_file() -> (tempfile::TempDir, FsAttachmentStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("u1")).unwrap();
        std::fs::write(dir.path().join("u1").join("tmp-1"), b"hello").unwrap();
        std::fs::write(dir.path().join("secret"), b"nope").unwrap();
        let store = FsAttachmentStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_reads_within_scope() {
        let (_dir, store) = store_with_file();
        assert!(store.exists("u1", "tmp-1"));
        assert_eq!(store.size("u1", "tmp-1"), Some(5));
        assert_eq!(store.read("u1", "tmp-1").unwrap(), b"hello");
        assert!(!store.exists("u2", "tmp-1"));
    }

    #[test]
    fn test_rejects_traversal() {
        let (_dir, store) = store_with_file();
        assert!(!store.exists("u1", "../secret"));
        assert!(!store.exists("..", "secret"));
        assert!(store.size("u1", "..").is_none());
        assert_eq!(
            store.read("u1", "../secret").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let (_dir, store) = store_with_file();
        std::fs::create_dir(store.root().join("u1").join("sub")).unwrap();
        assert!(!store.exists("u1", "sub"));
        assert!(store.size("u1", "sub").is_none());
    }
}
