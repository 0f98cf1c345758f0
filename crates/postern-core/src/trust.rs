//! Sender trust for remote content.

use std::collections::HashSet;
use std::future::Future;

use crate::Result;
use crate::model::UserId;

/// Answers whether a user trusts a sender enough to load remote images.
pub trait SenderTrustLookup {
    /// `email` is trimmed but not lowercased.
    fn is_trusted(
        &self,
        user: UserId,
        email: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// In-memory list of `(user, address)` pairs, compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TrustedSenders {
    entries: HashSet<(UserId, String)>,
}

impl TrustedSenders {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `email` as safe for `user`.
    pub fn insert(&mut self, user: UserId, email: &str) {
        self.entries.insert((user, email.trim().to_lowercase()));
    }
}

impl SenderTrustLookup for TrustedSenders {
    async fn is_trusted(&self, user: UserId, email: &str) -> Result<bool> {
        Ok(self.entries.contains(&(user, email.trim().to_lowercase())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_is_per_user_and_case_insensitive() {
        let mut trusted = TrustedSenders::new();
        trusted.insert(UserId(1), "Boss@Example.com");

        assert!(trusted.is_trusted(UserId(1), "boss@example.com").await.unwrap());
        assert!(!trusted.is_trusted(UserId(2), "boss@example.com").await.unwrap());
    }
}
