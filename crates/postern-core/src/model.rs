//! Account, identity and fetcher records.
//!
//! These mirror what the host's storage keeps per user. The core only
//! reads them.

use std::time::Duration;

use postern_imap::{Config, Credentials, Security};
use postern_mime::EmailAddress;
use serde::{Deserialize, Serialize};

/// Owner of accounts, identities and fetchers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incoming server settings of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapServer {
    /// Server hostname.
    pub host: String,
    /// Server port; 0 selects the default for the security mode.
    pub port: u16,
    /// Implicit TLS.
    pub use_ssl: bool,
}

/// A mail account.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Storage id.
    pub id: i64,
    /// Owner.
    pub user_id: UserId,
    /// Primary address.
    pub email: String,
    /// Display name.
    pub friendly_name: String,
    /// IMAP login.
    pub login: String,
    /// IMAP password.
    pub password: String,
    /// Incoming server.
    pub imap: ImapServer,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("imap", &self.imap)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// Creates an account owned by `user_id`.
    #[must_use]
    pub fn new(id: i64, user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            email: email.into(),
            ..Self::default()
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = name.into();
        self
    }

    /// Sets the IMAP server and login.
    #[must_use]
    pub fn imap(
        mut self,
        server: ImapServer,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.imap = server;
        self.login = login.into();
        self.password = password.into();
        self
    }

    /// Address used in From and as reading-confirmation target.
    #[must_use]
    pub fn address(&self) -> EmailAddress {
        display_address(&self.friendly_name, &self.email)
    }

    /// Connection settings for this account's IMAP server.
    #[must_use]
    pub fn imap_config(&self, io_timeout: Duration) -> Config {
        Config::builder(&self.imap.host)
            .security(Security::from_use_ssl(self.imap.use_ssl))
            .port(self.imap.port)
            .io_timeout(io_timeout)
            .build()
    }

    /// IMAP login; the address is used when no separate login is set.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        let login = if self.login.is_empty() {
            &self.email
        } else {
            &self.login
        };
        Credentials::new(login.as_str(), self.password.as_str())
    }
}

/// An alternative From address of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Storage id.
    pub id: i64,
    /// Owner.
    pub user_id: UserId,
    /// Address.
    pub email: String,
    /// Display name.
    pub friendly_name: String,
}

impl Identity {
    /// Address used in From.
    #[must_use]
    pub fn address(&self) -> EmailAddress {
        display_address(&self.friendly_name, &self.email)
    }
}

/// An external mailbox collected into an account; replies may be sent as it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fetcher {
    /// Storage id.
    pub id: i64,
    /// Owner.
    pub user_id: UserId,
    /// Address.
    pub email: String,
    /// Display name.
    pub friendly_name: String,
}

impl Fetcher {
    /// Address used in From and as reading-confirmation target.
    #[must_use]
    pub fn address(&self) -> EmailAddress {
        display_address(&self.friendly_name, &self.email)
    }
}

fn display_address(name: &str, email: &str) -> EmailAddress {
    let name = name.trim();
    if name.is_empty() {
        EmailAddress::new(email.trim())
    } else {
        EmailAddress::with_name(name, email.trim())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new(1, UserId(7), "me@example.com")
            .friendly_name("Me")
            .imap(
                ImapServer {
                    host: "imap.example.com".into(),
                    port: 0,
                    use_ssl: true,
                },
                "",
                "pw",
            )
    }

    #[test]
    fn test_imap_config_defaults_port() {
        let config = account().imap_config(Duration::from_secs(10));
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.io_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_login_falls_back_to_email() {
        assert_eq!(account().credentials().username, "me@example.com");
    }

    #[test]
    fn test_debug_hides_password() {
        let debug = format!("{:?}", account());
        assert!(!debug.contains("pw\""));
        assert!(debug.contains("me@example.com"));
    }

    #[test]
    fn test_default_records_have_no_owner() {
        assert_eq!(Account::default().user_id, UserId(0));
        assert_eq!(Fetcher::default().user_id, UserId::default());
    }

    #[test]
    fn test_address_without_name() {
        let identity = Identity {
            email: " id@example.com ".into(),
            ..Identity::default()
        };
        assert_eq!(identity.address(), EmailAddress::new("id@example.com"));
    }
}
