//! IMAP commands used for selective retrieval.

mod serialize;
mod tag_generator;
mod types;

use crate::types::Uid;

pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, StoreAction};

use serialize::{write_astring, write_fetch_attributes, write_store_action};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox name.
        mailbox: String,
    },
    /// UID FETCH for a single message.
    UidFetch {
        /// Message UID.
        uid: Uid,
        /// Items to fetch.
        items: Vec<FetchAttribute>,
    },
    /// UID STORE for a single message.
    UidStore {
        /// Message UID.
        uid: Uid,
        /// Flag change.
        action: StoreAction,
        /// Suppress the untagged FETCH echo.
        silent: bool,
    },
}

impl Command {
    /// Serializes the command to bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }
            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox);
            }
            Self::UidFetch { uid, items } => {
                buf.extend_from_slice(format!("UID FETCH {uid} ").as_bytes());
                write_fetch_attributes(&mut buf, items);
            }
            Self::UidStore {
                uid,
                action,
                silent,
            } => {
                buf.extend_from_slice(format!("UID STORE {uid} ").as_bytes());
                write_store_action(&mut buf, action, *silent);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the command name for logging. Never includes arguments, so
    /// credentials stay out of logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::UidFetch { .. } => "UID FETCH",
            Self::UidStore { .. } => "UID STORE",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::types::Flag;

    fn wire(command: &Command) -> String {
        String::from_utf8(command.serialize("A0001")).unwrap()
    }

    #[test]
    fn test_login_quotes_specials() {
        let cmd = Command::Login {
            username: "user@example.com".into(),
            password: "p a\"ss".into(),
        };
        assert_eq!(wire(&cmd), "A0001 LOGIN user@example.com \"p a\\\"ss\"\r\n");
    }

    #[test]
    fn test_examine_quotes_spaces() {
        let cmd = Command::Examine {
            mailbox: "Sent Items".into(),
        };
        assert_eq!(wire(&cmd), "A0001 EXAMINE \"Sent Items\"\r\n");
        let cmd = Command::Examine {
            mailbox: "INBOX".into(),
        };
        assert_eq!(wire(&cmd), "A0001 EXAMINE INBOX\r\n");
    }

    #[test]
    fn test_uid_fetch_single_item() {
        let cmd = Command::UidFetch {
            uid: Uid::new(42).unwrap(),
            items: vec![FetchAttribute::BodyStructure],
        };
        assert_eq!(wire(&cmd), "A0001 UID FETCH 42 BODYSTRUCTURE\r\n");
    }

    #[test]
    fn test_uid_fetch_with_partial() {
        let cmd = Command::UidFetch {
            uid: Uid::new(7).unwrap(),
            items: vec![
                FetchAttribute::Uid,
                FetchAttribute::peek("HEADER"),
                FetchAttribute::peek_truncated("1", 600_000),
            ],
        };
        assert_eq!(
            wire(&cmd),
            "A0001 UID FETCH 7 (UID BODY.PEEK[HEADER] BODY.PEEK[1]<0.600000>)\r\n"
        );
    }

    #[test]
    fn test_uid_store_add_flags() {
        let cmd = Command::UidStore {
            uid: Uid::new(9).unwrap(),
            action: StoreAction::AddFlags(vec![Flag::Answered, Flag::Forwarded]),
            silent: true,
        };
        assert_eq!(
            wire(&cmd),
            "A0001 UID STORE 9 +FLAGS.SILENT (\\Answered $Forwarded)\r\n"
        );
    }

    #[test]
    fn test_name_hides_arguments() {
        let cmd = Command::Login {
            username: "u".into(),
            password: "secret".into(),
        };
        assert_eq!(cmd.name(), "LOGIN");
    }
}
