//! # postern-core
//!
//! Webmail services on top of `postern-imap` and `postern-mime`.
//!
//! ## Features
//!
//! - **Selective retrieval**: [`MessageFetcher`] reads the BODYSTRUCTURE
//!   first and then fetches only the header and the displayable text,
//!   truncating oversized parts
//! - **Compose**: [`ComposeService`] assembles, sends and saves drafts,
//!   then flags the original message
//! - **Extension hooks**: other modules can request extra parts or learn
//!   which addresses were used
//! - **Typed settings**: [`MailConfig`] loaded from per-module settings
//!
//! ## Quick Start
//!
//! ```ignore
//! use postern_core::{ImapTransport, MailConfig, MessageFetcher, UserId};
//! use postern_imap::Session;
//!
//! let session = Session::connect(account.imap_config(timeout), account.credentials()).await?;
//! let mut transport = ImapTransport::new(session);
//!
//! let fetcher = MessageFetcher::new(UserId(1), MailConfig::default());
//! let message = fetcher.fetch_message(&mut transport, "INBOX", 42, None).await?;
//! println!("{}", message.headers.subject);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod compose;
pub mod config;
pub mod fetcher;
pub mod hooks;
pub mod message;
pub mod model;
pub mod settings;
pub mod store;
pub mod transport;
pub mod trust;

mod error;

pub use compose::{ComposeService, MailDelivery, SendOptions, resolve_sender};
pub use config::MailConfig;
pub use error::{Error, ErrorKind, ProtocolKind, Result};
pub use fetcher::{FetchPlan, MessageFetcher, SelectedPart};
pub use hooks::{CustomPartData, ExtensionHooks, NoHooks};
pub use message::{DetachedSignature, Message, MessageHeaders};
pub use model::{Account, Fetcher, Identity, ImapServer, UserId};
pub use settings::ModuleSettings;
pub use store::FsAttachmentStore;
pub use transport::{FlagStore, ImapTransport, MailboxTransport};
pub use trust::{SenderTrustLookup, TrustedSenders};
