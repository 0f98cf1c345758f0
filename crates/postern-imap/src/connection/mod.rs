//! Connection management.
//!
//! - Configuration (host, port, security, timeouts)
//! - TLS/plaintext stream abstraction
//! - Framed I/O with literal support
//! - Type-state client and a stateful session on top of it

mod client;
mod config;
mod framed;
mod session;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use config::{Config, ConfigBuilder, Security};
pub use framed::FramedStream;
pub use session::{Credentials, Session};
pub use stream::{ImapStream, connect, connect_plain, connect_tls, create_tls_connector};
