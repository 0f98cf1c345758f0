//! Socket setup for a mail session: a TCP connection, optionally wrapped
//! in TLS, opened within the configured connect timeout.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::config::{Config, Security};
use crate::{Error, Result};

/// Byte stream under a [`Session`](super::Session).
pub enum ImapStream {
    /// Cleartext socket, only for [`Security::None`].
    Plain(TcpStream),
    /// Socket with a completed TLS handshake.
    Tls(Box<TlsStream<TcpStream>>),
}

/// Object-safe union of the traits a session needs from its socket.
trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

impl ImapStream {
    /// Whether credentials sent over this stream are encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    fn duplex(self: Pin<&mut Self>) -> Pin<&mut dyn Duplex> {
        match self.get_mut() {
            Self::Plain(tcp) => Pin::new(tcp as &mut dyn Duplex),
            Self::Tls(tls) => Pin::new(tls.as_mut() as &mut dyn Duplex),
        }
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.duplex().poll_read(cx, buf)
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.duplex().poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.duplex().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.duplex().poll_shutdown(cx)
    }
}

/// TLS client setup shared by every implicit-TLS session. Server
/// certificates are checked against the bundled Mozilla roots; no client
/// certificate is offered.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Opens a socket to `host:port` and performs the TLS handshake on it.
/// The certificate must be valid for `host`.
pub async fn connect_tls(host: &str, port: u16) -> Result<ImapStream> {
    let server_name = ServerName::try_from(host.to_owned())?;
    let tcp = TcpStream::connect((host, port)).await?;
    let tls = create_tls_connector().connect(server_name, tcp).await?;
    Ok(ImapStream::Tls(Box::new(tls)))
}

/// Opens a cleartext socket to `host:port`.
pub async fn connect_plain(host: &str, port: u16) -> Result<ImapStream> {
    Ok(ImapStream::Plain(TcpStream::connect((host, port)).await?))
}

/// Opens the socket for a new session. Gives up with [`Error::Timeout`]
/// once `config.connect_timeout` has passed, TLS handshake included.
pub async fn connect(config: &Config) -> Result<ImapStream> {
    debug!(
        host = %config.host,
        port = config.port,
        tls = matches!(config.security, Security::Implicit),
        "opening mail socket"
    );
    let opening = async {
        match config.security {
            Security::Implicit => connect_tls(&config.host, config.port).await,
            Security::None => connect_plain(&config.host, config.port).await,
        }
    };
    tokio::time::timeout(config.connect_timeout, opening)
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_socket_is_a_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::builder("127.0.0.1")
            .security(Security::None)
            .port(port)
            .build();
        let err = connect(&config).await.err().unwrap();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_plain_socket_is_not_tls() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect_plain("127.0.0.1", port).await.unwrap();
        assert!(!stream.is_tls());
    }

    #[tokio::test]
    async fn test_tls_needs_a_valid_host_name() {
        let err = connect_tls("not a host name", 993).await.err().unwrap();
        assert!(matches!(err, Error::InvalidDnsName(_)));
    }
}
