//! Stream abstraction consumed by the [`Mailer`](crate::Mailer).
//!
//! A [`Connector`] opens duplex streams and upgrades them to TLS in place.
//! [`TcpConnector`] is the real implementation; tests plug in in-memory
//! streams.

mod stream;

pub use stream::{SmtpStream, connect, upgrade_to_tls};

use crate::error::Result;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};

/// Opens streams to a relay.
pub trait Connector: Send + Sync {
    /// Duplex stream type, before and after a TLS upgrade.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a stream to `host:port`.
    ///
    /// Fails with [`Error::NonExistentDomain`](crate::Error::NonExistentDomain)
    /// when the host does not resolve; the mailer then stops trying other
    /// ports. Any other error moves on to the next port.
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Performs a TLS handshake on an already open stream.
    fn upgrade(
        &self,
        stream: Self::Stream,
        host: &str,
        validate_certificate_chain: bool,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Connector over TCP with rustls for STARTTLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = SmtpStream;

    async fn connect(&self, host: &str, port: u16) -> Result<SmtpStream> {
        connect(host, port).await
    }

    async fn upgrade(
        &self,
        stream: SmtpStream,
        host: &str,
        validate_certificate_chain: bool,
    ) -> Result<SmtpStream> {
        upgrade_to_tls(stream, host, validate_certificate_chain).await
    }
}
