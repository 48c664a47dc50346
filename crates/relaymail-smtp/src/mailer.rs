//! Async driver running a [`Session`] over a real stream.
//!
//! ## Example
//!
//! ```ignore
//! use relaymail_smtp::{LoggingHandler, Mailer, MailerConfig, Message, Part};
//!
//! let message = Message::new("smtp.example.com", "me@example.com", "you@example.com")
//!     .subject("Hello")
//!     .part(Part::text("Hi there"))
//!     .credentials("me@example.com", "password")
//!     .secure(true)
//!     .ports([587]);
//!
//! let mailer = Mailer::new(MailerConfig::new().local_identity("client.example.com"));
//! mailer.send(&message, &mut LoggingHandler).await;
//! ```

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::MailerConfig;
use crate::connection::{Connector, TcpConnector};
use crate::error::{Error, Result};
use crate::handler::DeliveryHandler;
use crate::message::Message;
use crate::session::{Action, Session};
use crate::timer::Deadline;

const READ_BUFFER_SIZE: usize = 8192;

/// Delivers messages, one session per call.
///
/// Sessions share nothing, so one `Mailer` can deliver several messages
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct Mailer<C = TcpConnector> {
    connector: C,
    config: MailerConfig,
}

impl Mailer<TcpConnector> {
    /// Creates a mailer connecting over TCP.
    #[must_use]
    pub const fn new(config: MailerConfig) -> Self {
        Self {
            connector: TcpConnector,
            config,
        }
    }
}

impl<C: Connector> Mailer<C> {
    /// Creates a mailer using a custom connector.
    #[must_use]
    pub const fn with_connector(connector: C, config: MailerConfig) -> Self {
        Self { connector, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Returns the connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Delivers `message` and reports the outcome to `handler`.
    ///
    /// Exactly one of [`DeliveryHandler::on_sent`] and
    /// [`DeliveryHandler::on_failed`] is called.
    pub async fn send<H: DeliveryHandler>(&self, message: &Message, handler: &mut H) {
        match self.deliver(message).await {
            Ok(()) => handler.on_sent(message),
            Err(e) => handler.on_failed(message, &e),
        }
    }

    /// Delivers `message`.
    ///
    /// # Errors
    ///
    /// Returns the reason the attempt failed. Validation errors are
    /// reported before any connection is made.
    pub async fn deliver(&self, message: &Message) -> Result<()> {
        let mut session = Session::new(message, &self.config)?;
        self.run(&mut session).await
    }

    /// Delivers `content` verbatim as the message headers and body, using
    /// `message` for the envelope, relay and security settings.
    ///
    /// # Errors
    ///
    /// Returns the reason the attempt failed.
    pub async fn deliver_content(&self, message: &Message, content: &[u8]) -> Result<()> {
        let mut session = Session::with_content(message, &self.config, content)?;
        self.run(&mut session).await
    }

    async fn run(&self, session: &mut Session<'_>) -> Result<()> {
        match self.open(session).await {
            Ok(stream) => self.drive(session, stream).await,
            Err(e) => {
                session.abort(e);
                outcome(session)
            }
        }
    }

    /// Tries each relay port in turn, each under its own connect deadline.
    async fn open(&self, session: &mut Session<'_>) -> Result<C::Stream> {
        let message = session.message();
        let host = message.relay_host.as_str();
        let mut last_error = Error::InvalidEnvelope("No relay ports".into());

        for &port in &message.relay_ports {
            session.connecting(port);

            let mut connect_timer = Deadline::disarmed();
            connect_timer.arm(message.connect_timeout);
            let result = tokio::select! {
                result = self.connector.connect(host, port) => result,
                () = connect_timer.expired() => Err(Error::ConnectionTimeout),
            };
            connect_timer.disarm();

            match result {
                Ok(stream) => {
                    tracing::info!(host, port, "Connected");
                    return Ok(stream);
                }
                Err(e @ Error::NonExistentDomain(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(host, port, error = %e, "Connection attempt failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn drive(&self, session: &mut Session<'_>, stream: C::Stream) -> Result<()> {
        let host = session.message().relay_host.as_str();
        let mut stream = Some(stream);
        let mut watchdog = Deadline::disarmed();
        let mut queue: VecDeque<Action> = session.on_connected().into();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            while let Some(action) = queue.pop_front() {
                match action {
                    Action::Send(bytes) => {
                        let written = match stream.as_mut() {
                            Some(s) => tokio::select! {
                                result = write_all(s, &bytes) => Some(result),
                                () = watchdog.expired() => None,
                            },
                            None => Some(Err(std::io::ErrorKind::NotConnected.into())),
                        };
                        match written {
                            Some(Ok(())) => {}
                            Some(Err(e)) => {
                                tracing::debug!(error = %e, "Write failed");
                                queue.clear();
                                queue.extend(session.on_stream_closed());
                            }
                            // The server stopped reading.
                            None => {
                                queue.clear();
                                queue.extend(session.on_watchdog_expired());
                            }
                        }
                    }
                    Action::ResetWatchdog => watchdog.arm(self.config.watchdog_timeout),
                    Action::UpgradeTls {
                        validate_certificate_chain,
                    } => {
                        let Some(plain) = stream.take() else {
                            queue.extend(session.on_stream_closed());
                            continue;
                        };
                        let upgraded = tokio::select! {
                            result = self.connector.upgrade(plain, host, validate_certificate_chain) => Some(result),
                            () = watchdog.expired() => None,
                        };
                        match upgraded {
                            Some(Ok(secure)) => {
                                stream = Some(secure);
                                queue.extend(session.on_tls_established());
                            }
                            Some(Err(Error::TlsFailed(reason))) => {
                                queue.extend(session.on_tls_failed(reason));
                            }
                            Some(Err(e)) => queue.extend(session.on_tls_failed(e.to_string())),
                            None => queue.extend(session.on_watchdog_expired()),
                        }
                    }
                    Action::Finish => {
                        watchdog.disarm();
                        if let Some(s) = stream.take() {
                            self.close(s).await;
                        }
                        return outcome(session);
                    }
                }
            }

            let Some(s) = stream.as_mut() else {
                queue.extend(session.on_stream_closed());
                continue;
            };
            tokio::select! {
                read = s.read(&mut buf) => match read {
                    Ok(0) => queue.extend(session.on_stream_closed()),
                    Ok(n) => queue.extend(session.on_bytes(&buf[..n])),
                    Err(e) => {
                        tracing::debug!(error = %e, "Read failed");
                        queue.extend(session.on_stream_closed());
                    }
                },
                () = watchdog.expired() => queue.extend(session.on_watchdog_expired()),
            }
        }
    }

    /// Shuts the stream down, giving up after one watchdog period.
    async fn close(&self, mut stream: C::Stream) {
        let mut close_timer = Deadline::disarmed();
        close_timer.arm(self.config.watchdog_timeout);
        tokio::select! {
            result = stream.shutdown() => {
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Shutdown failed");
                }
            }
            () = close_timer.expired() => tracing::debug!("Shutdown timed out, dropping stream"),
        }
    }
}

async fn write_all<S: AsyncWrite + Unpin>(stream: &mut S, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

fn outcome(session: &mut Session<'_>) -> Result<()> {
    session.take_outcome().unwrap_or_else(|| {
        Err(Error::ConnectionInterrupted(
            "Session ended without an outcome".into(),
        ))
    })
}
