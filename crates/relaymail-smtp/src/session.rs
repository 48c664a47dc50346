//! SMTP session state machine.
//!
//! [`Session`] is sans-I/O: it consumes stream events (connected, bytes
//! received, TLS result, timer expiry, close) and answers with
//! [`Action`]s for a driver to perform. It never touches a socket, which
//! keeps every transition testable with scripted replies.
//!
//! ## Flow
//!
//! ```text
//! Idle → Connecting → WaitingGreeting → WaitingEhloReply
//!   → [WaitingTlsReply → WaitingEhloReply]
//!   → [auth states → WaitingAuthSuccess]
//!   → WaitingFromReply → WaitingToReply → WaitingEnterMail
//!   → WaitingSendSuccess → WaitingQuitReply → MessageSent
//! ```
//!
//! `Failed` is reachable from every non-terminal state. Once a terminal
//! state is reached the outcome is fixed and later events are ignored.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::auth;
use crate::command::Command;
use crate::config::MailerConfig;
use crate::data;
use crate::error::{Error, Result};
use crate::message::{Envelope, Message};
use crate::parser::ReplyBuffer;
use crate::types::{Address, AuthMechanism, Capabilities, Reply, ReplyCode};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, nothing attempted yet.
    Idle,
    /// Opening the stream.
    Connecting,
    /// Stream open, waiting for the 220 greeting.
    WaitingGreeting,
    /// EHLO (or HELO) sent.
    WaitingEhloReply,
    /// STARTTLS sent, or TLS handshake in progress.
    WaitingTlsReply,
    /// `AUTH CRAM-MD5` / `AUTH DIGEST-MD5` sent, waiting for the challenge.
    WaitingAuthChallenge,
    /// `AUTH LOGIN` sent, waiting for the username prompt.
    WaitingAuthUsernameReply,
    /// Username sent, waiting for the password prompt.
    WaitingAuthPasswordReply,
    /// Credentials sent, waiting for 235.
    WaitingAuthSuccess,
    /// MAIL FROM sent.
    WaitingFromReply,
    /// RCPT TO sent.
    WaitingToReply,
    /// DATA sent, waiting for 354.
    WaitingEnterMail,
    /// Message data sent.
    WaitingSendSuccess,
    /// QUIT sent.
    WaitingQuitReply,
    /// Delivered.
    MessageSent,
    /// Aborted.
    Failed,
}

impl State {
    /// Returns true for `MessageSent` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::MessageSent | Self::Failed)
    }
}

/// Work the driver must carry out, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write these bytes to the stream.
    Send(Vec<u8>),
    /// The dialogue progressed; re-arm the watchdog.
    ResetWatchdog,
    /// Perform a TLS handshake on the open stream, then report back with
    /// [`Session::on_tls_established`] or [`Session::on_tls_failed`].
    UpgradeTls {
        /// Whether the server certificate chain must validate.
        validate_certificate_chain: bool,
    },
    /// The session reached a terminal state: disarm the timers, close the
    /// stream and collect [`Session::take_outcome`].
    Finish,
}

/// One delivery attempt of one [`Message`].
#[derive(Debug)]
pub struct Session<'a> {
    message: &'a Message,
    local_identity: String,
    from: Address,
    recipients: VecDeque<Address>,
    payload: Vec<u8>,
    payload_size: usize,
    state: State,
    buffer: ReplyBuffer,
    capabilities: Capabilities,
    is_secure: bool,
    helo_sent: bool,
    tls_pending: bool,
    mechanism: Option<AuthMechanism>,
    rspauth_acked: bool,
    outbox: Vec<Action>,
    outcome: Option<Result<()>>,
}

impl<'a> Session<'a> {
    /// Validates and serializes the message, ready to connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the message fails validation or cannot be
    /// composed. No network activity has happened at this point.
    pub fn new(message: &'a Message, config: &MailerConfig) -> Result<Self> {
        let envelope = message.validate()?;
        let content = message.compose()?.to_bytes();
        Ok(Self::assemble(message, config, envelope, &content))
    }

    /// Like [`Session::new`], sending `content` verbatim as the message
    /// headers and body instead of composing them from the parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the message fails validation.
    pub fn with_content(
        message: &'a Message,
        config: &MailerConfig,
        content: impl AsRef<[u8]>,
    ) -> Result<Self> {
        let envelope = message.validate()?;
        Ok(Self::assemble(message, config, envelope, content.as_ref()))
    }

    fn assemble(
        message: &'a Message,
        config: &MailerConfig,
        envelope: Envelope,
        content: &[u8],
    ) -> Self {
        Self {
            message,
            local_identity: config.local_identity.clone(),
            from: envelope.from,
            recipients: envelope.recipients.into(),
            payload: data::frame(content),
            payload_size: content.len(),
            state: State::Idle,
            buffer: ReplyBuffer::new(config.max_line_length),
            capabilities: Capabilities::default(),
            is_secure: false,
            helo_sent: false,
            tls_pending: false,
            mechanism: None,
            rspauth_acked: false,
            outbox: Vec::new(),
            outcome: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns true once TLS has been negotiated.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.is_secure
    }

    /// Returns the capabilities from the latest EHLO reply.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the message being delivered.
    #[must_use]
    pub const fn message(&self) -> &'a Message {
        self.message
    }

    /// Returns true once the session reached `MessageSent` or `Failed`.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Takes the terminal outcome. Returns `None` before the session
    /// finishes and on every call after the first.
    pub fn take_outcome(&mut self) -> Option<Result<()>> {
        self.outcome.take()
    }

    /// Records a connection attempt to `port`.
    pub fn connecting(&mut self, port: u16) {
        if matches!(self.state, State::Idle | State::Connecting) {
            tracing::debug!(host = %self.message.relay_host, port, "Connecting");
            self.transition(State::Connecting);
        }
    }

    /// The stream is open.
    pub fn on_connected(&mut self) -> Vec<Action> {
        if self.state == State::Connecting {
            self.transition(State::WaitingGreeting);
            self.outbox.push(Action::ResetWatchdog);
        }
        self.drain()
    }

    /// Bytes arrived from the server, in any chunking.
    pub fn on_bytes(&mut self, bytes: &[u8]) -> Vec<Action> {
        if self.is_finished() || self.tls_pending {
            return Vec::new();
        }
        self.buffer.extend(bytes);

        while !self.is_finished() && !self.tls_pending {
            match self.buffer.next_reply() {
                Ok(Some(reply)) => self.dispatch(&reply),
                Ok(None) => break,
                Err(e) => self.fail(e),
            }
        }
        self.drain()
    }

    /// The TLS handshake requested by [`Action::UpgradeTls`] succeeded.
    pub fn on_tls_established(&mut self) -> Vec<Action> {
        if self.tls_pending && !self.is_finished() {
            tracing::info!(host = %self.message.relay_host, "TLS established");
            self.tls_pending = false;
            self.is_secure = true;
            // Capabilities advertised in plaintext are discarded.
            self.capabilities = Capabilities::default();
            self.helo_sent = false;
            self.send_hello();
            self.outbox.push(Action::ResetWatchdog);
        }
        self.drain()
    }

    /// The TLS handshake failed.
    pub fn on_tls_failed(&mut self, reason: impl Into<String>) -> Vec<Action> {
        self.fail(Error::TlsFailed(reason.into()));
        self.drain()
    }

    /// The watchdog fired.
    pub fn on_watchdog_expired(&mut self) -> Vec<Action> {
        let state = self.state;
        tracing::warn!(?state, "Watchdog expired");
        self.fail(Error::ConnectionInterrupted(format!(
            "No reply from server in state {state:?}"
        )));
        self.drain()
    }

    /// The server closed the stream or a read/write failed.
    ///
    /// A close after QUIT was sent still counts as delivered.
    pub fn on_stream_closed(&mut self) -> Vec<Action> {
        if self.state == State::WaitingQuitReply {
            self.succeed();
        } else {
            self.fail(Error::ConnectionInterrupted(
                "Connection closed by server".into(),
            ));
        }
        self.drain()
    }

    /// Aborts with an error raised outside the dialogue (connect failure,
    /// connect timeout, DNS failure).
    pub fn abort(&mut self, error: Error) -> Vec<Action> {
        self.fail(error);
        self.drain()
    }

    fn drain(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.outbox)
    }

    fn dispatch(&mut self, reply: &Reply) {
        tracing::debug!(
            code = reply.code.as_u16(),
            status = reply.enhanced_status(),
            text = reply.first_line(),
            "S:"
        );
        match self.step(reply) {
            Ok(()) if !self.is_finished() => self.outbox.push(Action::ResetWatchdog),
            Ok(()) => {}
            Err(e) => self.fail(e),
        }
    }

    fn step(&mut self, reply: &Reply) -> Result<()> {
        let code = reply.code;
        match self.state {
            State::WaitingGreeting => {
                if code != ReplyCode::SERVICE_READY {
                    return Err(self.unexpected(reply));
                }
                self.send_hello();
            }
            State::WaitingEhloReply => {
                if code == ReplyCode::OK {
                    self.capabilities = if self.helo_sent {
                        Capabilities::default()
                    } else {
                        Capabilities::from_ehlo(reply)
                    };
                    self.after_hello()?;
                } else if code.is_permanent() && !self.helo_sent {
                    tracing::debug!(code = code.as_u16(), "EHLO refused, falling back to HELO");
                    self.helo_sent = true;
                    self.send(&Command::Helo {
                        hostname: self.local_identity.clone(),
                    });
                } else {
                    return Err(self.unexpected(reply));
                }
            }
            State::WaitingTlsReply => {
                if code != ReplyCode::SERVICE_READY {
                    return Err(Error::TlsUnavailable {
                        code: Some(code.as_u16()),
                    });
                }
                self.tls_pending = true;
                // Nothing sent before the handshake may be trusted.
                self.buffer.clear();
                self.outbox.push(Action::UpgradeTls {
                    validate_certificate_chain: self.message.validate_certificate_chain,
                });
            }
            State::WaitingAuthChallenge => {
                if code != ReplyCode::AUTH_CONTINUE {
                    return Err(invalid_credentials(reply));
                }
                let response = self.challenge_response(reply.first_line())?;
                self.send(&Command::AuthResponse(response));
                self.transition(State::WaitingAuthSuccess);
            }
            State::WaitingAuthUsernameReply => {
                if code != ReplyCode::AUTH_CONTINUE {
                    return Err(invalid_credentials(reply));
                }
                self.send(&Command::AuthResponse(auth::login_response(
                    &self.message.login,
                )));
                self.transition(State::WaitingAuthPasswordReply);
            }
            State::WaitingAuthPasswordReply => {
                if code != ReplyCode::AUTH_CONTINUE {
                    return Err(invalid_credentials(reply));
                }
                self.send(&Command::AuthResponse(auth::login_response(self.password())));
                self.transition(State::WaitingAuthSuccess);
            }
            State::WaitingAuthSuccess => {
                if code == ReplyCode::AUTH_SUCCEEDED {
                    tracing::info!(login = %self.message.login, "Authenticated");
                    self.begin_mail()?;
                } else if code == ReplyCode::AUTH_CONTINUE
                    && self.mechanism == Some(AuthMechanism::DigestMd5)
                    && !self.rspauth_acked
                {
                    // DIGEST-MD5 rspauth; acknowledged with an empty line.
                    self.rspauth_acked = true;
                    self.send(&Command::AuthResponse(String::new()));
                } else {
                    return Err(invalid_credentials(reply));
                }
            }
            State::WaitingFromReply => {
                if code != ReplyCode::OK {
                    return Err(self.rejection(reply));
                }
                self.send_next_recipient();
            }
            State::WaitingToReply => {
                if code != ReplyCode::OK && code != ReplyCode::FORWARD {
                    return Err(self.rejection(reply));
                }
                self.send_next_recipient();
            }
            State::WaitingEnterMail => {
                if code != ReplyCode::START_DATA {
                    return Err(self.rejection(reply));
                }
                let payload = std::mem::take(&mut self.payload);
                tracing::debug!(bytes = payload.len(), "C: <message data>");
                self.outbox.push(Action::Send(payload));
                self.transition(State::WaitingSendSuccess);
            }
            State::WaitingSendSuccess => {
                if code != ReplyCode::OK {
                    return Err(self.rejection(reply));
                }
                tracing::info!(text = reply.first_line(), "Message accepted");
                self.send(&Command::Quit);
                self.transition(State::WaitingQuitReply);
            }
            // The message is committed once DATA was accepted.
            State::WaitingQuitReply => self.succeed(),
            State::Idle | State::Connecting => {
                return Err(Error::unexpected(code.as_u16(), "Reply before connection"));
            }
            State::MessageSent | State::Failed => {}
        }
        Ok(())
    }

    fn send_hello(&mut self) {
        self.send(&Command::Ehlo {
            hostname: self.local_identity.clone(),
        });
        self.transition(State::WaitingEhloReply);
    }

    fn after_hello(&mut self) -> Result<()> {
        if self.message.wants_secure_transport && !self.is_secure {
            if !self.capabilities.supports_starttls() {
                return Err(Error::TlsUnavailable { code: None });
            }
            self.send(&Command::StartTls);
            self.transition(State::WaitingTlsReply);
            return Ok(());
        }

        if self.message.requires_auth {
            self.begin_auth()
        } else {
            self.begin_mail()
        }
    }

    fn begin_auth(&mut self) -> Result<()> {
        let mechanism = self
            .capabilities
            .preferred_auth()
            .ok_or(Error::UnsupportedAuthMechanism)?;
        self.mechanism = Some(mechanism);
        tracing::debug!(%mechanism, "Selected auth mechanism");

        match mechanism {
            AuthMechanism::CramMd5 | AuthMechanism::DigestMd5 => {
                self.send(&Command::Auth {
                    mechanism,
                    initial_response: None,
                });
                self.transition(State::WaitingAuthChallenge);
            }
            AuthMechanism::Plain => {
                let response = auth::plain_response(&self.message.login, self.password());
                self.send(&Command::Auth {
                    mechanism,
                    initial_response: Some(response),
                });
                self.transition(State::WaitingAuthSuccess);
            }
            AuthMechanism::Login => {
                self.send(&Command::Auth {
                    mechanism,
                    initial_response: None,
                });
                self.transition(State::WaitingAuthUsernameReply);
            }
        }
        Ok(())
    }

    fn challenge_response(&self, challenge: &str) -> Result<String> {
        let login = &self.message.login;
        match self.mechanism {
            Some(AuthMechanism::CramMd5) => {
                auth::cram_md5_response(login, self.password(), challenge)
            }
            Some(AuthMechanism::DigestMd5) => {
                let cnonce = Uuid::new_v4().simple().to_string();
                auth::digest_md5_response(
                    login,
                    self.password(),
                    challenge,
                    &self.message.relay_host,
                    &cnonce,
                )
            }
            _ => Err(Error::unexpected(
                ReplyCode::AUTH_CONTINUE.as_u16(),
                "Unexpected SASL challenge",
            )),
        }
    }

    fn begin_mail(&mut self) -> Result<()> {
        if let Some(limit) = self.capabilities.max_message_size()
            && self.payload_size > limit
        {
            return Err(Error::MessageTooLarge {
                size: self.payload_size,
                limit,
            });
        }

        let eight_bit_mime =
            self.message.has_eight_bit_parts() && self.capabilities.supports_8bit_messages();
        let size = self
            .capabilities
            .supports_size()
            .then_some(self.payload_size);

        self.send(&Command::MailFrom {
            from: self.from.clone(),
            eight_bit_mime,
            size,
        });
        self.transition(State::WaitingFromReply);
        Ok(())
    }

    /// Sends the next RCPT TO, or DATA once every recipient was accepted.
    fn send_next_recipient(&mut self) {
        if let Some(to) = self.recipients.pop_front() {
            self.send(&Command::RcptTo { to });
            self.transition(State::WaitingToReply);
        } else {
            self.send(&Command::Data);
            self.transition(State::WaitingEnterMail);
        }
    }

    fn password(&self) -> &str {
        self.message.password.as_deref().unwrap_or_default()
    }

    fn send(&mut self, command: &Command) {
        tracing::debug!(command = %command.redacted(), "C:");
        self.outbox.push(Action::Send(command.serialize()));
    }

    fn transition(&mut self, next: State) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "State transition");
            self.state = next;
        }
    }

    fn succeed(&mut self) {
        if self.is_finished() {
            return;
        }
        tracing::info!(
            from = %self.from,
            host = %self.message.relay_host,
            "Message delivered"
        );
        self.transition(State::MessageSent);
        self.tls_pending = false;
        self.outcome = Some(Ok(()));
        self.outbox.push(Action::Finish);
    }

    fn fail(&mut self, error: Error) {
        if self.is_finished() {
            return;
        }
        tracing::warn!(error = %error, state = ?self.state, "Delivery failed");
        self.transition(State::Failed);
        self.tls_pending = false;
        self.outcome = Some(Err(error));
        self.outbox.push(Action::Finish);
    }

    /// Maps a refusal during the mail transaction.
    fn rejection(&self, reply: &Reply) -> Error {
        let code = reply.code;
        if code == ReplyCode::AUTH_REQUIRED {
            Error::RelayRejected {
                code: code.as_u16(),
                message: reply.message_text(),
            }
        } else if code.is_permanent() {
            Error::MessageRejected {
                code: code.as_u16(),
                message: reply.message_text(),
            }
        } else {
            self.unexpected(reply)
        }
    }

    fn unexpected(&self, reply: &Reply) -> Error {
        Error::unexpected(
            reply.code.as_u16(),
            format!(
                "Unexpected reply in state {:?}: {}",
                self.state,
                reply.message_text()
            ),
        )
    }
}

fn invalid_credentials(reply: &Reply) -> Error {
    Error::InvalidCredentials {
        code: reply.code.as_u16(),
        message: reply.message_text(),
    }
}
