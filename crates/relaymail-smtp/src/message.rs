//! Outgoing message: envelope, content parts, relay and security settings.

use crate::error::{Error, Result};
use crate::types::Address;
use relaymail_mime::{Message as MimeMessage, MessageBuilder, Part};
use std::time::Duration;

/// Ports tried when none are configured: SMTP, SMTPS, submission.
pub const DEFAULT_RELAY_PORTS: [u16; 3] = [25, 465, 587];

/// Default deadline for opening the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A message to deliver through one relay.
///
/// The session only reads this value; it is never mutated while sending.
#[derive(Debug, Clone)]
pub struct Message {
    /// Username for AUTH.
    pub login: String,
    /// Password for AUTH; required when `requires_auth` is set.
    pub password: Option<String>,
    /// Relay host name.
    pub relay_host: String,
    /// Candidate ports, tried in order when a connection attempt fails.
    pub relay_ports: Vec<u16>,
    /// Sender (`From` header and `MAIL FROM`).
    pub from_email: String,
    /// Comma-separated primary recipients.
    pub to_email: String,
    /// Comma-separated copy recipients.
    pub cc_email: Option<String>,
    /// Comma-separated blind copy recipients; never written to headers.
    pub bcc_email: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Body parts in MIME order.
    pub parts: Vec<Part>,
    /// Authenticate before the mail transaction.
    pub requires_auth: bool,
    /// Upgrade with STARTTLS, failing if the server cannot.
    pub wants_secure_transport: bool,
    /// Validate the server certificate chain during the TLS handshake.
    pub validate_certificate_chain: bool,
    /// Deadline for each connection attempt.
    pub connect_timeout: Duration,
}

/// Addresses extracted from a validated [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Reverse path for `MAIL FROM`.
    pub from: Address,
    /// Forward paths for `RCPT TO`: to, then cc, then bcc.
    pub recipients: Vec<Address>,
}

impl Message {
    /// Creates a message with default relay settings and no parts.
    #[must_use]
    pub fn new(
        relay_host: impl Into<String>,
        from_email: impl Into<String>,
        to_email: impl Into<String>,
    ) -> Self {
        Self {
            login: String::new(),
            password: None,
            relay_host: relay_host.into(),
            relay_ports: DEFAULT_RELAY_PORTS.to_vec(),
            from_email: from_email.into(),
            to_email: to_email.into(),
            cc_email: None,
            bcc_email: None,
            subject: String::new(),
            parts: Vec::new(),
            requires_auth: false,
            wants_secure_transport: false,
            validate_certificate_chain: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the cc recipients.
    #[must_use]
    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc_email = Some(cc.into());
        self
    }

    /// Sets the bcc recipients.
    #[must_use]
    pub fn bcc(mut self, bcc: impl Into<String>) -> Self {
        self.bcc_email = Some(bcc.into());
        self
    }

    /// Appends a body part.
    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Sets the candidate relay ports.
    #[must_use]
    pub fn ports(mut self, ports: impl Into<Vec<u16>>) -> Self {
        self.relay_ports = ports.into();
        self
    }

    /// Requires authentication with the given credentials.
    #[must_use]
    pub fn credentials(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = login.into();
        self.password = Some(password.into());
        self.requires_auth = true;
        self
    }

    /// Requires a STARTTLS upgrade.
    #[must_use]
    pub const fn secure(mut self, wants_secure_transport: bool) -> Self {
        self.wants_secure_transport = wants_secure_transport;
        self
    }

    /// Enables or disables certificate chain validation.
    #[must_use]
    pub const fn validate_certificate_chain(mut self, validate: bool) -> Self {
        self.validate_certificate_chain = validate;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns true if any part declares 8bit transfer encoding.
    #[must_use]
    pub fn has_eight_bit_parts(&self) -> bool {
        self.parts.iter().any(|p| p.transfer_encoding.is_eight_bit())
    }

    /// Checks the invariants required before any network activity.
    ///
    /// # Errors
    ///
    /// Returns an error if sender, recipients, relay host or ports are
    /// missing, an address is malformed, or auth is required without a
    /// password.
    pub fn validate(&self) -> Result<Envelope> {
        if self.from_email.trim().is_empty() {
            return Err(Error::InvalidEnvelope("Sender is empty".into()));
        }
        if self.to_email.trim().is_empty() {
            return Err(Error::InvalidEnvelope("Recipient is empty".into()));
        }
        if self.relay_host.trim().is_empty() {
            return Err(Error::InvalidEnvelope("Relay host is empty".into()));
        }
        if self.relay_ports.is_empty() {
            return Err(Error::InvalidEnvelope("No relay ports".into()));
        }
        if self.requires_auth && (self.login.is_empty() || self.password.is_none()) {
            return Err(Error::InvalidEnvelope(
                "Authentication requires login and password".into(),
            ));
        }

        let from = Address::from_mailbox(&self.from_email)?;

        let mut recipients = Address::parse_list(&self.to_email)?;
        if recipients.is_empty() {
            return Err(Error::InvalidEnvelope("Recipient is empty".into()));
        }
        for field in [&self.cc_email, &self.bcc_email].into_iter().flatten() {
            recipients.extend(Address::parse_list(field)?);
        }

        Ok(Envelope { from, recipients })
    }

    /// Composes the MIME message (headers and body).
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be composed.
    pub fn compose(&self) -> Result<MimeMessage> {
        self.mime_builder().build().map_err(Into::into)
    }

    /// Returns a MIME builder preloaded with this message's headers and parts.
    ///
    /// Useful to pin the boundary, date or Message-ID.
    #[must_use]
    pub fn mime_builder(&self) -> MessageBuilder {
        let mut builder = MimeMessage::builder()
            .from(self.from_email.as_str())
            .to(self.to_email.as_str())
            .subject(self.subject.as_str())
            .parts(self.parts.iter().cloned());
        if let Some(cc) = &self.cc_email {
            builder = builder.cc(cc.as_str());
        }
        builder
    }
}
