//! Error types for SMTP delivery.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a delivery attempt failed.
///
/// Every variant is terminal for the attempt; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No connection could be opened before the connect deadline.
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// The stream could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] io::Error),

    /// The watchdog fired or the stream closed mid-dialogue.
    #[error("Connection interrupted: {0}")]
    ConnectionInterrupted(String),

    /// Secure transport was required but the server cannot provide it.
    #[error("TLS unavailable")]
    TlsUnavailable {
        /// Reply code if the server refused STARTTLS.
        code: Option<u16>,
    },

    /// The TLS handshake or certificate validation failed.
    #[error("TLS negotiation failed: {0}")]
    TlsFailed(String),

    /// Authentication is required but no mechanism is supported by both sides.
    #[error("No supported authentication mechanism")]
    UnsupportedAuthMechanism,

    /// The server rejected the credentials.
    #[error("Invalid credentials ({code}): {message}")]
    InvalidCredentials {
        /// Reply code (usually 535).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// The server refused to relay (530).
    #[error("Relay rejected ({code}): {message}")]
    RelayRejected {
        /// Reply code.
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// The server rejected the envelope or the message data (5xx).
    #[error("Message rejected ({code}): {message}")]
    MessageRejected {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Message exceeds the size advertised by the server.
    #[error("Message exceeds size limit: {size} > {limit} bytes")]
    MessageTooLarge {
        /// Serialized message size.
        size: usize,
        /// Limit advertised via SIZE.
        limit: usize,
    },

    /// The relay host name does not resolve.
    #[error("Non-existent domain: {0}")]
    NonExistentDomain(String),

    /// Unexpected or malformed reply for the current state.
    #[error("Protocol violation: {message}")]
    ProtocolViolation {
        /// Reply code, when the reply could be parsed.
        code: Option<u16>,
        /// Description of what was expected.
        message: String,
    },

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message fails the checks made before any connection.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The message could not be composed.
    #[error("Message composition failed: {0}")]
    Mime(#[from] relaymail_mime::Error),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::ConnectionTimeout`].
    ConnectionTimeout,
    /// See [`Error::ConnectionFailed`].
    ConnectionFailed,
    /// See [`Error::ConnectionInterrupted`].
    ConnectionInterrupted,
    /// See [`Error::TlsUnavailable`].
    TlsUnavailable,
    /// See [`Error::TlsFailed`].
    TlsFailed,
    /// See [`Error::UnsupportedAuthMechanism`].
    UnsupportedAuthMechanism,
    /// See [`Error::InvalidCredentials`].
    InvalidCredentials,
    /// See [`Error::RelayRejected`].
    RelayRejected,
    /// See [`Error::MessageRejected`] and [`Error::MessageTooLarge`].
    MessageRejected,
    /// See [`Error::NonExistentDomain`].
    NonExistentDomain,
    /// See [`Error::ProtocolViolation`].
    ProtocolViolation,
    /// Address, envelope or composition problems caught before sending.
    InvalidEnvelope,
}

impl Error {
    /// Creates a protocol violation carrying the offending reply code.
    #[must_use]
    pub fn unexpected(code: u16, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionTimeout => ErrorKind::ConnectionTimeout,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::ConnectionInterrupted(_) => ErrorKind::ConnectionInterrupted,
            Self::TlsUnavailable { .. } => ErrorKind::TlsUnavailable,
            Self::TlsFailed(_) => ErrorKind::TlsFailed,
            Self::UnsupportedAuthMechanism => ErrorKind::UnsupportedAuthMechanism,
            Self::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
            Self::RelayRejected { .. } => ErrorKind::RelayRejected,
            Self::MessageRejected { .. } | Self::MessageTooLarge { .. } => {
                ErrorKind::MessageRejected
            }
            Self::NonExistentDomain(_) => ErrorKind::NonExistentDomain,
            Self::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
            Self::InvalidAddress(_) | Self::InvalidEnvelope(_) | Self::Mime(_) => {
                ErrorKind::InvalidEnvelope
            }
        }
    }

    /// Returns the SMTP reply code behind this error, if any.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::InvalidCredentials { code, .. }
            | Self::RelayRejected { code, .. }
            | Self::MessageRejected { code, .. } => Some(*code),
            Self::TlsUnavailable { code } | Self::ProtocolViolation { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns true if the server answered with a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.code(), Some(code) if code >= 500 && code < 600)
    }

    /// Returns true if the server answered with a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.code(), Some(code) if code >= 400 && code < 500)
    }
}
