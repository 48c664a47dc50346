//! Client-side settings shared by every delivery.

use std::time::Duration;

/// Configuration for a [`Mailer`](crate::Mailer).
///
/// Per-message settings (relay, ports, credentials, connect timeout) live on
/// [`Message`](crate::Message); this holds what stays the same across sends.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Name announced in EHLO/HELO.
    pub local_identity: String,
    /// Maximum silence from the server once connected.
    pub watchdog_timeout: Duration,
    /// Longest reply line accepted before the session gives up.
    pub max_line_length: usize,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            local_identity: "localhost".to_string(),
            watchdog_timeout: Duration::from_secs(60),
            max_line_length: 1024 * 1024,
        }
    }
}

impl MailerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the EHLO identity.
    #[must_use]
    pub fn local_identity(mut self, identity: impl Into<String>) -> Self {
        self.local_identity = identity.into();
        self
    }

    /// Sets the watchdog timeout.
    #[must_use]
    pub const fn watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Sets the maximum reply line length.
    #[must_use]
    pub const fn max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }
}
