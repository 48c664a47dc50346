//! Server capabilities advertised in the EHLO response.

use super::{AuthMechanism, Extension, Reply};
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl Capabilities {
    /// Builds the capability set from an EHLO reply.
    ///
    /// The first line is the server greeting and carries no keyword.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        let extensions = reply
            .lines
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Self { extensions }
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if 8BITMIME is supported.
    #[must_use]
    pub fn supports_8bit_messages(&self) -> bool {
        self.supports(&Extension::EightBitMime)
    }

    /// Checks if the SIZE extension is advertised, with or without a limit.
    #[must_use]
    pub fn supports_size(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns the maximum message size, if advertised and non-zero.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(Some(size)) if *size > 0 => Some(*size),
            _ => None,
        })
    }

    /// Checks if an authentication mechanism is advertised.
    ///
    /// Servers may split mechanisms over several AUTH lines.
    #[must_use]
    pub fn supports_auth(&self, mechanism: AuthMechanism) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(m) if m.contains(&mechanism)))
    }

    /// Returns the strongest mechanism supported by both sides.
    #[must_use]
    pub fn preferred_auth(&self) -> Option<AuthMechanism> {
        AuthMechanism::PREFERENCE
            .into_iter()
            .find(|m| self.supports_auth(*m))
    }
}
