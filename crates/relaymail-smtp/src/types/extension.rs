//! EHLO keywords and SASL mechanisms.

use std::fmt;

/// One capability line of an EHLO reply.
///
/// Only the keywords the session acts on get their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `STARTTLS` (RFC 3207).
    StartTls,
    /// `AUTH` with the mechanisms this client implements; unknown ones are
    /// dropped.
    Auth(Vec<AuthMechanism>),
    /// `SIZE` (RFC 1870) with its optional limit in bytes.
    Size(Option<usize>),
    /// `8BITMIME` (RFC 6152).
    EightBitMime,
    /// Any other keyword, stored uppercased.
    Other(String),
}

impl Extension {
    /// Parses one capability line.
    ///
    /// Keywords are case-insensitive. The pre-standard `AUTH=LOGIN PLAIN`
    /// spelling is accepted as well.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (keyword, params) = line
            .split_once(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or((line, ""));
        let mut params = params.split_ascii_whitespace();

        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(params.filter_map(AuthMechanism::parse).collect()),
            "SIZE" => Self::Size(params.next().and_then(|n| n.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            other => Self::Other(other.to_string()),
        }
    }
}

/// SASL mechanism supported by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// Keyed MD5 over the server challenge (RFC 2195).
    CramMd5,
    /// HTTP-style digest with nonces (RFC 2831).
    DigestMd5,
    /// Single base64 message `\0login\0password` (RFC 4616).
    Plain,
    /// Username and password in two round trips.
    Login,
}

impl AuthMechanism {
    /// Every mechanism, strongest first. Selection walks this list.
    pub const PREFERENCE: [Self; 4] = [Self::CramMd5, Self::DigestMd5, Self::Plain, Self::Login];

    /// Looks a mechanism up by its registered name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// Registered SASL name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CramMd5 => "CRAM-MD5",
            Self::DigestMd5 => "DIGEST-MD5",
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
