//! Server replies and their numeric codes.

use std::fmt;

/// One complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit reply code shared by every line.
    pub code: ReplyCode,
    /// Text of each line, without the code and separator.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Text of the first line. For a 334 reply this is the SASL challenge.
    #[must_use]
    pub fn first_line(&self) -> &str {
        self.lines.first().map_or("", String::as_str)
    }

    /// All lines joined with `\n`, for error messages.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.lines.join("\n")
    }

    /// Enhanced status code (RFC 3463) leading the first line, e.g. `5.1.1`.
    #[must_use]
    pub fn enhanced_status(&self) -> Option<&str> {
        let token = self.first_line().split_ascii_whitespace().next()?;
        let mut fields = token.split('.');
        let class = fields.next()?;
        let valid = matches!(class, "2" | "4" | "5")
            && fields.clone().count() == 2
            && fields.all(|f| (1..=3).contains(&f.len()) && f.bytes().all(|b| b.is_ascii_digit()));
        valid.then_some(token)
    }
}

/// First digit of a reply code (RFC 5321 §4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    /// 2xx: the command was accepted.
    Completion,
    /// 3xx: more input is expected (SASL challenge, DATA body).
    Intermediate,
    /// 4xx: refused for now.
    Transient,
    /// 5xx: refused for good.
    Permanent,
    /// Anything outside 200..=599.
    Unknown,
}

/// Three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 service ready; also the go-ahead for STARTTLS.
    pub const SERVICE_READY: Self = Self(220);
    /// 235 authentication succeeded.
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// 250 requested action completed.
    pub const OK: Self = Self(250);
    /// 251 user not local, will forward.
    pub const FORWARD: Self = Self(251);
    /// 334 SASL continuation.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 start mail input.
    pub const START_DATA: Self = Self(354);
    /// 530 authentication required; relaying denied.
    pub const AUTH_REQUIRED: Self = Self(530);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Reply class from the first digit.
    #[must_use]
    pub const fn class(self) -> Class {
        match self.0 / 100 {
            2 => Class::Completion,
            3 => Class::Intermediate,
            4 => Class::Transient,
            5 => Class::Permanent,
            _ => Class::Unknown,
        }
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.class(), Class::Completion)
    }

    /// 4xx.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self.class(), Class::Transient)
    }

    /// 5xx.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self.class(), Class::Permanent)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}
