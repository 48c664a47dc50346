//! Client command lines.
//!
//! Each [`Command`] renders to exactly one CRLF-terminated line. The DATA
//! payload is not a command; see [`crate::data`].

use crate::types::{Address, AuthMechanism};
use std::fmt;

/// A command line sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO <identity>`.
    Ehlo {
        /// Client identity.
        hostname: String,
    },
    /// `HELO <identity>`, sent once when EHLO is refused.
    Helo {
        /// Client identity.
        hostname: String,
    },
    /// `STARTTLS`.
    StartTls,
    /// `AUTH <mechanism> [initial-response]`.
    Auth {
        /// Selected mechanism.
        mechanism: AuthMechanism,
        /// Base64 initial response (RFC 4954), used by PLAIN.
        initial_response: Option<String>,
    },
    /// Base64 answer to a 334 continuation.
    AuthResponse(String),
    /// `MAIL FROM:<addr> [BODY=8BITMIME] [SIZE=n]`.
    MailFrom {
        /// Reverse path.
        from: Address,
        /// Declare an 8bit body (RFC 6152).
        eight_bit_mime: bool,
        /// Declared payload size (RFC 1870).
        size: Option<usize>,
    },
    /// `RCPT TO:<addr>`.
    RcptTo {
        /// Forward path.
        to: Address,
    },
    /// `DATA`.
    Data,
    /// `QUIT`.
    Quit,
}

impl Command {
    /// Wire form, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }

    /// True when the line carries credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Self::AuthResponse(_)
                | Self::Auth {
                    initial_response: Some(_),
                    ..
                }
        )
    }

    /// The line as it may appear in logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::AuthResponse(_) => "<redacted>".to_string(),
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => format!("AUTH {mechanism} <redacted>"),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo { hostname } => write!(f, "EHLO {hostname}"),
            Self::Helo { hostname } => write!(f, "HELO {hostname}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                write!(f, "AUTH {mechanism}")?;
                match initial_response {
                    Some(response) => write!(f, " {response}"),
                    None => Ok(()),
                }
            }
            Self::AuthResponse(line) => f.write_str(line),
            Self::MailFrom {
                from,
                eight_bit_mime,
                size,
            } => {
                write!(f, "MAIL FROM:<{}>", from.as_str())?;
                if *eight_bit_mime {
                    f.write_str(" BODY=8BITMIME")?;
                }
                match size {
                    Some(size) => write!(f, " SIZE={size}"),
                    None => Ok(()),
                }
            }
            Self::RcptTo { to } => write!(f, "RCPT TO:<{}>", to.as_str()),
            Self::Data => f.write_str("DATA"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn greeting_commands() {
        let ehlo = Command::Ehlo {
            hostname: "client.example.com".into(),
        };
        let helo = Command::Helo {
            hostname: "client.example.com".into(),
        };
        assert_eq!(ehlo.serialize(), b"EHLO client.example.com\r\n");
        assert_eq!(helo.serialize(), b"HELO client.example.com\r\n");
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }

    #[test]
    fn plain_initial_response_is_redacted() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".into()),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
        assert!(cmd.is_sensitive());
        assert_eq!(cmd.redacted(), "AUTH PLAIN <redacted>");
    }

    #[test]
    fn challenge_mechanisms_start_bare() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::CramMd5,
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTH CRAM-MD5\r\n");
        assert!(!cmd.is_sensitive());
        assert_eq!(cmd.redacted(), "AUTH CRAM-MD5");

        let answer = Command::AuthResponse("dXNlcg==".into());
        assert_eq!(answer.serialize(), b"dXNlcg==\r\n");
        assert_eq!(answer.redacted(), "<redacted>");
        assert_eq!(Command::AuthResponse(String::new()).serialize(), b"\r\n");
    }

    #[test]
    fn mail_from_parameters() {
        let bare = Command::MailFrom {
            from: addr("sender@example.com"),
            eight_bit_mime: false,
            size: None,
        };
        assert_eq!(bare.serialize(), b"MAIL FROM:<sender@example.com>\r\n");

        let full = Command::MailFrom {
            from: addr("sender@example.com"),
            eight_bit_mime: true,
            size: Some(12345),
        };
        assert_eq!(
            full.serialize(),
            b"MAIL FROM:<sender@example.com> BODY=8BITMIME SIZE=12345\r\n"
        );
    }

    #[test]
    fn transaction_commands() {
        let rcpt = Command::RcptTo {
            to: addr("recipient@example.com"),
        };
        assert_eq!(rcpt.serialize(), b"RCPT TO:<recipient@example.com>\r\n");
        assert_eq!(rcpt.redacted(), "RCPT TO:<recipient@example.com>");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }
}
