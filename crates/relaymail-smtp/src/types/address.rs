//! Envelope addresses.

use crate::error::{Error, Result};
use std::fmt;

/// A bare `local@domain` address as it appears inside `<...>` in
/// `MAIL FROM` and `RCPT TO`.
///
/// Construction rejects anything that could break out of the angle
/// brackets or the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates a bare address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] unless the value has exactly one
    /// `@` with non-empty text on both sides and no whitespace, control
    /// characters or angle brackets.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let forbidden = |c: char| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>');

        let problem = if addr.contains(forbidden) {
            Some("forbidden character")
        } else {
            match addr.split_once('@') {
                None => Some("missing @"),
                Some((_, domain)) if domain.contains('@') => Some("more than one @"),
                Some((local, domain)) if local.is_empty() || domain.is_empty() => {
                    Some("empty local part or domain")
                }
                Some(_) => None,
            }
        };

        match problem {
            Some(reason) => Err(Error::InvalidAddress(format!("{reason}: {addr:?}"))),
            None => Ok(Self(addr)),
        }
    }

    /// Takes the address out of a header mailbox such as
    /// `Jane Doe <jane@example.com>`; a bare address passes through.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for unbalanced brackets or an
    /// invalid address.
    pub fn from_mailbox(mailbox: &str) -> Result<Self> {
        let mailbox = mailbox.trim();
        let addr = match (mailbox.rfind('<'), mailbox.rfind('>')) {
            (None, None) => mailbox,
            (Some(open), Some(close)) if open < close => &mailbox[open + 1..close],
            _ => {
                return Err(Error::InvalidAddress(format!(
                    "unbalanced brackets: {mailbox:?}"
                )));
            }
        };
        Self::new(addr.trim())
    }

    /// Parses a comma-separated header field into addresses, in order.
    ///
    /// Commas inside quoted display names do not split. Blank entries are
    /// skipped, so a blank field gives an empty list.
    ///
    /// # Errors
    ///
    /// Returns the first invalid entry.
    pub fn parse_list(field: &str) -> Result<Vec<Self>> {
        let mut addresses = Vec::new();
        let mut quoted = false;
        let mut start = 0;

        for (i, c) in field.char_indices().chain([(field.len(), ',')]) {
            match c {
                '"' => quoted = !quoted,
                ',' if !quoted || i == field.len() => {
                    let entry = &field[start..i];
                    if !entry.trim().is_empty() {
                        addresses.push(Self::from_mailbox(entry)?);
                    }
                    start = i + 1;
                }
                _ => {}
            }
        }
        Ok(addresses)
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn list(field: &str) -> Vec<String> {
        Address::parse_list(field)
            .unwrap()
            .into_iter()
            .map(|a| a.to_string())
            .collect()
    }

    #[test]
    fn accepts_plain_address() {
        assert_eq!(Address::new("user@example.com").unwrap().as_str(), "user@example.com");
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "",
            "userexample.com",
            "@example.com",
            "user@",
            "a@b@c",
            "a b@c.com",
            "a@b.com>\r\nRCPT TO:<c@d.com",
        ] {
            assert!(
                matches!(Address::new(bad), Err(Error::InvalidAddress(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn mailbox_forms() {
        let named = Address::from_mailbox(" John Doe <john@example.com> ").unwrap();
        assert_eq!(named.as_str(), "john@example.com");
        assert_eq!(Address::from_mailbox("j@x.com").unwrap().as_str(), "j@x.com");
        assert!(Address::from_mailbox("John <john@example.com").is_err());
        assert!(Address::from_mailbox("John john@example.com>").is_err());
    }

    #[test]
    fn list_respects_quotes_and_skips_blanks() {
        assert_eq!(
            list("a@x.com, \"Doe, Jane\" <jane@y.com>,, b@z.com "),
            vec!["a@x.com", "jane@y.com", "b@z.com"]
        );
        assert!(list("").is_empty());
        assert!(list(" , ").is_empty());
    }

    #[test]
    fn list_reports_bad_entry() {
        assert!(Address::parse_list("a@x.com, nonsense").is_err());
    }
}
