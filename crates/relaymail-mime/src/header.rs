//! Header block handling.

use crate::encoding::encode_rfc2047;
use crate::error::{Error, Result};
use std::fmt;

/// Ordered collection of email headers.
///
/// Names keep the case they were added with; lookups are case-insensitive.
/// Rendering emits headers in insertion order, each terminated by CRLF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value contains a line break, which would
    /// let it inject further headers.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() || name.contains(['\r', '\n', ':', ' ']) || !is_folded_safely(&value) {
            return Err(Error::InvalidHeader(name));
        }
        self.headers.push((name, value));
        Ok(())
    }

    /// Adds a free-text header, encoding it per RFC 2047 when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name is invalid.
    pub fn add_text(&mut self, name: impl Into<String>, value: &str) -> Result<()> {
        self.add(name, encode_rfc2047(value, "utf-8"))
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// A value may only break lines as RFC 5322 folding: CRLF followed by WSP.
fn is_folded_safely(value: &str) -> bool {
    let mut segments = value.split("\r\n");
    let first_ok = segments
        .next()
        .is_some_and(|s| !s.contains(['\r', '\n']));
    first_ok
        && segments.all(|s| s.starts_with([' ', '\t']) && !s.contains(['\r', '\n']))
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain").unwrap();
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_headers_reject_line_breaks() {
        let mut headers = Headers::new();
        assert!(headers.add("Subject", "hi\r\nBcc: evil@example.com").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_accept_folded_values() {
        let mut headers = Headers::new();
        headers
            .add("Content-Disposition", "attachment;\r\n\tfilename=\"card.vcf\"")
            .unwrap();
        assert!(headers.add("X-Bad", "a\r\nb").is_err());
        assert!(headers.add("X-Bad", "a\nb").is_err());
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_add_text_encodes_non_ascii() {
        let mut headers = Headers::new();
        headers.add_text("Subject", "Grüße").unwrap();
        assert!(headers.get("subject").unwrap().starts_with("=?utf-8?B?"));
    }

    #[test]
    fn test_headers_display_keeps_order() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com").unwrap();
        headers.add("To", "recipient@example.com").unwrap();
        headers.add("Subject", "Test").unwrap();

        assert_eq!(
            headers.to_string(),
            "From: sender@example.com\r\nTo: recipient@example.com\r\nSubject: Test\r\n"
        );
        assert_eq!(headers.len(), 3);
    }
}
