//! `Content-Type` values (RFC 2045 §5).

use crate::error::{Error, Result};
use std::fmt;

/// RFC 2045 `tspecials`; parameter values containing one are quoted.
const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

/// A media type with its parameters.
///
/// Parameters render in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    essence: String,
    params: Vec<(String, String)>,
}

impl ContentType {
    /// `text/plain; charset=utf-8`, the type of every text part.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::bare("text/plain").with_parameter("charset", "utf-8")
    }

    /// `multipart/mixed` delimited by `boundary`.
    #[must_use]
    pub fn multipart_mixed(boundary: impl Into<String>) -> Self {
        Self::bare("multipart/mixed").with_parameter("boundary", boundary)
    }

    fn bare(essence: &str) -> Self {
        Self {
            essence: essence.to_string(),
            params: Vec::new(),
        }
    }

    /// Sets a parameter. Names are case-insensitive; setting one twice
    /// keeps its position and replaces the value.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Lowercased `type/subtype`.
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.essence
    }

    /// Value of a parameter, unquoted.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `boundary` parameter.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// True for any `multipart/*` type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.essence.starts_with("multipart/")
    }

    /// Parses `type/subtype *(; name=value)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContentType`] if the type or subtype is
    /// missing.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidContentType(value.to_string());
        let mut segments = value.split(';');

        let essence = segments.next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.split_once('/') {
            Some((main, sub)) if !main.is_empty() && !sub.is_empty() && !sub.contains('/') => {}
            _ => return Err(invalid()),
        }

        let mut content_type = Self {
            essence,
            params: Vec::new(),
        };
        for (name, raw) in segments.filter_map(|p| p.split_once('=')) {
            content_type = content_type.with_parameter(name.trim(), raw.trim().trim_matches('"'));
        }
        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.essence)?;
        for (name, value) in &self.params {
            let quote = value.is_empty()
                || value.contains(|c: char| c.is_ascii_whitespace() || TSPECIALS.contains(c));
            if quote {
                write!(f, "; {name}=\"{value}\"")?;
            } else {
                write!(f, "; {name}={value}")?;
            }
        }
        Ok(())
    }
}
