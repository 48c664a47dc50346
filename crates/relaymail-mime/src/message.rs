//! Message parts and the serializer producing the RFC 5322 byte stream.

use crate::content_type::ContentType;
use crate::encoding::{BASE64_LINE_LENGTH, encode_base64_wrapped, normalize_line_endings};
use crate::error::{Error, Result};
use crate::header::Headers;
use chrono::{DateTime, FixedOffset, Local};
use std::fmt;

/// Preamble placed before the first boundary of a multipart body.
const MULTIPART_PREAMBLE: &str = "This is a multi-part message in MIME format.";

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    ///
    /// Unrecognised values fall back to 7bit, the RFC 2045 default.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            _ => Self::SevenBit,
        }
    }

    /// Returns true if the encoded body may carry 8-bit octets.
    #[must_use]
    pub const fn is_eight_bit(self) -> bool {
        matches!(self, Self::EightBit)
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
        }
    }
}

/// One body part of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Part {
    /// Value of the `Content-Type` header.
    pub content_type: String,
    /// Value of the `Content-Disposition` header, if any.
    pub content_disposition: Option<String>,
    /// How `content` is encoded on the wire.
    pub transfer_encoding: TransferEncoding,
    /// Raw, unencoded content.
    pub content: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub fn new(
        content_type: impl Into<String>,
        transfer_encoding: TransferEncoding,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            content_disposition: None,
            transfer_encoding,
            content: content.into(),
        }
    }

    /// Creates a `text/plain; charset=utf-8` part.
    ///
    /// ASCII text is sent as 7bit, anything else as 8bit.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        let body = body.into();
        let encoding = if body.is_ascii() {
            TransferEncoding::SevenBit
        } else {
            TransferEncoding::EightBit
        };
        Self::new(ContentType::text_plain().to_string(), encoding, body)
    }

    /// Creates a base64-encoded attachment part.
    #[must_use]
    pub fn attachment(
        filename: &str,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let filename = filename.replace(['"', '\\', '\r', '\n'], "_");
        Self::new(content_type, TransferEncoding::Base64, data)
            .with_disposition(format!("attachment; filename=\"{filename}\""))
    }

    /// Sets the content disposition.
    #[must_use]
    pub fn with_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.content_disposition = Some(disposition.into());
        self
    }

    /// Builds the per-part MIME headers.
    fn headers(&self) -> Result<Headers> {
        ContentType::parse(&self.content_type)?;

        let mut headers = Headers::new();
        headers.add("Content-Type", self.content_type.as_str())?;
        headers.add("Content-Transfer-Encoding", self.transfer_encoding.to_string())?;
        if let Some(disposition) = &self.content_disposition {
            headers.add("Content-Disposition", disposition.as_str())?;
        }
        Ok(headers)
    }

    /// Encodes the content per the declared transfer encoding.
    ///
    /// The result always ends with CRLF.
    #[must_use]
    pub fn encoded_body(&self) -> Vec<u8> {
        let mut body = match self.transfer_encoding {
            TransferEncoding::Base64 => {
                encode_base64_wrapped(&self.content, BASE64_LINE_LENGTH).into_bytes()
            }
            TransferEncoding::SevenBit | TransferEncoding::EightBit => {
                normalize_line_endings(&self.content)
            }
        };
        if !body.ends_with(b"\r\n") {
            body.extend_from_slice(b"\r\n");
        }
        body
    }
}

/// A fully composed message: header block plus encoded body.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Encoded body (everything after the blank line).
    pub body: Vec<u8>,
}

impl Message {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// Gets the Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("subject")
    }

    /// Serializes the message. Every line is CRLF-terminated.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let headers = self.headers.to_string();
        let mut out = Vec::with_capacity(headers.len() + 2 + self.body.len());
        out.extend_from_slice(headers.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Builder for outgoing messages.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: String,
    to: String,
    cc: Option<String>,
    subject: String,
    parts: Vec<Part>,
    boundary: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    message_id: Option<String>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `From` header.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Sets the `To` header.
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    /// Sets the `Cc` header. Empty values are omitted.
    #[must_use]
    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        let cc = cc.into();
        self.cc = (!cc.trim().is_empty()).then_some(cc);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Appends a body part.
    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Appends several body parts in order.
    #[must_use]
    pub fn parts(mut self, parts: impl IntoIterator<Item = Part>) -> Self {
        self.parts.extend(parts);
        self
    }

    /// Fixes the multipart boundary instead of generating one.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Fixes the `Date` header instead of using the current time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Fixes the `Message-ID` header (without angle brackets).
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Composes the message.
    ///
    /// # Errors
    ///
    /// Returns an error if `From` or `To` is empty, a part has an invalid
    /// content type, or a header value contains a bare line break.
    pub fn build(self) -> Result<Message> {
        if self.from.trim().is_empty() {
            return Err(Error::MissingHeader("From".into()));
        }
        if self.to.trim().is_empty() {
            return Err(Error::MissingHeader("To".into()));
        }

        let mut headers = Headers::new();
        headers.add("From", self.from.as_str())?;
        headers.add("To", self.to.as_str())?;
        if let Some(cc) = &self.cc {
            headers.add("Cc", cc.as_str())?;
        }
        headers.add_text("Subject", &self.subject)?;

        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset());
        headers.add("Date", date.to_rfc2822())?;

        let message_id = self
            .message_id
            .unwrap_or_else(|| generate_message_id(&self.from));
        headers.add("Message-ID", format!("<{message_id}>"))?;
        headers.add("MIME-Version", "1.0")?;

        let body = match self.parts.as_slice() {
            [] => {
                headers.add("Content-Type", ContentType::text_plain().to_string())?;
                headers.add("Content-Transfer-Encoding", "7bit")?;
                b"\r\n".to_vec()
            }
            [part] => {
                for (name, value) in part.headers()?.iter() {
                    headers.add(name, value)?;
                }
                part.encoded_body()
            }
            parts => {
                let boundary = self.boundary.unwrap_or_else(generate_boundary);
                headers.add(
                    "Content-Type",
                    ContentType::multipart_mixed(boundary.as_str()).to_string(),
                )?;
                render_multipart(parts, &boundary)?
            }
        };

        Ok(Message { headers, body })
    }
}

fn render_multipart(parts: &[Part], boundary: &str) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.extend_from_slice(MULTIPART_PREAMBLE.as_bytes());
    body.extend_from_slice(b"\r\n");

    for part in parts {
        body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        body.extend_from_slice(part.headers()?.to_string().as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.encoded_body());
    }

    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}

/// Generates a boundary that cannot collide with base64 output.
fn generate_boundary() -> String {
    format!("----=_Part_{}", uuid::Uuid::new_v4().simple())
}

fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, d)| d.trim_end_matches(|c: char| c == '>' || c.is_whitespace()))
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    format!("{}@{domain}", uuid::Uuid::new_v4().simple())
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
    use crate::encoding::decode_base64;

    fn fixed_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc2822("Tue, 1 Jul 2025 10:00:00 +0000").unwrap()
    }

    fn base() -> MessageBuilder {
        Message::builder()
            .from("a@x.com")
            .to("b@y.com")
            .subject("Hello")
            .date(fixed_date())
            .message_id("id-1@x.com")
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" 8BIT "), TransferEncoding::EightBit);
        assert_eq!(TransferEncoding::parse("base64"), TransferEncoding::Base64);
        assert_eq!(TransferEncoding::parse("x-unknown"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_text_part_picks_encoding() {
        assert_eq!(Part::text("hi").transfer_encoding, TransferEncoding::SevenBit);
        assert_eq!(Part::text("héllo").transfer_encoding, TransferEncoding::EightBit);
    }

    #[test]
    fn test_single_part_message() {
        let message = base().part(Part::text("hi")).build().unwrap();
        let text = String::from_utf8(message.to_bytes()).unwrap();

        assert_eq!(
            text,
            concat!(
                "From: a@x.com\r\n",
                "To: b@y.com\r\n",
                "Subject: Hello\r\n",
                "Date: Tue, 1 Jul 2025 10:00:00 +0000\r\n",
                "Message-ID: <id-1@x.com>\r\n",
                "MIME-Version: 1.0\r\n",
                "Content-Type: text/plain; charset=utf-8\r\n",
                "Content-Transfer-Encoding: 7bit\r\n",
                "\r\n",
                "hi\r\n",
            )
        );
    }

    #[test]
    fn test_cc_header_only_when_present() {
        let without = base().cc("").part(Part::text("x")).build().unwrap();
        assert!(without.headers.get("cc").is_none());

        let with = base().cc("c@z.com").part(Part::text("x")).build().unwrap();
        assert_eq!(with.headers.get("Cc"), Some("c@z.com"));
    }

    #[test]
    fn test_multipart_message() {
        let message = base()
            .boundary("XYZ")
            .part(Part::text("see attached"))
            .part(Part::attachment("a.bin", "application/octet-stream", vec![0u8, 1, 2, 255]))
            .build()
            .unwrap();

        let text = String::from_utf8(message.to_bytes()).unwrap();
        assert!(text.contains("Content-Type: multipart/mixed; boundary=XYZ\r\n"));
        assert!(text.contains("\r\n--XYZ\r\nContent-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains(
            "Content-Transfer-Encoding: base64\r\nContent-Disposition: attachment; filename=\"a.bin\"\r\n\r\nAAEC/w==\r\n"
        ));
        assert!(text.ends_with("\r\n--XYZ--\r\n"));

        let first = text.find("see attached").unwrap();
        let second = text.find("AAEC/w==").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_generated_boundary_is_quoted() {
        let message = base()
            .part(Part::text("one"))
            .part(Part::text("two"))
            .build()
            .unwrap();
        let content_type = ContentType::parse(message.headers.get("content-type").unwrap()).unwrap();
        let boundary = content_type.boundary().unwrap();
        assert!(boundary.starts_with("----=_Part_"));
        assert!(
            message
                .headers
                .get("content-type")
                .unwrap()
                .contains(&format!("\"{boundary}\""))
        );
    }

    #[test]
    fn test_base64_part_round_trips() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let part = Part::attachment("blob", "application/octet-stream", data.clone());
        let body = String::from_utf8(part.encoded_body()).unwrap();

        assert!(body.lines().all(|l| l.len() <= BASE64_LINE_LENGTH));
        assert_eq!(decode_base64(&body).unwrap(), data);
    }

    #[test]
    fn test_text_body_lines_are_crlf() {
        let part = Part::text("one\ntwo\r\nthree");
        assert_eq!(part.encoded_body(), b"one\r\ntwo\r\nthree\r\n");
    }

    #[test]
    fn test_missing_from_or_to() {
        assert!(matches!(
            Message::builder().to("b@y.com").build(),
            Err(Error::MissingHeader(_))
        ));
        assert!(matches!(
            Message::builder().from("a@x.com").build(),
            Err(Error::MissingHeader(_))
        ));
    }

    #[test]
    fn test_invalid_part_content_type() {
        let result = base().part(Part::new("garbage", TransferEncoding::SevenBit, "x")).build();
        assert!(matches!(result, Err(Error::InvalidContentType(_))));
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let message = base().subject("Grüße").part(Part::text("x")).build().unwrap();
        assert_eq!(message.subject(), Some("=?utf-8?B?R3LDvMOfZQ==?="));
    }

    #[test]
    fn test_generated_message_id_uses_sender_domain() {
        let message = Message::builder()
            .from("Alice <alice@example.org>")
            .to("b@y.com")
            .build()
            .unwrap();
        let id = message.headers.get("message-id").unwrap();
        assert!(id.ends_with("@example.org>"));
    }

    #[test]
    fn test_attachment_filename_is_sanitized() {
        let part = Part::attachment("evil\"\r\nname", "text/plain", "x");
        assert_eq!(
            part.content_disposition.as_deref(),
            Some("attachment; filename=\"evil___name\"")
        );
    }
}
