//! # relaymail-mime
//!
//! Composition of outgoing email messages.
//!
//! ## Features
//!
//! - **Header block**: ordered RFC 5322 headers with RFC 2047 subject encoding
//! - **Parts**: text and attachment parts with 7bit, 8bit or base64 transfer encoding
//! - **Multipart**: `multipart/mixed` bodies with generated boundaries
//! - **Transcoder**: Base64 encoding, decoding and line wrapping
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaymail_mime::{Message, Part};
//!
//! let message = Message::builder()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Report")
//!     .part(Part::text("Please find the report attached."))
//!     .part(Part::attachment("report.pdf", "application/pdf", pdf_bytes))
//!     .build()?;
//!
//! let wire = message.to_bytes();
//! ```
//!
//! The serializer only produces the message itself. SMTP dot-stuffing and
//! the end-of-data marker are applied by the transport.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, MessageBuilder, Part, TransferEncoding};
