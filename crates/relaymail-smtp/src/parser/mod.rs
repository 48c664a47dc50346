//! SMTP response parser.
//!
//! Inbound bytes arrive in arbitrary chunks. [`ReplyBuffer`] accumulates
//! them, splits complete lines and groups continuation lines into replies.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};
use bytes::BytesMut;

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(protocol("Empty reply"));
    };

    let code = parse_code(first)?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        if parse_code(line)? != code {
            return Err(Error::unexpected(
                code,
                format!("Reply code changed inside multi-line reply: {line}"),
            ));
        }
        text.push(line.get(4..).unwrap_or_default().to_string());
    }

    Ok(Reply::new(ReplyCode::new(code), text))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the
/// last line. A bare three-digit code is also final.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() == 3 || (bytes.len() >= 4 && bytes[3] == b' ')
}

fn parse_code(line: &str) -> Result<u16> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(protocol(format!("Invalid reply line: {line}")));
    }
    if bytes.len() > 3 && bytes[3] != b' ' && bytes[3] != b'-' {
        return Err(protocol(format!("Invalid reply separator: {line}")));
    }
    line[..3]
        .parse()
        .map_err(|_| protocol(format!("Invalid reply code: {line}")))
}

fn protocol(message: impl Into<String>) -> Error {
    Error::ProtocolViolation {
        code: None,
        message: message.into(),
    }
}

/// Most continuation lines accepted in one reply. Real EHLO replies carry a
/// few dozen at most.
const MAX_REPLY_LINES: usize = 512;

/// Line buffer turning a byte stream into complete replies.
#[derive(Debug)]
pub struct ReplyBuffer {
    buffer: BytesMut,
    lines: Vec<String>,
    max_line_length: usize,
}

impl ReplyBuffer {
    /// Creates a buffer rejecting lines longer than `max_line_length`.
    #[must_use]
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            lines: Vec::new(),
            max_line_length,
        }
    }

    /// Appends raw bytes read from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete reply, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed or overlong lines, or when a reply
    /// runs past 512 lines.
    pub fn next_reply(&mut self) -> Result<Option<Reply>> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(line);
            self.lines.push(line.to_string());
            if is_last {
                let lines = std::mem::take(&mut self.lines);
                return parse_reply(&lines).map(Some);
            }
            if self.lines.len() >= MAX_REPLY_LINES {
                self.lines.clear();
                return Err(protocol("Too many lines in multi-line reply"));
            }
        }

        if self.buffer.len() > self.max_line_length {
            return Err(protocol("Reply line too long"));
        }
        Ok(None)
    }

    /// Drops any buffered input.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.lines.clear();
    }
}
