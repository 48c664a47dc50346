//! DATA payload framing.

/// Prepares a serialized message for transmission after `354`.
///
/// Lines are normalized to CRLF, every line starting with `.` gets an
/// extra leading dot, and the end-of-data marker is appended, so the
/// payload always ends in `\r\n.\r\n`.
#[must_use]
pub fn frame(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);

    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    if !message.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lone_dot_is_doubled() {
        assert_eq!(frame(b"a\r\n.\r\nb\r\n"), b"a\r\n..\r\nb\r\n.\r\n");
    }

    #[test]
    fn leading_dot_is_doubled() {
        assert_eq!(frame(b".hidden\r\n"), b"..hidden\r\n.\r\n");
    }

    #[test]
    fn inner_dots_untouched() {
        assert_eq!(frame(b"a.b.\r\n"), b"a.b.\r\n.\r\n");
    }

    #[test]
    fn missing_final_newline_is_added() {
        assert_eq!(frame(b"hi"), b"hi\r\n.\r\n");
    }

    #[test]
    fn bare_newlines_become_crlf() {
        assert_eq!(frame(b"one\ntwo\n"), b"one\r\ntwo\r\n.\r\n");
    }

    #[test]
    fn empty_message() {
        assert_eq!(frame(b""), b".\r\n");
    }

    #[test]
    fn blank_line_preserved() {
        assert_eq!(frame(b"h: v\r\n\r\nbody\r\n"), b"h: v\r\n\r\nbody\r\n.\r\n");
    }

    proptest! {
        #[test]
        fn terminator_only_at_end(lines in proptest::collection::vec("[ -~]{0,20}", 0..20)) {
            let message = lines.join("\r\n");
            let framed = frame(message.as_bytes());
            let framed_text = String::from_utf8(framed).unwrap();

            prop_assert!(framed_text.ends_with(".\r\n"));
            let body = &framed_text[..framed_text.len() - 3];
            // No line inside the body is a lone dot.
            prop_assert!(body.split("\r\n").all(|l| l != "."));
        }

        #[test]
        fn unstuffing_recovers_lines(lines in proptest::collection::vec("[.a-z]{0,8}", 1..20)) {
            let message = format!("{}\r\n", lines.join("\r\n"));
            let framed = String::from_utf8(frame(message.as_bytes())).unwrap();
            let body = framed.strip_suffix(".\r\n").unwrap();

            let recovered: Vec<&str> = body
                .strip_suffix("\r\n")
                .unwrap()
                .split("\r\n")
                .map(|l| l.strip_prefix('.').unwrap_or(l))
                .collect();
            prop_assert_eq!(recovered, lines.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
