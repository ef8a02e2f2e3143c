use anyhow::Result;
use std::collections::VecDeque;

/// Byte buffer that hands out complete `\n`-terminated lines.
///
/// Splitting happens on raw bytes, so a multibyte character cut across two
/// network chunks is only decoded once its line is complete.
pub struct LineBuffer {
    buffer: VecDeque<u8>,
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    /// Returns None while no complete line is buffered.
    pub fn next_line(&mut self) -> Option<Result<String>> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }

        match String::from_utf8(line_bytes) {
            Ok(line) => Some(Ok(line)),
            Err(e) => Some(Err(anyhow::anyhow!("Invalid UTF-8: {}", e))),
        }
    }

    /// Drain whatever is left after the upstream closed
    pub fn take_remainder(&mut self) -> Option<Result<String>> {
        if self.buffer.is_empty() {
            return None;
        }
        let bytes: Vec<u8> = self.buffer.drain(..).collect();
        match String::from_utf8(bytes) {
            Ok(line) => Some(Ok(line.trim_end_matches('\r').to_string())),
            Err(e) => Some(Err(anyhow::anyhow!("Invalid UTF-8: {}", e))),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_and_crlf() {
        let mut buffer = LineBuffer::with_capacity(64);
        buffer.extend(b"line1\r\nline2\n");

        assert_eq!(buffer.next_line().unwrap().unwrap(), "line1");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "line2");
        assert!(buffer.next_line().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_line() {
        let mut buffer = LineBuffer::with_capacity(64);

        buffer.extend(b"partial");
        assert!(buffer.next_line().is_none());

        buffer.extend(b" line\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "partial line");
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "申论\n".as_bytes();
        let mut buffer = LineBuffer::with_capacity(64);

        buffer.extend(&text[..2]);
        assert!(buffer.next_line().is_none());
        buffer.extend(&text[2..]);
        assert_eq!(buffer.next_line().unwrap().unwrap(), "申论");
    }

    #[test]
    fn test_remainder() {
        let mut buffer = LineBuffer::with_capacity(16);
        buffer.extend(b"a\ntail");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "a");
        assert_eq!(buffer.take_remainder().unwrap().unwrap(), "tail");
        assert!(buffer.take_remainder().is_none());
    }
}
