//! Formatting into fixed buffers without allocation.

use core::fmt;

/// `fmt::Write` sink over a byte slice that truncates instead of failing
/// the whole format operation.
pub struct FixedWriter<'a> {
    buffer: &'a mut [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> FixedWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            pos: 0,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn push(&mut self, byte: u8) {
        if self.pos < self.buffer.len() {
            self.buffer[self.pos] = byte;
            self.pos += 1;
        } else {
            self.truncated = true;
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let remaining = self.buffer.len() - self.pos;
        let n = bytes.len().min(remaining);
        self.buffer[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        if n < bytes.len() {
            self.truncated = true;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }
}

impl fmt::Write for FixedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

/// Format `args` into `buf`, truncating, and return the bytes written.
pub fn format_into<'a>(buf: &'a mut [u8], args: fmt::Arguments<'_>) -> &'a [u8] {
    let mut writer = FixedWriter::new(buf);
    let _ = fmt::write(&mut writer, args);
    let len = writer.len();
    &buf[..len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_at_capacity() {
        let mut buf = [0u8; 8];
        let out = format_into(&mut buf, format_args!("{}-{}", "abcdef", 12345));
        assert_eq!(out, b"abcdef-1");
    }

    #[test]
    fn push_tracks_truncation() {
        let mut buf = [0u8; 2];
        let mut w = FixedWriter::new(&mut buf);
        w.push(b'a');
        w.push(b'b');
        assert!(!w.truncated());
        w.push(b'c');
        assert!(w.truncated());
        assert_eq!(w.as_bytes(), b"ab");
    }
}
