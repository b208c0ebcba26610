//! Cross-call leftover byte buffer
//!
//! Holds bytes that were physically read from the transport but not yet
//! delivered to the caller: the tail after a line separator, or a partial
//! line a timed-out `get_line` must not lose. Invariant: every byte in here
//! was received from hardware and will be delivered by a later call.

/// Growable owned byte buffer retained across receive calls.
///
/// Backed by a `Vec`, whose capacity/length split gives the explicit
/// reuse-on-resize behavior (the allocation survives `take_all`/`put`
/// cycles once it has grown).
#[derive(Debug, Default)]
pub struct LeftoverBuffer {
    bytes: Vec<u8>,
}

impl LeftoverBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when `separator` occurs somewhere in the retained bytes.
    pub fn contains(&self, separator: u8) -> bool {
        self.bytes.contains(&separator)
    }

    /// If the buffer holds a complete line, split it off: the bytes before
    /// the first `separator` are returned, the separator is dropped, and the
    /// remainder stays retained.
    pub fn take_line(&mut self, separator: u8) -> Option<Vec<u8>> {
        let pos = self.bytes.iter().position(|&b| b == separator)?;
        let mut rest = self.bytes.split_off(pos + 1);
        self.bytes.pop(); // the separator itself
        std::mem::swap(&mut self.bytes, &mut rest);
        Some(rest)
    }

    /// Take everything, leaving the buffer empty.
    pub fn take_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Append bytes read from hardware but not delivered.
    pub fn put(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Put bytes back in front of whatever is retained. Used when a line
    /// read fails after accumulating data: the partial line goes back so a
    /// later call can still assemble the full line.
    pub fn restore_front(&mut self, mut data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        data.extend_from_slice(&self.bytes);
        self.bytes = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_line_splits_at_first_separator() {
        let mut buf = LeftoverBuffer::new();
        buf.put(b"hello\nworld\n!");
        assert_eq!(buf.take_line(b'\n').unwrap(), b"hello");
        assert_eq!(buf.take_line(b'\n').unwrap(), b"world");
        assert!(buf.take_line(b'\n').is_none());
        assert_eq!(buf.take_all(), b"!");
    }

    #[test]
    fn take_line_with_leading_separator_yields_empty_line() {
        let mut buf = LeftoverBuffer::new();
        buf.put(b"\nrest");
        assert_eq!(buf.take_line(b'\n').unwrap(), b"");
        assert_eq!(buf.take_all(), b"rest");
    }

    #[test]
    fn contains_checks_without_consuming() {
        let mut buf = LeftoverBuffer::new();
        buf.put(b"abc;def");
        assert!(buf.contains(b';'));
        assert!(!buf.contains(b'\n'));
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn restore_front_preserves_order() {
        let mut buf = LeftoverBuffer::new();
        buf.put(b"tail");
        buf.restore_front(b"head-".to_vec());
        assert_eq!(buf.take_all(), b"head-tail");
    }

    #[test]
    fn restore_front_of_nothing_is_noop() {
        let mut buf = LeftoverBuffer::new();
        buf.restore_front(Vec::new());
        assert!(buf.is_empty());
    }
}
