//! Incremental pattern matching over a fragmented byte stream

/// Streaming substring matcher (Knuth-Morris-Pratt).
///
/// Bytes are fed one at a time; the matcher carries only a progress index
/// into the needle plus a precomputed failure table, so a match is found
/// even when the needle straddles any number of chunk boundaries, and
/// overlapping false starts (needle `AAB` in stream `AAAB`) are handled
/// without re-reading consumed bytes.
#[derive(Debug)]
pub struct SkipMatcher {
    needle: Vec<u8>,
    failure: Vec<usize>,
    index: usize,
}

impl SkipMatcher {
    /// Build a matcher for `needle`. The needle must be non-empty; the
    /// engine rejects empty patterns before constructing one.
    pub fn new(needle: &[u8]) -> Self {
        debug_assert!(!needle.is_empty());
        let mut failure = vec![0usize; needle.len()];
        let mut k = 0;
        for i in 1..needle.len() {
            while k > 0 && needle[i] != needle[k] {
                k = failure[k - 1];
            }
            if needle[i] == needle[k] {
                k += 1;
            }
            failure[i] = k;
        }
        Self {
            needle: needle.to_vec(),
            failure,
            index: 0,
        }
    }

    /// Feed one byte. Returns true when the needle just completed; the
    /// matcher then resets and can be reused for the next occurrence.
    pub fn push(&mut self, byte: u8) -> bool {
        while self.index > 0 && byte != self.needle[self.index] {
            self.index = self.failure[self.index - 1];
        }
        if byte == self.needle[self.index] {
            self.index += 1;
        }
        if self.index == self.needle.len() {
            self.index = 0;
            return true;
        }
        false
    }

    /// Current progress into the needle (0 = no partial match).
    pub fn progress(&self) -> usize {
        self.index
    }

    /// Discard any partial-match state.
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(m: &mut SkipMatcher, stream: &[u8]) -> Option<usize> {
        for (i, &b) in stream.iter().enumerate() {
            if m.push(b) {
                return Some(i);
            }
        }
        None
    }

    #[test]
    fn plain_match() {
        let mut m = SkipMatcher::new(b"CRLF");
        assert_eq!(feed(&mut m, b"xxCRLFyy"), Some(5));
    }

    #[test]
    fn false_start_then_match() {
        // "AB" in "AAB": the first A is a false start
        let mut m = SkipMatcher::new(b"AB");
        assert_eq!(feed(&mut m, b"AAB"), Some(2));
    }

    #[test]
    fn overlapping_prefix_is_not_lost() {
        // Naive reset-and-advance misses this one
        let mut m = SkipMatcher::new(b"AAB");
        assert_eq!(feed(&mut m, b"AAAB"), Some(3));
    }

    #[test]
    fn match_across_chunk_boundary() {
        let mut m = SkipMatcher::new(b"END");
        assert_eq!(feed(&mut m, b"...E"), None);
        assert_eq!(m.progress(), 1);
        assert_eq!(feed(&mut m, b"ND..."), Some(1));
    }

    #[test]
    fn matcher_resets_after_match() {
        let mut m = SkipMatcher::new(b"ab");
        assert_eq!(feed(&mut m, b"ab"), Some(1));
        assert_eq!(m.progress(), 0);
        assert_eq!(feed(&mut m, b"ab"), Some(1));
    }

    #[test]
    fn reset_clears_partial_state() {
        let mut m = SkipMatcher::new(b"abc");
        feed(&mut m, b"ab");
        m.reset();
        assert_eq!(feed(&mut m, b"c"), None);
    }
}
