//! Byte cursor over a single normalized source line.

/// A position inside a line of source text.
///
/// `Cursor` is `Copy`: primitives that may fail work on a copy and only write
/// it back on success, so a failed match never moves the caller's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor<'a> {
    /// The whole line.
    src: &'a str,
    /// Current byte offset into `src`.
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The unconsumed remainder of the line.
    pub fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or("")
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    // ── Byte access ──

    pub fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    /// Consume one byte.
    pub fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Consume `b` if it is next.
    pub fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume `word` if the rest starts with it, ignoring ASCII case.
    pub fn eat_ignore_case(&mut self, word: &str) -> bool {
        let rest = self.rest().as_bytes();
        if rest.len() >= word.len() && rest[..word.len()].eq_ignore_ascii_case(word.as_bytes()) {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    /// Consume `word` followed by at least one space, ignoring ASCII case.
    /// Used for keywords such as `offset` and `short`.
    pub fn eat_keyword(&mut self, word: &str) -> bool {
        let mut probe = *self;
        if probe.eat_ignore_case(word) && probe.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            probe.skip_spaces();
            *self = probe;
            true
        } else {
            false
        }
    }

    // ── Runs ──

    /// Consume bytes while `pred` holds; returns the consumed slice.
    pub fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.slice(start, self.pos)
    }

    pub fn skip_spaces(&mut self) {
        self.take_while(|b| b.is_ascii_whitespace());
    }

    /// Skip spaces and any of the separator bytes in `seps`.
    pub fn skip_separators(&mut self, seps: &[u8]) {
        self.take_while(|b| b.is_ascii_whitespace() || seps.contains(&b));
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        self.src.get(start..end).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_while_returns_the_run() {
        let mut cur = Cursor::new("abc123 rest");
        assert_eq!(cur.take_while(|b| b.is_ascii_alphabetic()), "abc");
        assert_eq!(cur.pos(), 3);
        assert_eq!(cur.rest(), "123 rest");
    }

    #[test]
    fn test_keyword_requires_trailing_space() {
        let mut cur = Cursor::new("offsetx");
        assert!(!cur.eat_keyword("offset"));
        assert_eq!(cur.pos(), 0);

        let mut cur = Cursor::new("OFFSET  name");
        assert!(cur.eat_keyword("offset"));
        assert_eq!(cur.rest(), "name");
    }

    #[test]
    fn test_peek_past_end_is_none() {
        let mut cur = Cursor::new("a");
        assert_eq!(cur.bump(), Some(b'a'));
        assert!(cur.at_end());
        assert_eq!(cur.peek(), None);
        assert_eq!(cur.peek_at(4), None);
        assert_eq!(cur.rest(), "");
    }
}
