use crate::source_map::{SourceId, SourceMap};

/// A cursor over one registered source's bytes, tracking the byte offset
/// the lexer is currently at. `import ... from "path"` pushes a new frame
/// onto a [`SourceStream`]; lexing resumes in the parent frame once the
/// included source is exhausted.
struct Frame {
    source: SourceId,
    offset: u32,
    len: u32,
}

/// Re-entrant input for the lexer. Supports a single top-level source plus
/// an arbitrarily deep chain of `import` includes, without the lexer ever
/// needing to know whether it is reading a file, an in-memory string, or an
/// included unit.
pub struct SourceStream<'a> {
    map: &'a SourceMap,
    stack: Vec<Frame>,
}

impl<'a> SourceStream<'a> {
    pub fn new(map: &'a SourceMap, root: SourceId) -> Self {
        let len = map.content(root).len() as u32;
        Self {
            map,
            stack: vec![Frame { source: root, offset: 0, len }],
        }
    }

    /// Push an included source; lexing continues there until exhausted.
    pub fn push_include(&mut self, source: SourceId) {
        let len = self.map.content(source).len() as u32;
        self.stack.push(Frame { source, offset: 0, len });
    }

    pub fn current_source(&self) -> SourceId {
        self.stack.last().expect("source stream stack never empty").source
    }

    /// Peek the next character without consuming it, popping exhausted
    /// include frames first.
    pub fn peek(&mut self) -> Option<char> {
        self.pop_exhausted();
        let frame = self.stack.last()?;
        self.map.content(frame.source)[frame.offset as usize..].chars().next()
    }

    pub fn peek2(&mut self) -> Option<char> {
        self.pop_exhausted();
        let frame = self.stack.last()?;
        let mut chars = self.map.content(frame.source)[frame.offset as usize..].chars();
        chars.next();
        chars.next()
    }

    /// Consume and return the next character, advancing the offset and
    /// transparently returning into the parent frame at end-of-include.
    pub fn bump(&mut self) -> Option<char> {
        self.pop_exhausted();
        let frame = self.stack.last_mut()?;
        let rest = &self.map.content(frame.source)[frame.offset as usize..];
        let c = rest.chars().next()?;
        frame.offset += c.len_utf8() as u32;
        Some(c)
    }

    pub fn offset(&self) -> u32 {
        self.stack.last().map(|f| f.offset).unwrap_or(0)
    }

    pub fn is_eof(&mut self) -> bool {
        self.peek().is_none()
    }

    /// The remainder of the current (innermost) frame as a string slice,
    /// for lookahead that needs more than two characters (IP/CIDR literal
    /// scanning). Never crosses an include boundary.
    pub fn rest(&mut self) -> &str {
        self.pop_exhausted();
        let frame = self.stack.last().expect("source stream stack never empty");
        &self.map.content(frame.source)[frame.offset as usize..]
    }

    /// Advance the current frame's offset by `bytes` (ASCII-only
    /// lookahead, e.g. after scanning an IP/CIDR literal via `rest`).
    pub fn advance(&mut self, bytes: u32) {
        if let Some(frame) = self.stack.last_mut() {
            frame.offset += bytes;
        }
    }

    fn pop_exhausted(&mut self) {
        while self.stack.len() > 1 {
            let top = self.stack.last().expect("checked len > 1");
            if top.offset >= top.len {
                self.stack.pop();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumps_through_single_source() {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", "ab".to_string());
        let mut stream = SourceStream::new(&map, id);
        assert_eq!(stream.bump(), Some('a'));
        assert_eq!(stream.bump(), Some('b'));
        assert_eq!(stream.bump(), None);
    }

    #[test]
    fn include_resumes_parent() {
        let mut map = SourceMap::new();
        let root = map.add_inline("root", "A".to_string());
        let inc = map.add_inline("inc", "BC".to_string());
        let mut stream = SourceStream::new(&map, root);
        assert_eq!(stream.bump(), Some('A'));
        stream.push_include(inc);
        assert_eq!(stream.bump(), Some('B'));
        assert_eq!(stream.bump(), Some('C'));
        assert_eq!(stream.bump(), None);
    }
}
