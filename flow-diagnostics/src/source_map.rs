use std::fmt;
use std::path::PathBuf;

/// Identifies one registered source (a file, an in-memory string, or an
/// `import ... from` include) within a [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u32);

/// Where a source's bytes came from. Kept only for diagnostics and
/// re-opening includes; the lexer only ever sees `content`.
#[derive(Debug, Clone)]
pub enum SourceOrigin {
    File(PathBuf),
    Inline(String),
}

struct SourceEntry {
    name: String,
    origin: SourceOrigin,
    content: String,
    /// Byte offset of the start of each line, for span -> line/column lookup.
    line_starts: Vec<u32>,
}

/// Owns every source text touched while compiling one Flow unit, including
/// the transitive closure of `import ... from` includes. `Span`s index into
/// this map rather than holding a reference, so the AST and IR stay
/// `'static` and cheaply cloneable.
#[derive(Default)]
pub struct SourceMap {
    entries: Vec<SourceEntry>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, content: String) -> SourceId {
        let path = path.into();
        let name = path.display().to_string();
        self.add(name, SourceOrigin::File(path), content)
    }

    pub fn add_inline(&mut self, name: impl Into<String>, content: String) -> SourceId {
        let name = name.into();
        self.add(name, SourceOrigin::Inline(content.clone()), content)
    }

    fn add(&mut self, name: String, origin: SourceOrigin, content: String) -> SourceId {
        let line_starts = compute_line_starts(&content);
        let id = SourceId(self.entries.len() as u32);
        self.entries.push(SourceEntry {
            name,
            origin,
            content,
            line_starts,
        });
        id
    }

    pub fn name(&self, id: SourceId) -> &str {
        &self.entry(id).name
    }

    pub fn origin(&self, id: SourceId) -> &SourceOrigin {
        &self.entry(id).origin
    }

    pub fn content(&self, id: SourceId) -> &str {
        &self.entry(id).content
    }

    /// Resolve a byte offset into a 1-based (line, column) pair.
    pub fn position(&self, id: SourceId, offset: u32) -> Position {
        let entry = self.entry(id);
        let line_idx = match entry.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = entry.line_starts[line_idx];
        let column = entry.content[line_start as usize..offset as usize]
            .chars()
            .count() as u32
            + 1;
        Position {
            line: line_idx as u32 + 1,
            column,
        }
    }

    fn entry(&self, id: SourceId) -> &SourceEntry {
        &self.entries[id.0 as usize]
    }
}

fn compute_line_starts(content: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i as u32 + 1);
        }
    }
    starts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open byte range `[start, end)` within one registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub source: SourceId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(source: SourceId, start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { source, start, end }
    }

    pub fn to(self, other: Span) -> Span {
        debug_assert_eq!(self.source, other.source);
        Span::new(self.source, self.start, other.end)
    }
}
