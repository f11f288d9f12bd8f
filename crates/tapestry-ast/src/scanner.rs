//! Balanced-delimiter text scanner.
//!
//! Every search in the parser goes through one primitive: walk the buffer
//! left to right, skip escaped characters, jump over inhibited regions
//! (string literals, parenthesized groups, nested blocks) by locating their
//! balanced close, and report the first match. `find`, `block_end`,
//! `split_positions`, `count_of` and `last_index_of` are all thin wrappers
//! around it.
//!
//! The scanner is total: bad ranges, empty patterns and unbalanced input
//! yield [`Span::NOT_FOUND`] or an empty result, never a panic.

use crate::span::Span;

/// A delimited region the scanner must not look into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub open: String,
    pub close: String,
    /// Nested opens increase the depth (parentheses) or not (quotes).
    pub recursive: bool,
    /// The open token only counts when not followed by an identifier
    /// character, so `[if` does not match `[iframe/]`.
    pub keyword: bool,
}

impl Pair {
    /// Recursive pair such as `(` `)`.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            recursive: true,
            keyword: false,
        }
    }

    /// Non-recursive pair such as `"` `"`.
    pub fn flat(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            recursive: false,
            ..Self::new(open, close)
        }
    }

    /// Recursive pair whose open token is a keyword (`[for` ... `[/for]`).
    pub fn keyword(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            keyword: true,
            ..Self::new(open, close)
        }
    }

    /// Does `rest` start with this pair's open token?
    pub fn opens(&self, rest: &str) -> bool {
        if self.open.is_empty() || !rest.starts_with(self.open.as_str()) {
            return false;
        }
        !self.keyword || !rest[self.open.len()..].starts_with(is_ident_char)
    }
}

/// Identifier characters for keyword boundaries.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Configured text scanner. Construct one per grammar context; there is no
/// shared default instance.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    escape: Option<char>,
    inhibited: Vec<Pair>,
}

impl Scanner {
    /// Scanner without escape character or inhibited regions.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escape(mut self, escape: char) -> Self {
        self.escape = Some(escape);
        self
    }

    pub fn inhibit(mut self, pair: Pair) -> Self {
        self.inhibited.push(pair);
        self
    }

    /// Scanner for expression text: string literals, parentheses and
    /// brackets are opaque.
    pub fn expression() -> Self {
        Self::new()
            .with_escape('\\')
            .inhibit(Pair::flat("\"", "\""))
            .inhibit(Pair::new("(", ")"))
            .inhibit(Pair::new("[", "]"))
    }

    pub fn escape(&self) -> Option<char> {
        self.escape
    }

    pub fn inhibited(&self) -> &[Pair] {
        &self.inhibited
    }

    /// First top-level occurrence of `pattern` inside `range`.
    pub fn find(&self, buffer: &str, pattern: &str, range: Span) -> Span {
        self.find_any(buffer, &[pattern], range)
            .map(|(_, span)| span)
            .unwrap_or(Span::NOT_FOUND)
    }

    /// First top-level occurrence of any of `patterns`, with the index of
    /// the pattern that matched. Earlier patterns win at the same position.
    pub fn find_any(&self, buffer: &str, patterns: &[&str], range: Span) -> Option<(usize, Span)> {
        let (begin, end) = bounds(buffer, range)?;
        if patterns.iter().all(|p| p.is_empty()) {
            return None;
        }
        self.scan(buffer, begin, end, patterns)
    }

    /// Matching close of the block whose open token starts at `start`.
    pub fn block_end(
        &self,
        buffer: &str,
        open: &str,
        close: &str,
        start: usize,
        range: Span,
        recursive: bool,
    ) -> Span {
        let pair = Pair {
            open: open.to_string(),
            close: close.to_string(),
            recursive,
            keyword: false,
        };
        self.pair_end(buffer, &pair, start, range)
    }

    /// Like [`Scanner::block_end`] for a prepared [`Pair`].
    pub fn pair_end(&self, buffer: &str, pair: &Pair, start: usize, range: Span) -> Span {
        let Some((begin, end)) = bounds(buffer, range) else {
            return Span::NOT_FOUND;
        };
        if pair.close.is_empty() || start < begin || start >= end {
            return Span::NOT_FOUND;
        }
        match buffer.get(start..end) {
            Some(rest) if pair.opens(rest) => {}
            _ => return Span::NOT_FOUND,
        }
        self.close_of(buffer, pair, start + pair.open.len(), end)
    }

    /// Spans of every top-level occurrence of `separator`.
    pub fn split_positions(&self, buffer: &str, separator: &str, range: Span) -> Vec<Span> {
        let mut positions = Vec::new();
        let Some((_, end)) = bounds(buffer, range) else {
            return positions;
        };
        let mut cursor = range;
        loop {
            let found = self.find(buffer, separator, cursor);
            if !found.is_found() {
                break;
            }
            positions.push(found);
            cursor = Span::new(found.end, end);
            if !cursor.is_found() {
                break;
            }
        }
        positions
    }

    /// Segments of `range` between top-level occurrences of `separator`.
    /// A range without separators yields a single segment.
    pub fn split(&self, buffer: &str, separator: &str, range: Span) -> Vec<Span> {
        let Some((begin, end)) = bounds(buffer, range) else {
            return Vec::new();
        };
        let mut segments = Vec::new();
        let mut start = begin;
        for position in self.split_positions(buffer, separator, range) {
            segments.push(Span::new(start, position.begin));
            start = position.end;
        }
        segments.push(Span::new(start, end));
        segments
    }

    /// Number of top-level occurrences.
    pub fn count_of(&self, buffer: &str, pattern: &str, range: Span) -> usize {
        self.split_positions(buffer, pattern, range).len()
    }

    /// Last top-level occurrence.
    pub fn last_index_of(&self, buffer: &str, pattern: &str, range: Span) -> Span {
        self.split_positions(buffer, pattern, range)
            .pop()
            .unwrap_or(Span::NOT_FOUND)
    }

    fn scan(&self, buffer: &str, mut pos: usize, end: usize, patterns: &[&str]) -> Option<(usize, Span)> {
        while pos < end {
            let rest = &buffer[pos..end];
            if let Some(escape) = self.escape {
                if rest.starts_with(escape) {
                    pos = skip_escaped(buffer, pos, end, escape);
                    continue;
                }
            }
            for (index, pattern) in patterns.iter().enumerate() {
                if !pattern.is_empty() && rest.starts_with(pattern) {
                    return Some((index, Span::new(pos, pos + pattern.len())));
                }
            }
            if let Some(pair) = self.inhibited.iter().find(|pair| pair.opens(rest)) {
                let close = self.close_of(buffer, pair, pos + pair.open.len(), end);
                if !close.is_found() {
                    return None;
                }
                pos = close.end;
                continue;
            }
            pos += char_len(rest);
        }
        None
    }

    fn close_of(&self, buffer: &str, pair: &Pair, mut pos: usize, end: usize) -> Span {
        let mut depth = 1usize;
        while pos < end {
            let rest = &buffer[pos..end];
            if let Some(escape) = self.escape {
                if rest.starts_with(escape) {
                    pos = skip_escaped(buffer, pos, end, escape);
                    continue;
                }
            }
            if rest.starts_with(pair.close.as_str()) {
                depth -= 1;
                if depth == 0 {
                    return Span::new(pos, pos + pair.close.len());
                }
                pos += pair.close.len();
                continue;
            }
            if pair.recursive && pair.opens(rest) {
                depth += 1;
                pos += pair.open.len();
                continue;
            }
            if let Some(inner) = self
                .inhibited
                .iter()
                .find(|other| other.open != pair.open && other.opens(rest))
            {
                let close = self.close_of(buffer, inner, pos + inner.open.len(), end);
                if !close.is_found() {
                    return Span::NOT_FOUND;
                }
                pos = close.end;
                continue;
            }
            pos += char_len(rest);
        }
        Span::NOT_FOUND
    }
}

/// Whitespace-trimmed sub-span.
pub fn trim(buffer: &str, span: Span) -> Span {
    let Some(text) = span.slice(buffer) else {
        return Span::NOT_FOUND;
    };
    let leading = text.len() - text.trim_start().len();
    let trailing = text.len() - text.trim_end().len();
    if leading == text.len() {
        return Span::new(span.begin, span.begin);
    }
    Span::new(span.begin + leading, span.end - trailing)
}

/// Clip `range` to the buffer and check it lands on char boundaries.
fn bounds(buffer: &str, range: Span) -> Option<(usize, usize)> {
    let range = range.clip(Span::of(buffer));
    if !range.is_found()
        || !buffer.is_char_boundary(range.begin)
        || !buffer.is_char_boundary(range.end)
    {
        return None;
    }
    Some((range.begin, range.end))
}

fn skip_escaped(buffer: &str, pos: usize, end: usize, escape: char) -> usize {
    let after = pos + escape.len_utf8();
    if after >= end {
        return end;
    }
    after + char_len(&buffer[after..end])
}

fn char_len(rest: &str) -> usize {
    rest.chars().next().map_or(1, char::len_utf8)
}
