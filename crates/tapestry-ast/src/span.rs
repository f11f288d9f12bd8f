//! Byte spans into template sources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open `[begin, end)` byte interval into a source buffer.
///
/// `Span::NOT_FOUND` stands for "no match"; every search in this crate
/// returns it instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    /// Sentinel for a failed search.
    pub const NOT_FOUND: Span = Span {
        begin: usize::MAX,
        end: usize::MAX,
    };

    pub fn new(begin: usize, end: usize) -> Self {
        if begin > end {
            return Span::NOT_FOUND;
        }
        Self { begin, end }
    }

    /// Span covering the whole buffer.
    pub fn of(buffer: &str) -> Self {
        Self::new(0, buffer.len())
    }

    pub fn is_found(&self) -> bool {
        *self != Span::NOT_FOUND
    }

    pub fn len(&self) -> usize {
        if self.is_found() {
            self.end - self.begin
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.is_found() && offset >= self.begin && offset < self.end
    }

    /// Restrict the span to `range`. Disjoint spans become `NOT_FOUND`.
    pub fn clip(&self, range: Span) -> Span {
        if !self.is_found() || !range.is_found() {
            return Span::NOT_FOUND;
        }
        let begin = self.begin.max(range.begin);
        let end = self.end.min(range.end);
        if begin > end {
            Span::NOT_FOUND
        } else {
            Span { begin, end }
        }
    }

    /// Move the span by `delta` bytes, e.g. after text was inserted before it.
    pub fn shift(&self, delta: isize) -> Span {
        if !self.is_found() {
            return Span::NOT_FOUND;
        }
        let begin = self.begin as isize + delta;
        let end = self.end as isize + delta;
        if begin < 0 {
            return Span::NOT_FOUND;
        }
        Span {
            begin: begin as usize,
            end: end as usize,
        }
    }

    /// Smallest span containing both.
    pub fn merge(&self, other: Span) -> Span {
        match (self.is_found(), other.is_found()) {
            (true, true) => Span {
                begin: self.begin.min(other.begin),
                end: self.end.max(other.end),
            },
            (true, false) => *self,
            (false, true) => other,
            (false, false) => Span::NOT_FOUND,
        }
    }

    /// Text covered by the span, or `None` when it does not fit the buffer.
    pub fn slice<'a>(&self, buffer: &'a str) -> Option<&'a str> {
        if !self.is_found() {
            return None;
        }
        buffer.get(self.begin..self.end)
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::NOT_FOUND
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_found() {
            write!(f, "{}..{}", self.begin, self.end)
        } else {
            f.write_str("<not found>")
        }
    }
}
