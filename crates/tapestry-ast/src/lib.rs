//! Scanner, parser and AST for Tapestry templates.
//!
//! Text is located with a balanced-delimiter [`Scanner`], turned into an
//! [`Expression`]/[`Statement`] tree by the recursive-descent [`Parser`],
//! and grouped into [`Script`] units of named template definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ast;
mod display;
pub mod parser;
pub mod scanner;
pub mod script;
pub mod span;
pub mod token;

pub use ast::{
    Call, CallChain, CallKind, ElseIf, ExprKind, Expression, IfBlock, Literal, NodeId,
    ParentTable, Statement, StmtKind, Template,
};
pub use parser::{parse_expression, parse_statement, Parser};
pub use scanner::{Pair, Scanner};
pub use script::{parse_script, Directive, Script, TemplateDef};
pub use span::Span;
pub use token::Operator;

// ============================================================================
// Location
// ============================================================================

/// Location in source code (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

impl Location {
    pub fn new(line: usize, column: usize, byte_offset: usize) -> Self {
        Self {
            line,
            column,
            byte_offset,
        }
    }

    /// Line and column of `offset` in `source`. Offsets past the end are
    /// clamped to the end.
    pub fn locate(source: &str, offset: usize) -> Self {
        let mut offset = offset.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = source[line_start..offset].chars().count() + 1;
        Self {
            line,
            column,
            byte_offset: offset,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("syntax error at line {}, column {}: {message}", location.line, location.column)]
    Syntax {
        message: String,
        span: Span,
        location: Location,
    },

    #[error("missing '{expected}' for '{construct}' opened at line {}, column {}", location.line, location.column)]
    Unclosed {
        construct: &'static str,
        expected: &'static str,
        span: Span,
        location: Location,
    },

    #[error("unexpected '{tag}' at line {}, column {}", location.line, location.column)]
    UnexpectedTag {
        tag: String,
        span: Span,
        location: Location,
    },

    #[error("reserved word '{word}' cannot be used as a call name at line {}, column {}", location.line, location.column)]
    ReservedWord {
        word: String,
        span: Span,
        location: Location,
    },

    #[error("invalid identifier '{name}' at line {}, column {}", location.line, location.column)]
    InvalidIdentifier {
        name: String,
        span: Span,
        location: Location,
    },
}

impl ParseError {
    /// Offending source range.
    pub fn span(&self) -> Span {
        match self {
            ParseError::Syntax { span, .. }
            | ParseError::Unclosed { span, .. }
            | ParseError::UnexpectedTag { span, .. }
            | ParseError::ReservedWord { span, .. }
            | ParseError::InvalidIdentifier { span, .. } => *span,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            ParseError::Syntax { location, .. }
            | ParseError::Unclosed { location, .. }
            | ParseError::UnexpectedTag { location, .. }
            | ParseError::ReservedWord { location, .. }
            | ParseError::InvalidIdentifier { location, .. } => *location,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a whole template text into a statement tree.
pub fn parse(source: &str) -> Result<Template, ParseError> {
    let mut parser = Parser::new(source);
    let root = parser.statement(Span::of(source))?;
    Ok(Template {
        root,
        parents: parser.into_parents(),
        source: source.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_simple_text() {
        let template = parse("Hello, World!").unwrap();
        match &template.root.kind {
            StmtKind::Sequence(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].kind, StmtKind::Text("Hello, World!".to_string()));
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn parse_feature_with_location() {
        let source = "Hello,\n  [name/]!";
        let template = parse(source).unwrap();
        let StmtKind::Sequence(items) = &template.root.kind else {
            panic!("expected sequence");
        };
        assert_eq!(items.len(), 3);
        let location = Location::locate(source, items[1].span.begin);
        assert_eq!(location, Location::new(2, 3, 9));
    }

    #[test]
    fn parents_are_recorded_once() {
        let template = parse("[for (items)][name/][/for]").unwrap();
        let StmtKind::Sequence(items) = &template.root.kind else {
            panic!("expected sequence");
        };
        let for_stmt = &items[0];
        assert_eq!(template.parents.parent(for_stmt.id), Some(template.root.id));
        let StmtKind::For { body, condition } = &for_stmt.kind else {
            panic!("expected for");
        };
        assert_eq!(template.parents.parent(body.id), Some(for_stmt.id));
        assert_eq!(template.parents.parent(condition.id), Some(for_stmt.id));
        assert_eq!(template.parents.parent(template.root.id), None);

        let mut table = ParentTable::new();
        let a = table.register();
        let b = table.register();
        let c = table.register();
        assert!(table.attach(a, c));
        assert!(!table.attach(b, c));
        assert_eq!(table.parent(c), Some(a));
        assert_eq!(table.ancestors(c).collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn error_location() {
        let result = parse("line\n[for (a)]x");
        let error = result.unwrap_err();
        assert!(matches!(error, ParseError::Unclosed { .. }));
        assert_eq!(error.location().line, 2);
        assert_eq!(error.location().column, 1);
    }

    #[test]
    fn locate_clamps_and_counts_chars() {
        assert_eq!(Location::locate("ab", 10), Location::new(1, 3, 2));
        assert_eq!(Location::locate("é\nx", 3), Location::new(2, 1, 3));
    }
}
