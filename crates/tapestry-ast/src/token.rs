//! Fixed tokens of the template language.
//!
//! These strings are the wire format of the language; changing any of them
//! breaks existing templates.

/// Opening bracket of every tag.
pub const TAG_OPEN: &str = "[";
/// Closing bracket of block tags.
pub const TAG_CLOSE: &str = "]";
/// End of a feature tag: `[expr/]`.
pub const FEATURE_END: &str = "/]";
/// Escape character in template text (`\[` emits `[`) and string literals.
pub const ESCAPE: char = '\\';

pub const FOR_BEGIN: &str = "[for";
pub const FOR_END: &str = "[/for]";
pub const IF_BEGIN: &str = "[if";
pub const ELSE_IF: &str = "[elseif";
pub const ELSE: &str = "[else]";
pub const IF_END: &str = "[/if]";
pub const COMMENT_BEGIN: &str = "[comment]";
pub const COMMENT_END: &str = "[/comment]";

pub const TEMPLATE_BEGIN: &str = "[template";
pub const TEMPLATE_END: &str = "[/template]";
pub const IMPORT: &str = "[import";
pub const EXTENDS: &str = "[extends";
/// Template attribute holding the generated file path.
pub const ATTR_FILE: &str = "file";
/// Template attribute holding the post-processing expression.
pub const ATTR_POST: &str = "post";
/// Template type matching every receiver.
pub const ANY_TYPE: &str = "*";

pub const CALL_SEPARATOR: &str = ".";
pub const PREFIX_SEPARATOR: &str = "::";
pub const ARGS_OPEN: &str = "(";
pub const ARGS_CLOSE: &str = ")";
pub const ARG_SEPARATOR: &str = ",";
pub const FILTER_OPEN: &str = "[";
pub const FILTER_CLOSE: &str = "]";
pub const QUOTE: char = '"';
pub const NOT: &str = "!";

pub const KW_TRUE: &str = "true";
pub const KW_FALSE: &str = "false";
pub const KW_NULL: &str = "null";

/// Loop index of the innermost `for`.
pub const CALL_LOOP_INDEX: &str = "i";
/// `args(n)`: n-th argument of the current template call.
pub const CALL_ARGUMENT: &str = "args";
pub const CALL_USER_CODE_BEGIN: &str = "startUserCode";
pub const CALL_USER_CODE_END: &str = "endUserCode";

/// Binary operators. Declaration order is the precedence table, lowest
/// precedence first: the parser splits on the first operator that occurs
/// at top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Or,
    And,
    Eq,
    NotEq,
    GtEq,
    LtEq,
    Gt,
    Lt,
    Add,
    Sub,
    Div,
    Mul,
}

impl Operator {
    /// All operators in precedence order.
    pub const ALL: [Operator; 12] = [
        Operator::Or,
        Operator::And,
        Operator::Eq,
        Operator::NotEq,
        Operator::GtEq,
        Operator::LtEq,
        Operator::Gt,
        Operator::Lt,
        Operator::Add,
        Operator::Sub,
        Operator::Div,
        Operator::Mul,
    ];

    pub fn literal(self) -> &'static str {
        match self {
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::GtEq => ">=",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Div => "/",
            Operator::Mul => "*",
        }
    }

    pub fn from_literal(literal: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.literal() == literal)
    }

    /// Position in the precedence table, 0 binds loosest.
    pub fn precedence(self) -> usize {
        Operator::ALL
            .iter()
            .position(|op| *op == self)
            .unwrap_or(Operator::ALL.len())
    }

    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Operator::Or => "or",
            Operator::And => "and",
            Operator::Eq => "equals",
            Operator::NotEq => "not equals",
            Operator::GtEq => "greater or equal",
            Operator::LtEq => "less or equal",
            Operator::Gt => "greater",
            Operator::Lt => "less",
            Operator::Add => "add",
            Operator::Sub => "subtract",
            Operator::Div => "divide",
            Operator::Mul => "multiply",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::GtEq | Operator::LtEq | Operator::Gt | Operator::Lt
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Operator::Or | Operator::And)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.literal())
    }
}

/// Reserved words that cannot name a call.
const RESERVED_WORDS: &[&str] = &[KW_TRUE, KW_FALSE, KW_NULL, "for", "if", "else", "elseif"];

pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
