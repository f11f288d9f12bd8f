//! Error types for the Tapestry engine.

use thiserror::Error;

pub use tapestry_ast::{Location, ParseError, Span};

use crate::model::ModelError;

/// A value did not have the shape an operator or adapter needs.
///
/// Never leaves a statement as is: the evaluator turns it into an
/// [`EvalError::Evaluation`] carrying the offending span.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoercionError {
    #[error("operator '{op}' cannot be applied to {left} and {right}")]
    Operator {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot convert {from} to {to}")]
    Convert { from: &'static str, to: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{op}'")]
    Overflow { op: &'static str },
}

/// Failures raised while evaluating a tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{message}{}", evaluated_on(.value))]
    Evaluation {
        message: String,
        span: Span,
        /// Scope that raised the failure, when a service did.
        scope: Option<String>,
        value_type: Option<String>,
        /// Shortened rendering of the value the call was evaluated against.
        value: Option<String>,
        /// Blocking failures abort the whole request instead of being
        /// recorded in the output of the failing statement.
        blocking: bool,
    },

    #[error("cannot resolve '{call}' on {value_type}")]
    Resolution {
        call: String,
        value_type: String,
        span: Span,
    },

    #[error("boolean required, got {value_type}")]
    BooleanRequired { value_type: String, span: Span },

    #[error("expression evaluated to nothing")]
    EmptyEvaluation { span: Span },

    #[error("generation canceled")]
    Canceled,

    #[error("template calls nested deeper than {max}")]
    DepthExceeded { max: usize, span: Span },
}

impl EvalError {
    pub fn evaluation(message: impl Into<String>, span: Span) -> Self {
        EvalError::Evaluation {
            message: message.into(),
            span,
            scope: None,
            value_type: None,
            value: None,
            blocking: false,
        }
    }

    pub fn coercion(error: CoercionError, span: Span) -> Self {
        EvalError::evaluation(error.to_string(), span)
    }

    /// Span of the node that failed, `Span::NOT_FOUND` when none applies.
    pub fn span(&self) -> Span {
        match self {
            EvalError::Evaluation { span, .. }
            | EvalError::Resolution { span, .. }
            | EvalError::BooleanRequired { span, .. }
            | EvalError::EmptyEvaluation { span }
            | EvalError::DepthExceeded { span, .. } => *span,
            EvalError::Canceled => Span::NOT_FOUND,
        }
    }

    pub fn is_blocking(&self) -> bool {
        match self {
            EvalError::Evaluation { blocking, .. } => *blocking,
            EvalError::Canceled | EvalError::DepthExceeded { .. } => true,
            _ => false,
        }
    }
}

fn evaluated_on(value: &Option<String>) -> String {
    match value {
        Some(value) => format!(" (evaluated on \"{value}\")"),
        None => String::new(),
    }
}

/// `text` cut to its first 40 characters, for error messages.
pub fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 40;
    match text.char_indices().nth(MAX_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// All errors surfaced by the public API.
#[derive(Error, Debug)]
pub enum TapestryError {
    #[error("parse error in '{script}': {source}")]
    Parse { script: String, source: ParseError },

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("load error: {message}")]
    Load { message: String },

    #[error("merge error in '{path}': {message}")]
    Merge { path: String, message: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invalid settings: {message}")]
    InvalidSettings { message: String },

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tapestry operations
pub type Result<T> = std::result::Result<T, TapestryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_errors() {
        assert!(EvalError::Canceled.is_blocking());
        assert!(EvalError::DepthExceeded {
            max: 1,
            span: Span::new(0, 1)
        }
        .is_blocking());
        assert!(!EvalError::evaluation("x", Span::new(0, 1)).is_blocking());
        assert!(!EvalError::EmptyEvaluation { span: Span::new(0, 1) }.is_blocking());
    }

    #[test]
    fn coercion_message_names_operands() {
        let error = EvalError::coercion(
            CoercionError::Operator {
                op: "-",
                left: "bool",
                right: "list",
            },
            Span::new(2, 5),
        );
        assert_eq!(error.to_string(), "operator '-' cannot be applied to bool and list");
    }

    #[test]
    fn evaluation_errors_show_the_value() {
        let error = EvalError::Evaluation {
            message: "charAt: index 9 out of range".to_string(),
            span: Span::new(0, 1),
            scope: Some("text".to_string()),
            value_type: Some("text".to_string()),
            value: Some(preview("abc")),
            blocking: false,
        };
        assert_eq!(
            error.to_string(),
            "charAt: index 9 out of range (evaluated on \"abc\")"
        );
        assert_eq!(preview(&"é".repeat(50)), format!("{}...", "é".repeat(40)));
        assert_eq!(error.span(), Span::new(2, 5));
    }
}
