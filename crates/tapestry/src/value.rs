//! Runtime values produced by evaluation.
//!
//! A [`Value`] is the payload; a [`ValueNode`] wraps it with where it came
//! from, what went wrong while producing it, whether absence is acceptable,
//! and which source span produced which part of its text.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tapestry_ast::{Location, NodeId, Span};

use crate::error::EvalError;
use crate::model::{Model, ObjectId};

/// Runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Absent,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    /// Reference to a node of the model being generated from.
    Node(ObjectId),
    /// Never holds absent elements.
    List(Vec<ValueNode>),
}

impl Value {
    /// Type name for error messages.
    pub fn type_name(&self) -> &'static str {
        ValueType::of(self).name()
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Real(_))
    }

    pub fn as_list(&self) -> Option<&[ValueNode]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Textual rendering; never fails. Absent renders as nothing, a list
    /// as the concatenation of its elements and a model node as its label.
    pub fn render(&self, model: &dyn Model) -> String {
        let mut out = String::new();
        self.render_into(model, &mut out);
        out
    }

    fn render_into(&self, model: &dyn Model, out: &mut String) {
        match self {
            Value::Absent => {}
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Real(x) => out.push_str(&format!("{x:?}")),
            Value::Text(s) => out.push_str(s),
            Value::Node(id) => out.push_str(&model.label(*id)),
            Value::List(items) => items.iter().for_each(|item| item.value.render_into(model, out)),
        }
    }

    /// Order used by `sort`: numbers by value, then text lexicographic,
    /// then everything else in its original position.
    pub fn sort_order(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.as_real().unwrap_or(0.0), b.as_real().unwrap_or(0.0));
                a.total_cmp(&b)
            }
            (a, b) => a.sort_group().cmp(&b.sort_group()),
        }
    }

    fn sort_group(&self) -> u8 {
        match self {
            Value::Int(_) | Value::Real(_) => 0,
            Value::Text(_) => 1,
            _ => 2,
        }
    }

    fn as_real(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Real(x) => Some(*x),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Node(id)
    }
}

// ============================================================================
// Types
// ============================================================================

/// Dynamic type tag of a [`Value`], also used to declare service
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Any,
    Absent,
    Bool,
    Int,
    Real,
    Text,
    Node,
    List,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Absent => ValueType::Absent,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Real(_) => ValueType::Real,
            Value::Text(_) => ValueType::Text,
            Value::Node(_) => ValueType::Node,
            Value::List(_) => ValueType::List,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Absent => "absent",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Real => "real",
            ValueType::Text => "text",
            ValueType::Node => "node",
            ValueType::List => "list",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static type of an expression, answered without evaluating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Any,
    Bool,
    Int,
    Real,
    Text,
    /// Model node of the named type.
    Node(String),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn list_of(element: TypeRef) -> Self {
        TypeRef::List(Box::new(element))
    }

    /// Dynamic tag this type maps to.
    pub fn value_type(&self) -> ValueType {
        match self {
            TypeRef::Any => ValueType::Any,
            TypeRef::Bool => ValueType::Bool,
            TypeRef::Int => ValueType::Int,
            TypeRef::Real => ValueType::Real,
            TypeRef::Text => ValueType::Text,
            TypeRef::Node(_) => ValueType::Node,
            TypeRef::List(_) => ValueType::List,
        }
    }

    pub fn element(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::List(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Node(name) => f.write_str(name),
            TypeRef::List(element) => write!(f, "list<{element}>"),
            other => f.write_str(other.value_type().name()),
        }
    }
}

// ============================================================================
// Diagnostics and provenance
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A message attached to a produced value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// Script the span points into.
    pub file: Option<String>,
    pub location: Option<Location>,
    #[serde(skip)]
    pub error: Option<EvalError>,
}

impl Diagnostic {
    pub fn from_error(error: EvalError) -> Self {
        Self {
            severity: Severity::Error,
            message: error.to_string(),
            span: error.span(),
            file: None,
            location: None,
            error: Some(error),
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
            file: None,
            location: None,
            error: None,
        }
    }

    /// Attach the file and line/column the span points into.
    pub fn located(mut self, file: &str, source: &str) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_string());
            if self.span.is_found() {
                self.location = Some(Location::locate(source, self.span.begin));
            }
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match (&self.file, &self.location) {
            (Some(file), Some(location)) => write!(f, "{file}:{location}: {severity}: {}", self.message),
            (Some(file), None) => write!(f, "{file}: {severity}: {}", self.message),
            _ => write!(f, "{severity}: {}", self.message),
        }
    }
}

/// AST node a value was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub node: NodeId,
    pub span: Span,
}

/// A range of generated text and the source span that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub output: Span,
    pub source: Span,
    pub file: Option<Arc<str>>,
}

// ============================================================================
// ValueNode
// ============================================================================

/// Evaluation result: a value plus its diagnostics.
///
/// Equality compares the payload only.
#[derive(Debug, Clone, Default)]
pub struct ValueNode {
    pub value: Value,
    pub origin: Option<Origin>,
    pub log: Vec<Diagnostic>,
    /// Absence here is expected (an unset feature) and not an error.
    pub optional: bool,
    pub provenance: Vec<Provenance>,
}

impl PartialEq for ValueNode {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<Value> for ValueNode {
    fn from(value: Value) -> Self {
        ValueNode::new(value)
    }
}

impl ValueNode {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    /// Absent value whose absence is not an error.
    pub fn optional_absent() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Value::Text(text.into()))
    }

    /// List of `items`, dropping absent ones.
    pub fn list(items: impl IntoIterator<Item = ValueNode>) -> Self {
        Self::new(Value::List(
            items.into_iter().filter(|item| !item.is_absent()).collect(),
        ))
    }

    /// Failed value carrying `error` in its log.
    pub fn failed(error: EvalError) -> Self {
        let mut node = Self::absent();
        node.log.push(Diagnostic::from_error(error));
        node
    }

    pub fn with_origin(mut self, node: NodeId, span: Span) -> Self {
        self.origin = Some(Origin { node, span });
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_absent()
    }

    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    pub fn has_error(&self) -> bool {
        self.log.iter().any(Diagnostic::is_error)
    }

    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.log.iter().find(|d| d.is_error())
    }

    /// Take over the diagnostics of `other`.
    pub fn absorb_log(&mut self, other: &mut ValueNode) {
        self.log.append(&mut other.log);
    }

    /// Replace the payload, keeping diagnostics and origin.
    pub fn map_value(mut self, value: Value) -> Self {
        self.value = value;
        self.provenance.clear();
        self
    }

    /// Elements when a list, otherwise the value itself as a one-element
    /// sequence (nothing for absent).
    pub fn into_elements(self) -> Vec<ValueNode> {
        match self.value {
            Value::List(items) => items,
            Value::Absent => Vec::new(),
            _ => vec![self],
        }
    }
}

/// Builds the text output of a statement together with its provenance
/// table and the diagnostics of every piece.
#[derive(Debug, Default)]
pub struct TextBuilder {
    text: String,
    log: Vec<Diagnostic>,
    provenance: Vec<Provenance>,
    file: Option<Arc<str>>,
}

impl TextBuilder {
    pub fn new(file: Option<Arc<str>>) -> Self {
        Self {
            file,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Append literal template text produced by `source`.
    pub fn push_text(&mut self, text: &str, source: Span) {
        if text.is_empty() {
            return;
        }
        let begin = self.text.len();
        self.text.push_str(text);
        self.record(Span::new(begin, self.text.len()), source);
    }

    /// Append the rendering of `node`. Its own provenance is shifted into
    /// this output; without any, the whole range maps to its origin.
    pub fn push_node(&mut self, mut node: ValueNode, model: &dyn Model) {
        let begin = self.text.len();
        self.text.push_str(&node.value.render(model));
        let end = self.text.len();
        self.log.append(&mut node.log);
        if !node.provenance.is_empty() {
            let delta = begin as isize;
            self.provenance.extend(node.provenance.into_iter().map(|p| Provenance {
                output: p.output.shift(delta),
                ..p
            }));
        } else if let Some(origin) = node.origin {
            self.record(Span::new(begin, end), origin.span);
        }
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.log.push(diagnostic);
    }

    fn record(&mut self, output: Span, source: Span) {
        if output.is_empty() || !source.is_found() {
            return;
        }
        self.provenance.push(Provenance {
            output,
            source,
            file: self.file.clone(),
        });
    }

    pub fn finish(self) -> ValueNode {
        ValueNode {
            value: Value::Text(self.text),
            origin: None,
            log: self.log,
            optional: false,
            provenance: self.provenance,
        }
    }
}
