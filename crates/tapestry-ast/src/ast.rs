//! Expression and statement trees.
//!
//! Nodes own their children and carry a [`NodeId`] plus the [`Span`] they
//! were parsed from. Parent links live in a [`ParentTable`] owned by the
//! parsed unit; a link is recorded once, when the child is attached.
//!
//! Equality on nodes is structural: ids and spans are ignored.

use crate::span::Span;
use crate::token::Operator;

/// Identity of a node inside one parsed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Parent links of a parsed unit, indexed by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct ParentTable {
    parents: Vec<Option<NodeId>>,
}

impl ParentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a new, still unattached node.
    pub fn register(&mut self) -> NodeId {
        let id = NodeId(self.parents.len() as u32);
        self.parents.push(None);
        id
    }

    /// Record `parent` as the parent of `child`. Returns `false` when the
    /// child already had a parent; the first link is kept.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> bool {
        match self.parents.get_mut(child.0 as usize) {
            Some(slot @ None) => {
                *slot = Some(parent);
                true
            }
            _ => false,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.0 as usize).copied().flatten()
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// N-ary operator, operands folded left to right.
    Operator {
        op: Operator,
        operands: Vec<Expression>,
    },
    Not(Box<Expression>),
    Parenthesis(Box<Expression>),
    Chain(CallChain),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

/// Dotted sequence of calls; each call is evaluated against the result of
/// the previous one. A chain may start from a literal or parenthesized
/// receiver instead of the current value: `"abc".toUpperCase`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallChain {
    pub receiver: Option<Box<Expression>>,
    pub calls: Vec<Call>,
}

impl CallChain {
    pub fn first(&self) -> Option<&Call> {
        self.calls.first()
    }

    /// The call linked after `index`, if any.
    pub fn next(&self, index: usize) -> Option<&Call> {
        self.calls.get(index + 1)
    }
}

/// Pseudo-links recognized by name at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Resolved through the call cascade.
    Link,
    /// `i`: index of the innermost loop iteration.
    LoopIndex,
    /// `args(n)`: n-th argument of the current template call.
    Argument,
    /// `startUserCode`
    UserCodeBegin,
    /// `endUserCode`
    UserCodeEnd,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub id: NodeId,
    pub span: Span,
    pub prefix: Option<String>,
    pub name: String,
    pub kind: CallKind,
    pub args: Vec<Expression>,
    pub filter: Option<Box<Expression>>,
    /// Written with an argument list, even an empty one: `name()`.
    pub parenthesized: bool,
}

impl PartialEq for Call {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
            && self.name == other.name
            && self.kind == other.kind
            && self.args == other.args
            && self.filter == other.filter
    }
}

impl Call {
    /// `prefix::name` or `name`.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}::{}", self.name),
            None => self.name.clone(),
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone)]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Raw template text, escapes already decoded.
    Text(String),
    Sequence(Vec<Statement>),
    /// `[expr/]`
    Feature(Expression),
    /// `[for (cond)] body [/for]`
    For {
        condition: Expression,
        body: Box<Statement>,
    },
    If(IfBlock),
    /// `[comment] ... [/comment]`, kept verbatim and never evaluated.
    Comment(String),
}

/// `[if (c)] ... [elseif (c)] ... [else] ... [/if]`
#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    pub condition: Expression,
    pub then_branch: Box<Statement>,
    pub else_ifs: Vec<ElseIf>,
    pub else_branch: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expression,
    pub body: Statement,
}

impl Statement {
    /// Children in evaluation order (conditions excluded).
    pub fn children(&self) -> Vec<&Statement> {
        match &self.kind {
            StmtKind::Sequence(items) => items.iter().collect(),
            StmtKind::For { body, .. } => vec![body],
            StmtKind::If(block) => {
                let mut children: Vec<&Statement> = vec![&block.then_branch];
                children.extend(block.else_ifs.iter().map(|e| &e.body));
                if let Some(else_branch) = &block.else_branch {
                    children.push(else_branch);
                }
                children
            }
            StmtKind::Text(_) | StmtKind::Feature(_) | StmtKind::Comment(_) => Vec::new(),
        }
    }

    /// Short label for diagnostics and debugger frames.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            StmtKind::Text(_) => "text",
            StmtKind::Sequence(_) => "sequence",
            StmtKind::Feature(_) => "feature",
            StmtKind::For { .. } => "for",
            StmtKind::If(_) => "if",
            StmtKind::Comment(_) => "comment",
        }
    }

    /// Does evaluating this statement ever produce output or side effects?
    pub fn is_inert(&self) -> bool {
        match &self.kind {
            StmtKind::Comment(_) => true,
            StmtKind::Text(text) => text.is_empty(),
            StmtKind::Sequence(items) => items.iter().all(Statement::is_inert),
            _ => false,
        }
    }
}

/// A parsed standalone template: one statement tree over one source text.
#[derive(Debug, Clone)]
pub struct Template {
    pub root: Statement,
    pub parents: ParentTable,
    pub source: String,
}

impl Template {
    pub fn root(&self) -> &Statement {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}
