//! Tree-walking evaluation of statements and expressions.
//!
//! The [`Evaluator`] itself is immutable; everything that changes while a
//! request runs lives in the [`EvalContext`] passed alongside.
//!
//! Errors raised by expressions travel as `Err` until the enclosing
//! statement, which records them as diagnostics in its output and lets
//! evaluation continue. Blocking errors (cancellation, call depth) are not
//! recorded and abort the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tapestry_ast::{
    ExprKind, Expression, IfBlock, Literal, Location, Operator, Span, Statement, StmtKind,
    TemplateDef,
};
use tracing::trace;

use crate::coerce::to_bool;
use crate::context::EvalContext;
use crate::debug::{Checkpoint, Debugger};
use crate::error::EvalError;
use crate::loader::Module;
use crate::model::Model;
use crate::scope::Scopes;
use crate::settings::Settings;
use crate::value::{Diagnostic, Origin, TextBuilder, Value, ValueNode};

mod call;
pub mod operators;

/// How far the call cascade searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every scope, templates included.
    Recursive,
    /// Service scopes only; used for `post` expressions.
    Local,
}

pub struct Evaluator<'a> {
    model: &'a dyn Model,
    scopes: &'a Scopes,
    settings: &'a Settings,
    debugger: Option<&'a Debugger>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Evaluator<'a> {
    pub fn new(model: &'a dyn Model, scopes: &'a Scopes, settings: &'a Settings) -> Self {
        Self {
            model,
            scopes,
            settings,
            debugger: None,
            cancel: None,
        }
    }

    pub fn with_debugger(mut self, debugger: &'a Debugger) -> Self {
        self.debugger = Some(debugger);
        self
    }

    /// Evaluation stops at the next statement once `cancel` is set.
    pub fn with_cancel_flag(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn model(&self) -> &'a dyn Model {
        self.model
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Evaluate `statement` against `current`. Only blocking errors are
    /// returned; the others end up in the log of the result.
    pub fn statement(
        &self,
        statement: &Statement,
        current: &ValueNode,
        ctx: &mut EvalContext,
    ) -> Result<ValueNode, EvalError> {
        self.boundary(statement, ctx)?;
        match self.statement_kind(statement, current, ctx) {
            Ok(node) => Ok(node),
            Err(error) if error.is_blocking() => Err(error),
            Err(error) => {
                trace!(statement = statement.label(), %error, "statement failed");
                let mut node = ValueNode::optional_absent();
                node.log.push(self.diagnostic(error, ctx));
                Ok(node)
            }
        }
    }

    fn statement_kind(
        &self,
        statement: &Statement,
        current: &ValueNode,
        ctx: &mut EvalContext,
    ) -> Result<ValueNode, EvalError> {
        match &statement.kind {
            StmtKind::Text(text) => {
                let mut builder = self.builder(ctx);
                builder.push_text(text, statement.span);
                Ok(builder.finish())
            }
            StmtKind::Comment(_) => Ok(ValueNode::text("")),
            StmtKind::Sequence(items) => {
                let mut builder = self.builder(ctx);
                for item in items {
                    let node = self.statement(item, current, ctx)?;
                    builder.push_node(node, self.model);
                }
                Ok(builder.finish())
            }
            StmtKind::Feature(expression) => self.feature(expression, current, ctx),
            StmtKind::For { condition, body } => self.for_loop(condition, body, current, ctx),
            StmtKind::If(block) => self.if_block(block, current, ctx),
        }
    }

    fn builder(&self, ctx: &EvalContext) -> TextBuilder {
        TextBuilder::new(ctx.module().map(|module| module.file()))
    }

    /// Attach the running script and line to `error`.
    fn diagnostic(&self, error: EvalError, ctx: &EvalContext) -> Diagnostic {
        let diagnostic = Diagnostic::from_error(error);
        match ctx.module() {
            Some(module) => diagnostic.located(&module.path, module.source()),
            None => diagnostic,
        }
    }

    /// Checked before every statement: cancellation, then the debugger.
    fn boundary(&self, statement: &Statement, ctx: &EvalContext) -> Result<(), EvalError> {
        if self.cancel.is_some_and(|cancel| cancel.load(Ordering::Relaxed)) {
            return Err(EvalError::Canceled);
        }
        if let Some(debugger) = self.debugger.filter(|debugger| debugger.is_armed()) {
            if matches!(statement.kind, StmtKind::Sequence(_) | StmtKind::Comment(_)) {
                return Ok(());
            }
            let (file, line) = match ctx.module() {
                Some(module) => (
                    module.path.clone(),
                    Location::locate(module.source(), statement.span.begin).line,
                ),
                None => (String::new(), 0),
            };
            debugger.at_statement(Checkpoint {
                file,
                line,
                depth: ctx.depth(),
                statement: statement.label(),
                span: statement.span,
            });
        }
        Ok(())
    }

    fn feature(
        &self,
        expression: &Expression,
        current: &ValueNode,
        ctx: &mut EvalContext,
    ) -> Result<ValueNode, EvalError> {
        let node = self.expression(expression, current, ctx, Mode::Recursive)?;
        if node.is_absent() && !node.optional && !node.has_error() {
            return Err(EvalError::EmptyEvaluation {
                span: expression.span,
            });
        }
        let mut builder = self.builder(ctx);
        builder.push_node(node, self.model);
        Ok(builder.finish())
    }

    fn for_loop(
        &self,
        condition: &Expression,
        body: &Statement,
        current: &ValueNode,
        ctx: &mut EvalContext,
    ) -> Result<ValueNode, EvalError> {
        let mut iterated = self.expression(condition, current, ctx, Mode::Recursive)?;
        let mut builder = self.builder(ctx);
        for diagnostic in std::mem::take(&mut iterated.log) {
            builder.push_diagnostic(diagnostic);
        }

        match iterated.value {
            Value::List(items) => {
                trace!(iterations = items.len(), "for");
                for (index, item) in items.into_iter().enumerate() {
                    self.iteration(index, item, body, ctx, &mut builder)?;
                }
            }
            Value::Int(n) => {
                let count = usize::try_from(n).unwrap_or(0);
                if count > self.settings.max_iterations {
                    return Err(EvalError::evaluation(
                        format!("loop count {n} exceeds the maximum of {}", self.settings.max_iterations),
                        condition.span,
                    ));
                }
                trace!(iterations = count, "for");
                for index in 0..count {
                    self.iteration(index, detached(current), body, ctx, &mut builder)?;
                }
            }
            Value::Absent => {}
            value => self.iteration(0, ValueNode::new(value), body, ctx, &mut builder)?,
        }
        Ok(builder.finish())
    }

    fn iteration(
        &self,
        index: usize,
        item: ValueNode,
        body: &Statement,
        ctx: &mut EvalContext,
        builder: &mut TextBuilder,
    ) -> Result<(), EvalError> {
        let output = ctx.with_iteration(index as i64, item.clone(), |ctx| self.statement(body, &item, ctx))?;
        builder.push_node(output, self.model);
        Ok(())
    }

    fn if_block(&self, block: &IfBlock, current: &ValueNode, ctx: &mut EvalContext) -> Result<ValueNode, EvalError> {
        let branches = std::iter::once((&block.condition, &*block.then_branch))
            .chain(block.else_ifs.iter().map(|branch| (&branch.condition, &branch.body)));
        for (condition, body) in branches {
            if self.condition(condition, current, ctx)? {
                return self.statement(body, current, ctx);
            }
        }
        match &block.else_branch {
            Some(body) => self.statement(body, current, ctx),
            None => Ok(ValueNode::text("")),
        }
    }

    fn condition(&self, condition: &Expression, current: &ValueNode, ctx: &mut EvalContext) -> Result<bool, EvalError> {
        let node = self.expression(condition, current, ctx, Mode::Recursive)?;
        boolean(&node, condition.span)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn expression(
        &self,
        expression: &Expression,
        current: &ValueNode,
        ctx: &mut EvalContext,
        mode: Mode,
    ) -> Result<ValueNode, EvalError> {
        let mut node = match &expression.kind {
            ExprKind::Literal(literal) => literal_value(literal),
            ExprKind::Operator { op, operands } => {
                self.operator(*op, operands, expression.span, current, ctx, mode)?
            }
            ExprKind::Not(inner) => {
                let node = self.expression(inner, current, ctx, mode)?;
                let negated = !boolean(&node, inner.span)?;
                node.map_value(Value::Bool(negated))
            }
            ExprKind::Parenthesis(inner) => self.expression(inner, current, ctx, mode)?,
            ExprKind::Chain(chain) => self.chain(chain, current, ctx, mode)?,
        };
        if node.origin.is_none() {
            node.origin = Some(Origin {
                node: expression.id,
                span: expression.span,
            });
        }
        Ok(node)
    }

    fn operator(
        &self,
        op: Operator,
        operands: &[Expression],
        span: Span,
        current: &ValueNode,
        ctx: &mut EvalContext,
        mode: Mode,
    ) -> Result<ValueNode, EvalError> {
        let Some((first, rest)) = operands.split_first() else {
            return Err(EvalError::evaluation(format!("operator '{}' without operands", op.literal()), span));
        };
        let mut accumulated = self.expression(first, current, ctx, mode)?;
        for operand in rest {
            if let Some(decided) = short_circuit(op, &accumulated.value) {
                return Ok(accumulated.map_value(Value::Bool(decided)));
            }
            let mut right = self.expression(operand, current, ctx, mode)?;
            let value = operators::apply(op, &accumulated.value, &right.value, self.model)
                .map_err(|error| EvalError::coercion(error, span))?;
            accumulated.absorb_log(&mut right);
            accumulated = accumulated.map_value(value);
        }
        Ok(accumulated)
    }

    // ========================================================================
    // Templates
    // ========================================================================

    /// Run `template` of `module` for `receiver`, then its `post`
    /// expression against the produced text.
    pub fn invoke_template(
        &self,
        module: Arc<Module>,
        template: &TemplateDef,
        receiver: ValueNode,
        args: Vec<ValueNode>,
        span: Span,
        ctx: &mut EvalContext,
    ) -> Result<ValueNode, EvalError> {
        if ctx.depth() >= self.settings.max_depth {
            return Err(EvalError::DepthExceeded {
                max: self.settings.max_depth,
                span,
            });
        }
        trace!(template = %template.name, module = %module.name, depth = ctx.depth(), "calling template");
        let receiver = detached(&receiver);
        ctx.with_frame(module, receiver.clone(), args, |ctx| {
            let body = self.statement(&template.body, &receiver, ctx)?;
            match &template.post {
                Some(post) => self.post(post, body, ctx),
                None => Ok(body),
            }
        })
    }

    fn post(&self, post: &Expression, mut body: ValueNode, ctx: &mut EvalContext) -> Result<ValueNode, EvalError> {
        let mut result = self.expression(post, &body, ctx, Mode::Local)?;
        let mut log = std::mem::take(&mut body.log);
        log.append(&mut result.log);
        result.log = log;
        Ok(result)
    }
}

/// `current` stripped of its diagnostics, to be used as a new receiver.
fn detached(current: &ValueNode) -> ValueNode {
    ValueNode::new(current.value.clone()).optional(current.optional)
}

fn literal_value(literal: &Literal) -> ValueNode {
    match literal {
        Literal::Null => ValueNode::optional_absent(),
        Literal::Bool(b) => ValueNode::new(Value::Bool(*b)),
        Literal::Int(n) => ValueNode::new(Value::Int(*n)),
        Literal::Real(x) => ValueNode::new(Value::Real(*x)),
        Literal::Text(s) => ValueNode::text(s.clone()),
    }
}

fn boolean(node: &ValueNode, span: Span) -> Result<bool, EvalError> {
    to_bool(&node.value).map_err(|_| EvalError::BooleanRequired {
        value_type: node.type_name().to_string(),
        span,
    })
}

/// Outcome of `||` or `&&` when the left operand alone decides it. Lists
/// never short-circuit.
fn short_circuit(op: Operator, left: &Value) -> Option<bool> {
    if matches!(left, Value::List(_)) {
        return None;
    }
    match (op, to_bool(left)) {
        (Operator::Or, Ok(true)) => Some(true),
        (Operator::And, Ok(false)) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::DebugListener;
    use crate::model::MemoryModel;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;
    use tapestry_ast::parse;

    fn run(source: &str, current: ValueNode) -> ValueNode {
        let model = MemoryModel::new();
        let (scopes, settings) = (Scopes::standard(), Settings::default());
        let evaluator = Evaluator::new(&model, &scopes, &settings);
        let template = parse(source).unwrap();
        let mut ctx = EvalContext::for_module(Arc::new(Module::inline("t", source)));
        evaluator.statement(template.root(), &current, &mut ctx).unwrap()
    }

    fn errors(node: &ValueNode) -> Vec<EvalError> {
        node.log.iter().filter_map(|d| d.error.clone()).collect()
    }

    #[test]
    fn unresolved_call_on_nothing_is_an_empty_evaluation() {
        let node = run("a[nothing/]b", ValueNode::absent());
        assert_eq!(node.value, Value::from("ab"));
        assert!(matches!(errors(&node)[..], [EvalError::EmptyEvaluation { .. }]));

        let node = run("a[nothing/]b", ValueNode::optional_absent());
        assert_eq!(node.value, Value::from("ab"));
        assert!(node.log.is_empty());
    }

    #[test]
    fn int_loops_keep_the_current_value() {
        let node = run("[for (2)][toUpperCase/][i/][/for]", ValueNode::text("x"));
        assert_eq!(node.value, Value::from("X0X1"));
    }

    #[test]
    fn int_loops_are_bounded() {
        let source = "[for (3)]x[/for]|[for (4)]y[/for]";
        let model = MemoryModel::new();
        let scopes = Scopes::standard();
        let settings = Settings {
            max_iterations: 3,
            ..Settings::default()
        };
        let evaluator = Evaluator::new(&model, &scopes, &settings);
        let template = parse(source).unwrap();
        let mut ctx = EvalContext::for_module(Arc::new(Module::inline("t", source)));
        let node = evaluator
            .statement(template.root(), &ValueNode::absent(), &mut ctx)
            .unwrap();
        assert_eq!(node.value, Value::from("xxx|"));
        assert!(matches!(errors(&node)[..], [EvalError::Evaluation { .. }]));
    }

    #[test]
    fn failed_condition_skips_the_whole_block() {
        let node = run("<[if (\"maybe\")]yes[else]no[/if]>", ValueNode::absent());
        assert_eq!(node.value, Value::from("<>"));
        assert!(matches!(errors(&node)[..], [EvalError::BooleanRequired { .. }]));
    }

    #[test]
    fn diagnostics_are_located() {
        let node = run("line\n  [1 / 0/]", ValueNode::absent());
        let diagnostic = &node.log[0];
        assert_eq!(diagnostic.file.as_deref(), Some("t"));
        assert_eq!(diagnostic.location.as_ref().map(|l| l.line), Some(2));
    }

    struct Lines(parking_lot::Mutex<mpsc::Sender<usize>>);

    impl DebugListener for Lines {
        fn suspended(&self, checkpoint: &Checkpoint) {
            let _ = self.0.lock().send(checkpoint.line);
        }
    }

    #[test]
    fn debugger_suspends_at_statements() {
        let source = "a\n[1/]\n[2/]";
        let model = MemoryModel::new();
        let (scopes, settings) = (Scopes::standard(), Settings::default());
        let debugger = Debugger::new();
        let (sender, lines) = mpsc::channel();
        debugger.add_listener(Arc::new(Lines(parking_lot::Mutex::new(sender))));
        debugger.add_breakpoint("t", 2);

        let output = std::thread::scope(|scope| {
            let worker = scope.spawn(|| {
                let evaluator = Evaluator::new(&model, &scopes, &settings).with_debugger(&debugger);
                let template = parse(source).unwrap();
                let mut ctx = EvalContext::for_module(Arc::new(Module::inline("t", source)));
                evaluator
                    .statement(template.root(), &ValueNode::absent(), &mut ctx)
                    .unwrap()
            });
            assert_eq!(lines.recv().unwrap(), 2);
            debugger.step_into();
            assert_eq!(lines.recv().unwrap(), 2);
            debugger.resume();
            worker.join().unwrap()
        });
        assert_eq!(output.value, Value::from("a\n1\n2"));
    }
}
