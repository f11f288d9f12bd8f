//! Per-request evaluation state.
//!
//! Every push is paired with its pop by running the nested evaluation in a
//! closure, so the stacks are balanced on success and error paths alike.

use std::sync::Arc;

use crate::loader::Module;
use crate::value::ValueNode;

/// Call frame of a running template.
#[derive(Debug, Clone)]
struct Frame {
    module: Arc<Module>,
    arguments: Vec<ValueNode>,
}

/// Mutable state of one evaluation request. Not shared between threads.
#[derive(Debug, Default)]
pub struct EvalContext {
    loop_indices: Vec<i64>,
    frames: Vec<Frame>,
    /// Receivers of running templates and items of running loops.
    currents: Vec<ValueNode>,
    /// Values managed by the `push`/`peek`/`pop` services.
    user_stack: Vec<ValueNode>,
    /// Module of a request that did not start from a template call.
    root_module: Option<Arc<Module>>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose calls resolve against `module` outside of any
    /// template frame.
    pub fn for_module(module: Arc<Module>) -> Self {
        Self {
            root_module: Some(module),
            ..Self::default()
        }
    }

    /// Run `f` inside one loop iteration over `item`.
    pub fn with_iteration<R>(&mut self, index: i64, item: ValueNode, f: impl FnOnce(&mut Self) -> R) -> R {
        self.loop_indices.push(index);
        self.currents.push(item);
        let result = f(self);
        self.currents.pop();
        self.loop_indices.pop();
        result
    }

    /// Run `f` inside a call of a template of `module`. Loop indices of the
    /// caller are hidden from the callee.
    pub fn with_frame<R>(
        &mut self,
        module: Arc<Module>,
        receiver: ValueNode,
        arguments: Vec<ValueNode>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let hidden = std::mem::take(&mut self.loop_indices);
        self.frames.push(Frame { module, arguments });
        self.currents.push(receiver);
        let result = f(self);
        self.currents.pop();
        self.frames.pop();
        self.loop_indices = hidden;
        result
    }

    /// Index of the innermost running loop.
    pub fn loop_index(&self) -> Option<i64> {
        self.loop_indices.last().copied()
    }

    /// `n`-th argument of the running template.
    pub fn argument(&self, n: usize) -> Option<&ValueNode> {
        self.frames.last().and_then(|frame| frame.arguments.get(n))
    }

    /// Module of the running template.
    pub fn module(&self) -> Option<&Arc<Module>> {
        self.frames
            .last()
            .map(|frame| &frame.module)
            .or(self.root_module.as_ref())
    }

    /// Number of running template calls.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// `n` levels out from the innermost loop item or template receiver.
    pub fn current(&self, n: usize) -> Option<&ValueNode> {
        self.currents.iter().rev().nth(n)
    }

    pub fn push(&mut self, value: ValueNode) {
        self.user_stack.push(value);
    }

    pub fn peek(&self) -> Option<&ValueNode> {
        self.user_stack.last()
    }

    pub fn pop(&mut self) -> Option<ValueNode> {
        self.user_stack.pop()
    }
}
