//! Breakpoints and stepping at statement boundaries.
//!
//! The evaluator reports every statement it is about to run to
//! [`Debugger::at_statement`]. When a breakpoint or a pending step
//! triggers, the evaluating thread blocks there until another thread calls
//! [`Debugger::resume`], one of the `step_*` methods or
//! [`Debugger::terminate`].

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;
use tapestry_ast::Span;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugState {
    Resumed,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    None,
    /// Stop at the next statement.
    Into,
    /// Stop at the next statement not nested deeper than the current one.
    Over,
    /// Stop once the current template call has returned.
    Return,
}

/// A statement the evaluator is about to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub file: String,
    /// 1-based.
    pub line: usize,
    /// Number of running template calls.
    pub depth: usize,
    pub statement: &'static str,
    pub span: Span,
}

/// Observer of suspensions; called outside of the debugger lock.
pub trait DebugListener: Send + Sync {
    fn suspended(&self, checkpoint: &Checkpoint);

    fn resumed(&self, _checkpoint: &Checkpoint) {}
}

#[derive(Debug)]
struct DebugData {
    state: DebugState,
    step: StepMode,
    step_depth: usize,
    breakpoints: FxHashSet<(String, usize)>,
    terminated: bool,
    current: Option<Checkpoint>,
}

pub struct Debugger {
    data: Mutex<DebugData>,
    wake: Condvar,
    listeners: Mutex<Vec<Arc<dyn DebugListener>>>,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debugger").field("data", &*self.data.lock()).finish()
    }
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(DebugData {
                state: DebugState::Resumed,
                step: StepMode::None,
                step_depth: 0,
                breakpoints: FxHashSet::default(),
                terminated: false,
                current: None,
            }),
            wake: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn DebugListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn add_breakpoint(&self, file: &str, line: usize) {
        self.data.lock().breakpoints.insert((file.to_string(), line));
    }

    pub fn remove_breakpoint(&self, file: &str, line: usize) -> bool {
        self.data.lock().breakpoints.remove(&(file.to_string(), line))
    }

    pub fn clear_breakpoints(&self) {
        self.data.lock().breakpoints.clear();
    }

    pub fn state(&self) -> DebugState {
        self.data.lock().state
    }

    /// Where the evaluation is suspended.
    pub fn suspended_at(&self) -> Option<Checkpoint> {
        self.data.lock().current.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.data.lock().terminated
    }

    /// Could the next statement trigger? Lets the evaluator skip building
    /// checkpoints when nothing is armed.
    pub fn is_armed(&self) -> bool {
        let data = self.data.lock();
        !data.terminated && (data.step != StepMode::None || !data.breakpoints.is_empty())
    }

    pub fn resume(&self) {
        self.release(StepMode::None);
    }

    pub fn step_into(&self) {
        self.release(StepMode::Into);
    }

    pub fn step_over(&self) {
        self.release(StepMode::Over);
    }

    pub fn step_return(&self) {
        self.release(StepMode::Return);
    }

    /// Stop triggering for good and release a suspended evaluation.
    pub fn terminate(&self) {
        let mut data = self.data.lock();
        data.terminated = true;
        data.state = DebugState::Resumed;
        data.step = StepMode::None;
        self.wake.notify_all();
    }

    /// Set the step mode relative to the current suspension and wake the
    /// evaluating thread. Before any suspension, the step applies from
    /// the first statement.
    fn release(&self, step: StepMode) {
        let mut data = self.data.lock();
        data.step = step;
        data.step_depth = data.current.as_ref().map_or(0, |current| current.depth);
        data.state = DebugState::Resumed;
        self.wake.notify_all();
    }

    fn triggers(data: &DebugData, checkpoint: &Checkpoint) -> bool {
        match data.step {
            StepMode::Into => true,
            StepMode::Over => checkpoint.depth <= data.step_depth,
            StepMode::Return => checkpoint.depth < data.step_depth,
            StepMode::None => data
                .breakpoints
                .contains(&(checkpoint.file.clone(), checkpoint.line)),
        }
    }

    /// Block while a breakpoint or step triggers at `checkpoint`.
    pub fn at_statement(&self, checkpoint: Checkpoint) {
        {
            let mut data = self.data.lock();
            if data.terminated || !Self::triggers(&data, &checkpoint) {
                return;
            }
            data.state = DebugState::Suspended;
            data.step = StepMode::None;
            data.current = Some(checkpoint.clone());
        }
        debug!(file = %checkpoint.file, line = checkpoint.line, "suspended");
        self.notify(|listener| listener.suspended(&checkpoint));

        {
            let mut data = self.data.lock();
            while data.state == DebugState::Suspended && !data.terminated {
                self.wake.wait(&mut data);
            }
            data.current = None;
        }
        debug!(file = %checkpoint.file, line = checkpoint.line, "resumed");
        self.notify(|listener| listener.resumed(&checkpoint));
    }

    fn notify(&self, f: impl Fn(&dyn DebugListener)) {
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }
}
