//! Tapestry - a model-to-text template engine
//!
//! Tapestry turns a model (a typed object graph) into text:
//! - Templates mix literal text with `[expression/]`, `[for]` and `[if]` blocks
//! - Calls resolve through an ordered cascade of services, model features
//!   and templates
//! - Scripts group templates, extend and import each other, and declare the
//!   files to generate, with hand-edited user code preserved on regeneration
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//!
//! let result = tapestry::render(
//!     "Hello, [name.toUpperCase/]!",
//!     json!({"type": "Person", "name": "World"}),
//! ).unwrap();
//!
//! assert_eq!(result, "Hello, WORLD!");
//! ```

// Public modules
pub mod coerce;
pub mod context;
pub mod debug;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod loader;
pub mod merge;
pub mod model;
pub mod resource;
pub mod scope;
pub mod services;
pub mod settings;
pub mod value;

pub use context::EvalContext;
pub use debug::{Checkpoint, DebugListener, DebugState, Debugger, StepMode};
pub use error::{CoercionError, EvalError, Result, TapestryError};
pub use evaluator::{Evaluator, Mode};
pub use generator::{GeneratedFile, GenerationReport, Generator};
pub use loader::{Module, ScriptLoader};
pub use merge::{Merge, Merged, OverwriteMerge, UserCodeMerge};
pub use model::{MemoryModel, Model, ModelError, ObjectId};
pub use resource::{FsResources, MemoryResources, Resources};
pub use scope::{Rank, Scope, Scopes};
pub use services::ServiceCollection;
pub use settings::Settings;
pub use tapestry_ast::{Location, ParseError, Span, Template};
pub use value::{Diagnostic, Provenance, Severity, TypeRef, Value, ValueNode};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::debug;

/// Name diagnostics use for sources rendered with [`Tapestry::render`].
pub const INLINE: &str = "<inline>";

/// Text produced by a request, with what went wrong along the way and
/// which source span produced each part of the text.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
    pub provenance: Vec<Provenance>,
}

impl Output {
    fn from_node(node: ValueNode, model: &dyn Model) -> Self {
        Self {
            text: node.value.render(model),
            diagnostics: node.log,
            provenance: node.provenance,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// The text, or the first error recorded while producing it.
    pub fn into_result(self) -> Result<String> {
        let error = self
            .diagnostics
            .into_iter()
            .find(Diagnostic::is_error)
            .and_then(|diagnostic| diagnostic.error);
        match error {
            Some(error) => Err(error.into()),
            None => Ok(self.text),
        }
    }
}

/// A generation session: settings, scopes, scripts loaded so far and the
/// collaborators used to read and write files.
pub struct Tapestry {
    settings: Settings,
    scopes: Scopes,
    resources: Arc<dyn Resources>,
    merge: Arc<dyn Merge>,
    loader: ScriptLoader,
    debugger: Option<Arc<Debugger>>,
    cancel: Arc<AtomicBool>,
}

impl Default for Tapestry {
    fn default() -> Self {
        Self::new(Arc::new(MemoryResources::new()))
    }
}

impl Tapestry {
    /// Session reading scripts from and writing files to `resources`.
    pub fn new(resources: Arc<dyn Resources>) -> Self {
        let settings = Settings::default();
        Self {
            loader: ScriptLoader::new(Arc::clone(&resources), &settings),
            settings,
            scopes: Scopes::standard(),
            resources,
            merge: Arc::new(UserCodeMerge),
            debugger: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the settings. Scripts loaded so far are forgotten.
    pub fn with_settings(mut self, settings: Settings) -> Result<Self> {
        settings.validate()?;
        self.loader = ScriptLoader::new(Arc::clone(&self.resources), &settings);
        self.settings = settings;
        Ok(self)
    }

    pub fn with_merge(mut self, merge: Arc<dyn Merge>) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_debugger(mut self, debugger: Arc<Debugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    /// Register an additional service collection, after the existing
    /// scopes of the same rank.
    pub fn with_services(mut self, services: ServiceCollection) -> Self {
        self.scopes.push(Scope::Services(services));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Setting this flag stops running requests at their next statement.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn evaluator<'a>(&'a self, model: &'a dyn Model) -> Evaluator<'a> {
        let evaluator = Evaluator::new(model, &self.scopes, &self.settings).with_cancel_flag(&self.cancel);
        match &self.debugger {
            Some(debugger) => evaluator.with_debugger(debugger),
            None => evaluator,
        }
    }

    /// Load the script at `path` with the scripts it imports and extends.
    pub fn load(&mut self, path: &str) -> Result<Arc<Module>> {
        self.loader.load(path)
    }

    /// Evaluate a standalone template against `current`.
    pub fn render(&self, source: &str, model: &dyn Model, current: Value) -> Result<Output> {
        let template = tapestry_ast::parse(source).map_err(|source| TapestryError::Parse {
            script: INLINE.to_string(),
            source,
        })?;
        let module = Arc::new(Module::inline(INLINE, source));
        let mut ctx = EvalContext::for_module(module);
        debug!(len = source.len(), "rendering template");
        let node = self
            .evaluator(model)
            .statement(template.root(), &ValueNode::new(current), &mut ctx)?;
        Ok(Output::from_node(node, model))
    }

    /// Call the template `name` of `module` for `receiver`.
    pub fn call(
        &self,
        module: &Arc<Module>,
        name: &str,
        model: &dyn Model,
        receiver: Value,
        args: Vec<Value>,
    ) -> Result<Output> {
        let Some((owner, template)) = module.find_template(None, name, &receiver, model) else {
            return Err(EvalError::Resolution {
                call: name.to_string(),
                value_type: receiver.type_name().to_string(),
                span: Span::NOT_FOUND,
            }
            .into());
        };
        debug!(template = name, module = %owner.name, "calling template");
        let mut ctx = EvalContext::for_module(Arc::clone(module));
        let node = self.evaluator(model).invoke_template(
            Arc::clone(owner),
            template,
            ValueNode::new(receiver),
            args.into_iter().map(ValueNode::new).collect(),
            template.span,
            &mut ctx,
        )?;
        Ok(Output::from_node(node, model))
    }

    /// Write the files declared by the `file(...)` templates of `module`.
    pub fn generate(&self, module: &Arc<Module>, model: &dyn Model) -> Result<GenerationReport> {
        let evaluator = self.evaluator(model);
        Generator::new(&evaluator, self.resources.as_ref(), self.merge.as_ref(), &self.settings)
            .with_cancel_flag(&self.cancel)
            .generate(module)
    }

    /// Static type of `expression` evaluated against a value of type
    /// `current` inside `module`. `Ok(None)` when some call cannot be typed.
    pub fn type_of(
        &self,
        expression: &str,
        current: &TypeRef,
        model: &dyn Model,
        module: Option<&Arc<Module>>,
    ) -> Result<Option<TypeRef>> {
        let expression = tapestry_ast::parse_expression(expression, Span::of(expression)).map_err(|source| {
            TapestryError::Parse {
                script: INLINE.to_string(),
                source,
            }
        })?;
        Ok(self.evaluator(model).expression_type(&expression, current, module))
    }
}

/// Convenience function: render `source` against the first root of a JSON
/// model document. Fails on the first evaluation error.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
///
/// let result = tapestry::render(
///     "[for (items)][i/]:[current/] [/for]",
///     json!({"type": "List", "items": ["a", "b"]}),
/// ).unwrap();
///
/// assert_eq!(result, "0:a 1:b ");
/// ```
pub fn render(source: &str, model: serde_json::Value) -> Result<String> {
    let model = MemoryModel::from_json(&model)?;
    let root = model.roots().first().copied().map_or(Value::Absent, Value::Node);
    Tapestry::default().render(source, &model, root)?.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_reuse() {
        let tapestry = Tapestry::default();
        let model = MemoryModel::from_json(&json!([
            {"type": "Person", "name": "Alice"},
            {"type": "Person", "name": "Bob"}
        ]))
        .unwrap();
        let roots = model.roots();

        let first = tapestry.render("Hello, [name/]!", &model, Value::Node(roots[0])).unwrap();
        assert_eq!(first.text, "Hello, Alice!");

        let second = tapestry.render("Hello, [name/]!", &model, Value::Node(roots[1])).unwrap();
        assert_eq!(second.text, "Hello, Bob!");
    }

    #[test]
    fn test_errors_are_recorded_and_evaluation_continues() {
        let tapestry = Tapestry::default();
        let model = MemoryModel::new();
        let output = tapestry
            .render("a\n[1 / 0/]b", &model, Value::Absent)
            .unwrap();
        assert_eq!(output.text, "a\nb");
        assert_eq!(output.diagnostics.len(), 1);
        let message = output.diagnostics[0].to_string();
        assert!(message.starts_with("<inline>:2:"), "{message}");
        assert!(message.ends_with("error: division by zero"), "{message}");
        assert!(output.into_result().is_err());
    }

    #[test]
    fn test_canceled_render() {
        let tapestry = Tapestry::default();
        tapestry.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);
        let result = tapestry.render("text", &MemoryModel::new(), Value::Absent);
        assert!(matches!(result, Err(TapestryError::Eval(EvalError::Canceled))));
    }
}
