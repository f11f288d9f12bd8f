//! Call chains and the call cascade.
//!
//! A call is tried against, in order:
//!
//! 1. the list-capable scopes, which see list receivers whole,
//! 2. the templates of the running script and the scripts it extends,
//! 3. every other scope, mapped over the elements of a list receiver.
//!
//! An absent receiver nobody answered for stays absent. Anything else left
//! unresolved is an error.

use std::sync::Arc;

use tapestry_ast::{Call, CallChain, CallKind, ExprKind, Expression, Literal, Operator};
use tracing::trace;

use super::{boolean, detached, Evaluator, Mode};
use crate::coerce::to_int;
use crate::context::EvalContext;
use crate::error::{preview, EvalError};
use crate::loader::Module;
use crate::scope::Scope;
use crate::value::{TypeRef, Value, ValueNode};

impl<'a> Evaluator<'a> {
    pub(super) fn chain(
        &self,
        chain: &CallChain,
        current: &ValueNode,
        ctx: &mut EvalContext,
        mode: Mode,
    ) -> Result<ValueNode, EvalError> {
        let mut value = match &chain.receiver {
            Some(receiver) => self.expression(receiver, current, ctx, mode)?,
            None => detached(current),
        };
        for call in &chain.calls {
            value = self.call(call, value, current, ctx, mode)?;
        }
        Ok(value)
    }

    /// Apply `call` to `receiver`. Arguments see `current`, the value the
    /// chain started from.
    fn call(
        &self,
        call: &Call,
        mut receiver: ValueNode,
        current: &ValueNode,
        ctx: &mut EvalContext,
        mode: Mode,
    ) -> Result<ValueNode, EvalError> {
        let mut log = std::mem::take(&mut receiver.log);
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let mut value = self.expression(arg, current, ctx, mode)?;
            log.append(&mut value.log);
            args.push(value);
        }

        let mut result = match call.kind {
            CallKind::Link => self.resolve(call, receiver, &args, ctx, mode)?,
            CallKind::LoopIndex => match ctx.loop_index() {
                Some(index) => ValueNode::new(Value::Int(index)),
                None => return Err(EvalError::evaluation("'i' used outside of a loop", call.span)),
            },
            CallKind::Argument => self.argument(call, &args, ctx)?,
            CallKind::UserCodeBegin => ValueNode::text(self.settings.user_code_begin.clone()),
            CallKind::UserCodeEnd => ValueNode::text(self.settings.user_code_end.clone()),
        };
        if let Some(filter) = &call.filter {
            result = self.filter(filter, result, ctx, mode)?;
        }
        log.append(&mut result.log);
        result.log = log;
        Ok(result)
    }

    fn argument(&self, call: &Call, args: &[ValueNode], ctx: &EvalContext) -> Result<ValueNode, EvalError> {
        let index = match args {
            [index] => to_int(&index.value).map_err(|error| EvalError::coercion(error, call.span))?,
            _ => return Err(EvalError::evaluation("'args' takes exactly one index", call.span)),
        };
        usize::try_from(index)
            .ok()
            .and_then(|n| ctx.argument(n))
            .map(detached)
            .ok_or_else(|| {
                EvalError::evaluation(format!("no argument {index} in the running template call"), call.span)
            })
    }

    /// Keep the elements of a list for which `filter` holds. A single value
    /// is kept or becomes an optional absent.
    fn filter(
        &self,
        filter: &Expression,
        mut node: ValueNode,
        ctx: &mut EvalContext,
        mode: Mode,
    ) -> Result<ValueNode, EvalError> {
        match std::mem::take(&mut node.value) {
            Value::List(items) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    let mut verdict = self.expression(filter, &item, ctx, mode)?;
                    node.absorb_log(&mut verdict);
                    if boolean(&verdict, filter.span)? {
                        kept.push(item);
                    }
                }
                Ok(node.map_value(Value::List(kept)))
            }
            Value::Absent => Ok(node),
            value => {
                let item = ValueNode::new(value);
                let mut verdict = self.expression(filter, &item, ctx, mode)?;
                node.absorb_log(&mut verdict);
                if boolean(&verdict, filter.span)? {
                    Ok(node.map_value(item.value))
                } else {
                    Ok(node.optional(true))
                }
            }
        }
    }

    // ========================================================================
    // Cascade
    // ========================================================================

    fn resolve(
        &self,
        call: &Call,
        receiver: ValueNode,
        args: &[ValueNode],
        ctx: &mut EvalContext,
        mode: Mode,
    ) -> Result<ValueNode, EvalError> {
        let usable = |scope: &&Scope| mode == Mode::Recursive || scope.is_service();

        for scope in self.scopes.iter().filter(|scope| scope.is_list_capable()).filter(usable) {
            if let Some(found) = self.in_scope(scope, call, &receiver, args, ctx)? {
                trace!(call = %call.qualified_name(), scope = scope.name(), "resolved");
                return Ok(found);
            }
        }
        if mode == Mode::Recursive {
            if let Some(found) = self.template_call(call, &receiver, args, ctx)? {
                trace!(call = %call.qualified_name(), scope = "templates", "resolved");
                return Ok(found);
            }
        }
        for scope in self.scopes.iter().filter(|scope| !scope.is_list_capable()).filter(usable) {
            if let Some(found) = self.mapped(scope, call, &receiver, args, ctx)? {
                trace!(call = %call.qualified_name(), scope = scope.name(), "resolved");
                return Ok(found);
            }
        }

        if receiver.is_absent() {
            return Ok(ValueNode::absent().optional(receiver.optional));
        }
        Err(EvalError::Resolution {
            call: call.qualified_name(),
            value_type: self.describe(&receiver.value),
            span: call.span,
        })
    }

    fn describe(&self, value: &Value) -> String {
        match value {
            Value::Node(id) => self
                .model
                .type_name(*id)
                .unwrap_or_else(|| value.type_name().to_string()),
            other => other.type_name().to_string(),
        }
    }

    /// Resolve against a scope that only takes single values: a list
    /// receiver is resolved element by element, and only counts as found
    /// when every element is. Elements the scope cannot answer for are not
    /// dropped, so `children.kind` over mixed types is a resolution error;
    /// filter the list first (`children[meta::isInstanceOf("Attribute")]`).
    fn mapped(
        &self,
        scope: &Scope,
        call: &Call,
        receiver: &ValueNode,
        args: &[ValueNode],
        ctx: &mut EvalContext,
    ) -> Result<Option<ValueNode>, EvalError> {
        let Value::List(items) = &receiver.value else {
            return self.in_scope(scope, call, receiver, args, ctx);
        };
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match self.in_scope(scope, call, item, args, ctx)? {
                Some(result) => results.push(result),
                None => return Ok(None),
            }
        }
        Ok(Some(flatten(results)))
    }

    fn in_scope(
        &self,
        scope: &Scope,
        call: &Call,
        receiver: &ValueNode,
        args: &[ValueNode],
        ctx: &mut EvalContext,
    ) -> Result<Option<ValueNode>, EvalError> {
        match scope {
            Scope::Services(services) => {
                if !services.accepts_prefix(call.prefix.as_deref()) {
                    return Ok(None);
                }
                let outcome = services.invoke(&call.name, receiver, args, self.model, self.settings, ctx);
                match outcome {
                    None => Ok(None),
                    Some(Ok(Value::Absent)) => Ok(Some(ValueNode::optional_absent())),
                    Some(Ok(value)) => Ok(Some(ValueNode::new(value))),
                    Some(Err(error)) => Err(EvalError::Evaluation {
                        message: format!("{}: {error}", call.qualified_name()),
                        span: call.span,
                        scope: Some(services.name().to_string()),
                        value_type: Some(receiver.type_name().to_string()),
                        value: Some(preview(&receiver.value.render(self.model))),
                        blocking: false,
                    }),
                }
            }
            Scope::Features => {
                if call.prefix.is_some() || call.parenthesized || !args.is_empty() {
                    return Ok(None);
                }
                let Value::Node(id) = receiver.value else {
                    return Ok(None);
                };
                Ok(self.model.feature_value(id, &call.name).map(|value| match value {
                    Value::Absent => ValueNode::optional_absent(),
                    value => ValueNode::new(value),
                }))
            }
            Scope::Imports => {
                let Some(module) = ctx.module().cloned() else {
                    return Ok(None);
                };
                let imports: Vec<Arc<Module>> = module
                    .lineage()
                    .flat_map(|module| module.imports.iter().cloned())
                    .collect();
                self.template_for(&imports, call, receiver, args, ctx)
            }
        }
    }

    /// Templates of the running script. A list receiver is found when any
    /// of its elements is, or when it is empty.
    fn template_call(
        &self,
        call: &Call,
        receiver: &ValueNode,
        args: &[ValueNode],
        ctx: &mut EvalContext,
    ) -> Result<Option<ValueNode>, EvalError> {
        let Some(module) = ctx.module().cloned() else {
            return Ok(None);
        };
        let modules = std::slice::from_ref(&module);
        let Value::List(items) = &receiver.value else {
            return self.template_for(modules, call, receiver, args, ctx);
        };
        let mut results = Vec::with_capacity(items.len());
        let mut matched = items.is_empty();
        for item in items {
            if let Some(result) = self.template_for(modules, call, item, args, ctx)? {
                matched = true;
                results.push(result);
            }
        }
        Ok(matched.then(|| flatten(results)))
    }

    /// Run the first template of `modules` (or the scripts they extend)
    /// accepting `receiver`.
    fn template_for(
        &self,
        modules: &[Arc<Module>],
        call: &Call,
        receiver: &ValueNode,
        args: &[ValueNode],
        ctx: &mut EvalContext,
    ) -> Result<Option<ValueNode>, EvalError> {
        if receiver.is_absent() {
            return Ok(None);
        }
        let found = modules.iter().find_map(|module| {
            module.find_template(call.prefix.as_deref(), &call.name, &receiver.value, self.model)
        });
        let Some((module, template)) = found else {
            return Ok(None);
        };
        self.invoke_template(
            Arc::clone(module),
            template,
            receiver.clone(),
            args.to_vec(),
            call.span,
            ctx,
        )
        .map(Some)
    }

    // ========================================================================
    // Static types
    // ========================================================================

    /// Type of `expression` evaluated against a value of type `current`,
    /// without evaluating anything. `None` when some call cannot be typed.
    pub fn expression_type(
        &self,
        expression: &Expression,
        current: &TypeRef,
        module: Option<&Arc<Module>>,
    ) -> Option<TypeRef> {
        match &expression.kind {
            ExprKind::Literal(literal) => Some(match literal {
                Literal::Null => TypeRef::Any,
                Literal::Bool(_) => TypeRef::Bool,
                Literal::Int(_) => TypeRef::Int,
                Literal::Real(_) => TypeRef::Real,
                Literal::Text(_) => TypeRef::Text,
            }),
            ExprKind::Not(_) => Some(TypeRef::Bool),
            ExprKind::Parenthesis(inner) => self.expression_type(inner, current, module),
            ExprKind::Operator { op, operands } => {
                let types = operands
                    .iter()
                    .map(|operand| self.expression_type(operand, current, module))
                    .collect::<Option<Vec<_>>>()?;
                Some(operator_type(*op, &types))
            }
            ExprKind::Chain(chain) => {
                let mut ty = match &chain.receiver {
                    Some(receiver) => self.expression_type(receiver, current, module)?,
                    None => current.clone(),
                };
                for call in &chain.calls {
                    ty = self.next_type(&ty, call, module)?;
                }
                Some(ty)
            }
        }
    }

    /// Type of the result of `call` on a value of type `current`, following
    /// the cascade order one call deep.
    pub fn next_type(&self, current: &TypeRef, call: &Call, module: Option<&Arc<Module>>) -> Option<TypeRef> {
        match call.kind {
            CallKind::LoopIndex => return Some(TypeRef::Int),
            CallKind::Argument => return Some(TypeRef::Any),
            CallKind::UserCodeBegin | CallKind::UserCodeEnd => return Some(TypeRef::Text),
            CallKind::Link => {}
        }
        let arity = call.args.len();
        let prefix = call.prefix.as_deref();

        let capable = self.scopes.iter().filter(|scope| scope.is_list_capable());
        for scope in capable {
            if let Scope::Services(services) = scope {
                if services.accepts_prefix(prefix) {
                    if let Some(ty) = services.next_type(current, &call.name, arity) {
                        return Some(ty);
                    }
                }
            }
        }

        let element = current.element().unwrap_or(current);
        let wrap = |ty: TypeRef| match current {
            TypeRef::List(_) => flatten_type(ty),
            _ => ty,
        };
        if let Some(module) = module {
            if has_template(std::slice::from_ref(module), prefix, &call.name, element) {
                return Some(wrap(TypeRef::Text));
            }
        }
        for scope in self.scopes.iter().filter(|scope| !scope.is_list_capable()) {
            let ty = match scope {
                Scope::Services(services) if services.accepts_prefix(prefix) => {
                    services.next_type(element, &call.name, arity)
                }
                Scope::Services(_) => None,
                Scope::Features => match element {
                    TypeRef::Node(type_name) if prefix.is_none() && arity == 0 && !call.parenthesized => {
                        self.model.feature_type(type_name, &call.name)
                    }
                    _ => None,
                },
                Scope::Imports => module.and_then(|module| {
                    let imports: Vec<Arc<Module>> = module
                        .lineage()
                        .flat_map(|module| module.imports.iter().cloned())
                        .collect();
                    has_template(&imports, prefix, &call.name, element).then_some(TypeRef::Text)
                }),
            };
            if let Some(ty) = ty {
                return Some(wrap(ty));
            }
        }
        None
    }
}

/// Element results as one list, list results contributing their elements.
fn flatten(results: Vec<ValueNode>) -> ValueNode {
    let mut log = Vec::new();
    let mut items = Vec::with_capacity(results.len());
    for mut result in results {
        log.append(&mut result.log);
        items.extend(result.into_elements());
    }
    let mut list = ValueNode::list(items);
    list.log = log;
    list
}

fn flatten_type(ty: TypeRef) -> TypeRef {
    match ty {
        TypeRef::List(_) => ty,
        other => TypeRef::list_of(other),
    }
}

fn has_template(modules: &[Arc<Module>], prefix: Option<&str>, name: &str, receiver: &TypeRef) -> bool {
    modules
        .iter()
        .flat_map(|module| module.lineage())
        .filter(|module| module.answers_to(prefix))
        .flat_map(|module| module.script.templates_named(name))
        .any(|template| match receiver {
            TypeRef::Node(type_name) => template.accepts_any() || template.type_name == *type_name,
            _ => template.accepts_any(),
        })
}

fn operator_type(op: Operator, operands: &[TypeRef]) -> TypeRef {
    let any_list = operands.iter().any(|ty| matches!(ty, TypeRef::List(_)));
    match op {
        Operator::Eq | Operator::NotEq | Operator::Gt | Operator::GtEq | Operator::Lt | Operator::LtEq => {
            TypeRef::Bool
        }
        Operator::Or | Operator::And | Operator::Add | Operator::Sub if any_list => TypeRef::list_of(TypeRef::Any),
        Operator::Or | Operator::And => TypeRef::Bool,
        Operator::Add if operands.contains(&TypeRef::Text) => TypeRef::Text,
        Operator::Sub if operands.first() == Some(&TypeRef::Text) => TypeRef::Text,
        _ if operands.iter().all(|ty| *ty == TypeRef::Int) => TypeRef::Int,
        _ if operands.iter().all(|ty| matches!(ty, TypeRef::Int | TypeRef::Real)) => TypeRef::Real,
        _ => TypeRef::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryModel, Model};
    use crate::scope::{Rank, Scopes};
    use crate::services::{ServiceCollection, Returns, ANY};
    use crate::settings::Settings;
    use pretty_assertions::assert_eq;
    use tapestry_ast::{parse_expression, parse_script, Span};

    const PEOPLE: &str = r#"{
        "types": { "Person": { "features": { "name": "text", "nick": "text" } } },
        "roots": [ { "type": "Person", "name": "Ada" } ]
    }"#;

    fn shout(invocation: &mut crate::services::Invocation<'_>) -> Result<Value, crate::services::ServiceError> {
        Ok(Value::from(format!("{}!", invocation.receiver.value.render(invocation.model))))
    }

    fn bracket(invocation: &mut crate::services::Invocation<'_>) -> Result<Value, crate::services::ServiceError> {
        Ok(Value::from(format!("[{}]", invocation.receiver.value.render(invocation.model))))
    }

    fn module(source: &str) -> Arc<Module> {
        let script = parse_script("main", source).unwrap();
        Arc::new(Module::new("main", "main.tpl", script, None, vec![]))
    }

    fn eval_in(
        scopes: &Scopes,
        model: &MemoryModel,
        module: Arc<Module>,
        expression: &str,
        current: Value,
    ) -> Result<ValueNode, EvalError> {
        let settings = Settings::default();
        let evaluator = Evaluator::new(model, scopes, &settings);
        let expression = parse_expression(expression, Span::of(expression)).unwrap();
        let mut ctx = EvalContext::for_module(module);
        evaluator.expression(&expression, &ValueNode::new(current), &mut ctx, Mode::Recursive)
    }

    fn eval(expression: &str, current: Value) -> Result<ValueNode, EvalError> {
        let model = MemoryModel::new();
        eval_in(&Scopes::standard(), &model, module(""), expression, current)
    }

    #[test]
    fn features_resolve_on_nodes() {
        let model = MemoryModel::from_json_str(PEOPLE).unwrap();
        let root = model.roots()[0];
        let scopes = Scopes::standard();
        let name = eval_in(&scopes, &model, module(""), "name.toUpperCase", Value::Node(root)).unwrap();
        assert_eq!(name.value, Value::from("ADA"));
        let nick = eval_in(&scopes, &model, module(""), "nick", Value::Node(root)).unwrap();
        assert!(nick.is_absent() && nick.optional);
        let missing = eval_in(&scopes, &model, module(""), "age", Value::Node(root)).unwrap_err();
        assert_eq!(missing.to_string(), "cannot resolve 'age' on Person");
    }

    #[test]
    fn text_services_map_over_lists() {
        let list = Value::List(vec![ValueNode::text("a"), ValueNode::text("b")]);
        let upper = eval("toUpperCase", list.clone()).unwrap();
        assert_eq!(upper.value, Value::List(vec![ValueNode::text("A"), ValueNode::text("B")]));
        assert_eq!(eval("size", list).unwrap().value, Value::Int(2));
    }

    #[test]
    fn filters() {
        let list = Value::List(vec![ValueNode::text("ab"), ValueNode::text("c"), ValueNode::text("ad")]);
        let kept = eval("toString[startsWith(\"a\")]", list).unwrap();
        assert_eq!(kept.value, Value::List(vec![ValueNode::text("ab"), ValueNode::text("ad")]));
        let dropped = eval("toString[length > 5]", Value::from("abc")).unwrap();
        assert!(dropped.is_absent() && dropped.optional);
        assert!(matches!(
            eval("toString[length]", Value::from("abc")),
            Err(EvalError::BooleanRequired { .. })
        ));
    }

    #[test]
    fn templates_win_over_later_scopes_every_time() {
        let model = MemoryModel::new();
        let node = model.create_root("Entity");
        let mut scopes = Scopes::standard();
        scopes.push(Scope::Services(
            ServiceCollection::new("extra", Rank::Default).add("label", ANY, &[], Returns::Any, shout),
        ));
        let main = module("[template label(Entity)]from template[/template]");
        for _ in 0..3 {
            let node_result = eval_in(&scopes, &model, Arc::clone(&main), "label", Value::Node(node)).unwrap();
            assert_eq!(node_result.value, Value::from("from template"));
            let text_result = eval_in(&scopes, &model, Arc::clone(&main), "label", Value::from("x")).unwrap();
            assert_eq!(text_result.value, Value::from("x!"));
        }
    }

    #[test]
    fn earlier_scopes_win_service_clashes() {
        let model = MemoryModel::new();
        let mut scopes = Scopes::standard();
        scopes.push(Scope::Services(
            ServiceCollection::new("first", Rank::Default).add("label", ANY, &[], Returns::Any, bracket),
        ));
        scopes.push(Scope::Services(
            ServiceCollection::new("second", Rank::Default).add("label", ANY, &[], Returns::Any, shout),
        ));
        scopes.push(Scope::Services(
            ServiceCollection::new("override", Rank::Specific).add("trim", ANY, &[], Returns::Any, bracket),
        ));
        for _ in 0..3 {
            let trimmed = eval_in(&scopes, &model, module(""), "trim", Value::from(" a ")).unwrap();
            assert_eq!(trimmed.value, Value::from("[ a ]"));
            let label = eval_in(&scopes, &model, module(""), "label", Value::from("x")).unwrap();
            assert_eq!(label.value, Value::from("[x]"));
        }
    }

    #[test]
    fn features_over_mixed_lists_need_a_filter() {
        let model = MemoryModel::from_json_str(
            r#"{ "type": "Entity", "parts": [ { "type": "Attribute", "kind": "k" }, { "type": "Entity" } ] }"#,
        )
        .unwrap();
        let root = Value::Node(model.roots()[0]);
        let scopes = Scopes::standard();
        let strict = eval_in(&scopes, &model, module(""), "parts.kind", root.clone());
        assert!(matches!(strict, Err(EvalError::Resolution { .. })), "{strict:?}");
        let filtered = eval_in(
            &scopes,
            &model,
            module(""),
            "parts[meta::isInstanceOf(\"Attribute\")].kind",
            root,
        )
        .unwrap();
        assert_eq!(filtered.value, Value::List(vec![ValueNode::text("k")]));
    }

    #[test]
    fn service_errors_carry_the_receiver() {
        match eval("charAt(9)", Value::from("abc")) {
            Err(EvalError::Evaluation {
                scope, value_type, value, ..
            }) => {
                assert_eq!(scope.as_deref(), Some("text"));
                assert_eq!(value_type.as_deref(), Some("text"));
                assert_eq!(value.as_deref(), Some("abc"));
            }
            other => panic!("expected an evaluation error, got {other:?}"),
        }
        let long = "x".repeat(60);
        match eval("charAt(99)", Value::from(long.as_str())) {
            Err(error @ EvalError::Evaluation { .. }) => {
                assert!(error.to_string().ends_with(&format!("(evaluated on \"{}...\")", "x".repeat(40))))
            }
            other => panic!("expected an evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn template_lists_are_flattened() {
        let model = MemoryModel::new();
        let a = model.create_root("Entity");
        let b = model.create_root("Entity");
        let main = module("[template twice(Entity)][for (2)]x[/for][/template]");
        let items = Value::List(vec![ValueNode::new(Value::Node(a)), ValueNode::new(Value::Node(b))]);
        let result = eval_in(&Scopes::standard(), &model, main.clone(), "twice", items).unwrap();
        assert_eq!(result.value, Value::List(vec![ValueNode::text("xx"), ValueNode::text("xx")]));
        let empty = eval_in(&Scopes::standard(), &model, main, "twice", Value::List(vec![])).unwrap();
        assert_eq!(empty.value, Value::List(vec![]));
    }

    #[test]
    fn unresolved_calls() {
        assert!(matches!(eval("nothing", Value::Int(1)), Err(EvalError::Resolution { .. })));
        let absent = eval("nothing", Value::Absent).unwrap();
        assert!(absent.is_absent() && !absent.optional);
        assert!(eval("(null).nothing", Value::Int(1)).unwrap().optional);
    }

    #[test]
    fn pseudo_calls() {
        let settings = Settings::default();
        assert_eq!(eval("startUserCode", Value::Absent).unwrap().value, Value::from(settings.user_code_begin));
        assert!(eval("i", Value::Absent).is_err());
        assert!(eval("args(0)", Value::Absent).is_err());
    }

    #[test]
    fn static_types() {
        let model = MemoryModel::from_json_str(PEOPLE).unwrap();
        let settings = Settings::default();
        let scopes = Scopes::standard();
        let evaluator = Evaluator::new(&model, &scopes, &settings);
        let main = module("[template card(Person)]x[/template]");
        let person = TypeRef::Node("Person".to_string());
        let type_of = |source: &str| {
            let expression = parse_expression(source, Span::of(source)).unwrap();
            evaluator.expression_type(&expression, &person, Some(&main))
        };
        assert_eq!(type_of("name.length"), Some(TypeRef::Int));
        assert_eq!(type_of("card"), Some(TypeRef::Text));
        assert_eq!(type_of("name + 1"), Some(TypeRef::Text));
        assert_eq!(type_of("1 < 2"), Some(TypeRef::Bool));
        assert_eq!(type_of("unknown"), None);

        let upper = parse_expression("toUpperCase", Span::of("toUpperCase")).unwrap();
        let ExprKind::Chain(chain) = &upper.kind else {
            panic!("expected a chain");
        };
        let texts = TypeRef::list_of(TypeRef::Text);
        assert_eq!(evaluator.next_type(&texts, &chain.calls[0], None), Some(texts.clone()));
    }
}
