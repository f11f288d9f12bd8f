//! Services reading the evaluation context rather than their receiver.

use super::{Invocation, Returns, ServiceCollection, ServiceError, ANY, ANYTHING, INT};
use crate::scope::Rank;
use crate::value::{TypeRef, Value};

type Outcome = Result<Value, ServiceError>;

/// List-capable: a list receiver is ignored, not mapped over.
pub fn context_services() -> ServiceCollection {
    ServiceCollection::new("context", Rank::Default)
        .list_capable()
        .add("current", ANYTHING, &[], Returns::Any, current)
        .add("current", ANYTHING, &[INT], Returns::Any, current_at)
        .add("push", ANYTHING, &[ANY], Returns::Any, push)
        .add("peek", ANYTHING, &[], Returns::Any, peek)
        .add("pop", ANYTHING, &[], Returns::Any, pop)
        .add("nl", ANYTHING, &[], Returns::Fixed(TypeRef::Text), nl)
}

fn current(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.context.current(0).map(|node| node.value.clone()).unwrap_or_default())
}

/// `current(0)` is the innermost loop item or template receiver,
/// `current(1)` the one around it.
fn current_at(call: &mut Invocation<'_>) -> Outcome {
    let n = call.int(0)?;
    let depth = usize::try_from(n).map_err(|_| ServiceError::failed(format!("negative depth {n}")))?;
    Ok(call
        .context
        .current(depth)
        .map(|node| node.value.clone())
        .unwrap_or_default())
}

fn push(call: &mut Invocation<'_>) -> Outcome {
    let value = call.arg_node(0)?.clone();
    call.context.push(value);
    Ok(Value::Absent)
}

fn peek(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.context.peek().map(|node| node.value.clone()).unwrap_or_default())
}

fn pop(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.context.pop().map(|node| node.value).unwrap_or_default())
}

fn nl(call: &mut Invocation<'_>) -> Outcome {
    Ok(Value::Text(call.settings.line_separator.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalContext;
    use crate::model::MemoryModel;
    use crate::settings::Settings;
    use crate::value::ValueNode;
    use pretty_assertions::assert_eq;

    fn run(context: &mut EvalContext, name: &str, args: &[Value]) -> Option<Result<Value, ServiceError>> {
        let model = MemoryModel::new();
        let settings = Settings {
            line_separator: "\r\n".to_string(),
            ..Settings::default()
        };
        let args: Vec<ValueNode> = args.iter().cloned().map(ValueNode::new).collect();
        context_services().invoke(name, &ValueNode::absent(), &args, &model, &settings, context)
    }

    #[test]
    fn user_stack_round_trip() {
        let mut context = EvalContext::new();
        assert_eq!(run(&mut context, "push", &[Value::from("a")]), Some(Ok(Value::Absent)));
        assert_eq!(run(&mut context, "push", &[Value::from("b")]), Some(Ok(Value::Absent)));
        assert_eq!(run(&mut context, "peek", &[]), Some(Ok(Value::from("b"))));
        assert_eq!(run(&mut context, "pop", &[]), Some(Ok(Value::from("b"))));
        assert_eq!(run(&mut context, "pop", &[]), Some(Ok(Value::from("a"))));
        assert_eq!(run(&mut context, "pop", &[]), Some(Ok(Value::Absent)));
    }

    #[test]
    fn current_values() {
        let mut context = EvalContext::new();
        let seen = context.with_iteration(0, ValueNode::text("outer"), |context| {
            context.with_iteration(0, ValueNode::text("inner"), |context| {
                (
                    run(context, "current", &[]),
                    run(context, "current", &[Value::Int(1)]),
                    run(context, "current", &[Value::Int(2)]),
                )
            })
        });
        assert_eq!(
            seen,
            (
                Some(Ok(Value::from("inner"))),
                Some(Ok(Value::from("outer"))),
                Some(Ok(Value::Absent)),
            )
        );
    }

    #[test]
    fn new_line_follows_settings() {
        let mut context = EvalContext::new();
        assert_eq!(run(&mut context, "nl", &[]), Some(Ok(Value::from("\r\n"))));
    }
}
