//! Model introspection, reached through the `meta` prefix:
//! `[meta::type/]`, `[meta::set("name", "x")/]`.

use super::{Invocation, Returns, ServiceCollection, ServiceError, ANY, NODE, TEXT};
use crate::scope::Rank;
use crate::value::{TypeRef, Value, ValueNode};

type Outcome = Result<Value, ServiceError>;

pub const META_PREFIX: &str = "meta";

pub fn meta_services() -> ServiceCollection {
    use Returns::Fixed;
    let node = || TypeRef::Node("*".to_string());
    ServiceCollection::new("meta", Rank::Default)
        .with_prefix(META_PREFIX)
        .add("type", NODE, &[], Fixed(TypeRef::Text), type_of)
        .add("isInstanceOf", NODE, &[TEXT], Fixed(TypeRef::Bool), is_instance_of)
        .add("children", NODE, &[], Fixed(TypeRef::list_of(node())), children)
        .add("container", NODE, &[], Fixed(node()), container)
        .add("set", NODE, &[TEXT, ANY], Returns::Any, set)
        .add("add", NODE, &[TEXT, ANY], Returns::Any, add)
        .add("remove", NODE, &[TEXT, ANY], Returns::Any, remove)
        .add("isContainment", NODE, &[TEXT], Fixed(TypeRef::Bool), is_containment)
}

fn type_of(call: &mut Invocation<'_>) -> Outcome {
    Ok(call
        .model
        .type_name(call.receiver_node()?)
        .map(Value::Text)
        .unwrap_or_default())
}

fn is_instance_of(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.model.is_instance_of(call.receiver_node()?, call.text(0)?).into())
}

fn children(call: &mut Invocation<'_>) -> Outcome {
    let children = call.model.children(call.receiver_node()?);
    Ok(Value::List(
        children.into_iter().map(|id| ValueNode::new(Value::Node(id))).collect(),
    ))
}

fn container(call: &mut Invocation<'_>) -> Outcome {
    Ok(call
        .model
        .container(call.receiver_node()?)
        .map(Value::Node)
        .unwrap_or_default())
}

fn set(call: &mut Invocation<'_>) -> Outcome {
    let node = call.receiver_node()?;
    call.model
        .set_feature_value(node, call.text(0)?, call.arg(1)?.clone())?;
    Ok(Value::Absent)
}

fn add(call: &mut Invocation<'_>) -> Outcome {
    let node = call.receiver_node()?;
    call.model.add_to_feature(node, call.text(0)?, call.arg(1)?.clone())?;
    Ok(Value::Absent)
}

fn remove(call: &mut Invocation<'_>) -> Outcome {
    let node = call.receiver_node()?;
    call.model.remove_from_feature(node, call.text(0)?, call.arg(1)?)?;
    Ok(Value::Absent)
}

fn is_containment(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.model.is_containment(call.receiver_node()?, call.text(0)?).into())
}
