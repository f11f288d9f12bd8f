//! List services. They receive lists whole.

use super::{Invocation, Returns, ServiceCollection, ServiceError, ANY, INT, LIST};
use crate::scope::Rank;
use crate::value::{TypeRef, Value, ValueNode};

type Outcome = Result<Value, ServiceError>;

pub fn list_services() -> ServiceCollection {
    use Returns::{Element, Fixed, Receiver};
    ServiceCollection::new("list", Rank::Specific)
        .list_capable()
        .add("size", LIST, &[], Fixed(TypeRef::Int), size)
        .add("isEmpty", LIST, &[], Fixed(TypeRef::Bool), is_empty)
        .add("first", LIST, &[], Element, first)
        .add("last", LIST, &[], Element, last)
        .add("reverse", LIST, &[], Receiver, reverse)
        .add("sort", LIST, &[], Receiver, sort)
        .add("distinct", LIST, &[], Receiver, distinct)
        .add("nFirst", LIST, &[INT], Receiver, n_first)
        .add("nLast", LIST, &[INT], Receiver, n_last)
        .add("get", LIST, &[INT], Element, get)
        .add("sep", LIST, &[ANY], Fixed(TypeRef::list_of(TypeRef::Any)), sep)
        .add("sep", LIST, &[ANY, ANY, ANY], Fixed(TypeRef::list_of(TypeRef::Any)), sep_around)
}

fn items(call: &Invocation<'_>) -> Result<Vec<ValueNode>, ServiceError> {
    call.receiver_list().map(<[ValueNode]>::to_vec)
}

fn size(call: &mut Invocation<'_>) -> Outcome {
    Ok(Value::Int(call.receiver_list()?.len() as i64))
}

fn is_empty(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_list()?.is_empty().into())
}

fn first(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_list()?.first().map(|item| item.value.clone()).unwrap_or_default())
}

fn last(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_list()?.last().map(|item| item.value.clone()).unwrap_or_default())
}

fn reverse(call: &mut Invocation<'_>) -> Outcome {
    let mut items = items(call)?;
    items.reverse();
    Ok(Value::List(items))
}

/// Stable: elements that do not compare keep their relative order.
fn sort(call: &mut Invocation<'_>) -> Outcome {
    let mut items = items(call)?;
    items.sort_by(|a, b| a.value.sort_order(&b.value));
    Ok(Value::List(items))
}

fn distinct(call: &mut Invocation<'_>) -> Outcome {
    let mut out: Vec<ValueNode> = Vec::new();
    for item in call.receiver_list()? {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    Ok(Value::List(out))
}

fn count(call: &Invocation<'_>) -> Result<usize, ServiceError> {
    let n = call.int(0)?;
    usize::try_from(n).map_err(|_| ServiceError::failed(format!("negative count {n}")))
}

fn n_first(call: &mut Invocation<'_>) -> Outcome {
    let n = count(call)?;
    let items = call.receiver_list()?;
    Ok(Value::List(items[..n.min(items.len())].to_vec()))
}

fn n_last(call: &mut Invocation<'_>) -> Outcome {
    let n = count(call)?;
    let items = call.receiver_list()?;
    Ok(Value::List(items[items.len().saturating_sub(n)..].to_vec()))
}

/// Out of range is absent, not an error.
fn get(call: &mut Invocation<'_>) -> Outcome {
    let index = call.int(0)?;
    let items = call.receiver_list()?;
    Ok(usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .map(|item| item.value.clone())
        .unwrap_or_default())
}

fn interleave(items: &[ValueNode], separator: &ValueNode) -> Vec<ValueNode> {
    let mut out = Vec::with_capacity(items.len() * 2);
    for (index, item) in items.iter().enumerate() {
        if index > 0 && !separator.is_absent() {
            out.push(separator.clone());
        }
        out.push(item.clone());
    }
    out
}

fn sep(call: &mut Invocation<'_>) -> Outcome {
    Ok(Value::List(interleave(call.receiver_list()?, call.arg_node(0)?)))
}

/// `begin`, the separated elements, then `end`.
fn sep_around(call: &mut Invocation<'_>) -> Outcome {
    let mut out = vec![call.arg_node(0)?.clone()];
    out.extend(interleave(call.receiver_list()?, call.arg_node(1)?));
    out.push(call.arg_node(2)?.clone());
    Ok(ValueNode::list(out).value)
}
