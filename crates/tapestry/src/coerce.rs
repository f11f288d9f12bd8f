//! Coercion adapters.
//!
//! Each target type has an ordered list of adapters; the first one that
//! accepts the value wins. The lists are plain data so the rules can be
//! read in one place.

use crate::error::CoercionError;
use crate::model::Model;
use crate::value::{Value, ValueNode, ValueType};

type Adapter<T> = fn(&Value) -> Option<T>;

const TO_BOOL: &[Adapter<bool>] = &[bool_of_bool, bool_of_text, bool_of_absent];
const TO_INT: &[Adapter<i64>] = &[int_of_int, int_of_real, int_of_text];
const TO_REAL: &[Adapter<f64>] = &[real_of_real, real_of_int, real_of_text];

fn bool_of_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn bool_of_text(value: &Value) -> Option<bool> {
    match value {
        Value::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn bool_of_absent(value: &Value) -> Option<bool> {
    value.is_absent().then_some(false)
}

fn int_of_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        _ => None,
    }
}

/// Only reals without a fractional part.
fn int_of_real(value: &Value) -> Option<i64> {
    match value {
        Value::Real(x) if x.fract() == 0.0 && x.abs() < i64::MAX as f64 => Some(*x as i64),
        _ => None,
    }
}

fn int_of_text(value: &Value) -> Option<i64> {
    match value {
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn real_of_real(value: &Value) -> Option<f64> {
    match value {
        Value::Real(x) => Some(*x),
        _ => None,
    }
}

fn real_of_int(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        _ => None,
    }
}

fn real_of_text(value: &Value) -> Option<f64> {
    match value {
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn attempt<T>(adapters: &[Adapter<T>], value: &Value, to: ValueType) -> Result<T, CoercionError> {
    adapters
        .iter()
        .find_map(|adapter| adapter(value))
        .ok_or(CoercionError::Convert {
            from: value.type_name(),
            to: to.name(),
        })
}

pub fn to_bool(value: &Value) -> Result<bool, CoercionError> {
    attempt(TO_BOOL, value, ValueType::Bool)
}

pub fn to_int(value: &Value) -> Result<i64, CoercionError> {
    attempt(TO_INT, value, ValueType::Int)
}

pub fn to_real(value: &Value) -> Result<f64, CoercionError> {
    attempt(TO_REAL, value, ValueType::Real)
}

/// Always succeeds.
pub fn to_text(value: &Value, model: &dyn Model) -> String {
    value.render(model)
}

/// Numbers as they are; text that looks numeric as int (no `.`) or real.
pub fn numeric(value: &Value) -> Option<Value> {
    match value {
        Value::Int(_) | Value::Real(_) => Some(value.clone()),
        Value::Text(s) => {
            let s = s.trim();
            if s.contains('.') {
                s.parse().ok().map(Value::Real)
            } else {
                s.parse().ok().map(Value::Int)
            }
        }
        _ => None,
    }
}

/// Convert `node` to `target`, keeping its diagnostics and origin.
pub fn coerce(node: &ValueNode, target: ValueType, model: &dyn Model) -> Result<ValueNode, CoercionError> {
    let value = &node.value;
    let converted = match target {
        ValueType::Any => value.clone(),
        ValueType::Bool => Value::Bool(to_bool(value)?),
        ValueType::Int => Value::Int(to_int(value)?),
        ValueType::Real => Value::Real(to_real(value)?),
        ValueType::Text => Value::Text(to_text(value, model)),
        exact => {
            if ValueType::of(value) != exact {
                return Err(CoercionError::Convert {
                    from: value.type_name(),
                    to: exact.name(),
                });
            }
            value.clone()
        }
    };
    Ok(node.clone().map_value(converted))
}

/// First of `targets` that `node` converts to.
pub fn coerce_any(
    node: &ValueNode,
    targets: &[ValueType],
    model: &dyn Model,
) -> Result<ValueNode, CoercionError> {
    let mut last = CoercionError::Convert {
        from: node.type_name(),
        to: ValueType::Any.name(),
    };
    for target in targets {
        match coerce(node, *target, model) {
            Ok(converted) => return Ok(converted),
            Err(error) => last = error,
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;

    #[test]
    fn bool_adapters() {
        assert_eq!(to_bool(&Value::Bool(true)), Ok(true));
        assert_eq!(to_bool(&Value::from("TRUE")), Ok(true));
        assert_eq!(to_bool(&Value::from("False")), Ok(false));
        assert_eq!(to_bool(&Value::Absent), Ok(false));
        assert_eq!(
            to_bool(&Value::Int(1)),
            Err(CoercionError::Convert {
                from: "int",
                to: "bool"
            })
        );
        assert!(to_bool(&Value::from("yes")).is_err());
    }

    #[test]
    fn number_adapters() {
        assert_eq!(to_int(&Value::Real(4.0)), Ok(4));
        assert!(to_int(&Value::Real(4.5)).is_err());
        assert_eq!(to_int(&Value::from(" 12 ")), Ok(12));
        assert_eq!(to_real(&Value::Int(3)), Ok(3.0));
        assert_eq!(to_real(&Value::from("2.5")), Ok(2.5));
        assert!(to_real(&Value::Bool(true)).is_err());
    }

    #[test]
    fn numeric_text() {
        assert_eq!(numeric(&Value::from("6")), Some(Value::Int(6)));
        assert_eq!(numeric(&Value::from("1.5")), Some(Value::Real(1.5)));
        assert_eq!(numeric(&Value::from("six")), None);
        assert_eq!(numeric(&Value::Bool(true)), None);
    }

    #[test]
    fn ordered_targets() {
        let model = MemoryModel::new();
        let node = ValueNode::text("7");
        let converted = coerce_any(&node, &[ValueType::Int, ValueType::Text], &model).unwrap();
        assert_eq!(converted.value, Value::Int(7));
        let node = ValueNode::text("seven");
        let converted = coerce_any(&node, &[ValueType::Int, ValueType::Text], &model).unwrap();
        assert_eq!(converted.value, Value::from("seven"));
        assert!(coerce(&node, ValueType::List, &model).is_err());
    }
}
