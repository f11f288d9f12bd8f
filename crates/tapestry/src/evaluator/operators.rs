//! Binary operator semantics.
//!
//! Dispatch happens in four stages, the first applicable one wins:
//! list operands, numeric pairs, per-type overrides, then coercion of both
//! operands to bool (`||`, `&&`) or real (everything else).

use tapestry_ast::Operator;

use crate::coerce::{numeric, to_bool, to_real};
use crate::error::CoercionError;
use crate::model::Model;
use crate::value::{Value, ValueNode};

pub fn apply(op: Operator, left: &Value, right: &Value, model: &dyn Model) -> Result<Value, CoercionError> {
    if let Some(result) = on_lists(op, left, right) {
        return Ok(result);
    }
    if left.is_numeric() && right.is_numeric() {
        if let Some(result) = on_numbers(op, left, right) {
            return result;
        }
    }
    if let Some(result) = overrides(op, left, right, model) {
        return result;
    }
    fallback(op, left, right)
}

fn elements(value: &Value) -> Vec<ValueNode> {
    ValueNode::new(value.clone()).into_elements()
}

fn on_lists(op: Operator, left: &Value, right: &Value) -> Option<Value> {
    if !matches!(left, Value::List(_)) && !matches!(right, Value::List(_)) {
        return None;
    }
    let result = match op {
        Operator::Or | Operator::Add => {
            let mut items = elements(left);
            items.extend(elements(right));
            items
        }
        Operator::And => {
            let right = elements(right);
            elements(left)
                .into_iter()
                .filter(|item| right.contains(item))
                .collect()
        }
        Operator::Sub => {
            let right = elements(right);
            elements(left)
                .into_iter()
                .filter(|item| !right.contains(item))
                .collect()
        }
        _ => return None,
    };
    Some(Value::List(result))
}

fn overflow(op: Operator) -> CoercionError {
    CoercionError::Overflow { op: op.literal() }
}

fn on_numbers(op: Operator, left: &Value, right: &Value) -> Option<Result<Value, CoercionError>> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            Operator::Add => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow(op)),
            Operator::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow(op)),
            Operator::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow(op)),
            Operator::Div if b == 0 => Err(CoercionError::DivisionByZero),
            Operator::Div => a.checked_div(b).map(Value::Int).ok_or_else(|| overflow(op)),
            Operator::Eq => Ok(Value::Bool(a == b)),
            Operator::NotEq => Ok(Value::Bool(a != b)),
            Operator::Gt => Ok(Value::Bool(a > b)),
            Operator::GtEq => Ok(Value::Bool(a >= b)),
            Operator::Lt => Ok(Value::Bool(a < b)),
            Operator::LtEq => Ok(Value::Bool(a <= b)),
            Operator::Or | Operator::And => return None,
        };
        return Some(result);
    }
    let (a, b) = (to_real(left).ok()?, to_real(right).ok()?);
    real_arithmetic(op, a, b)
}

fn real_arithmetic(op: Operator, a: f64, b: f64) -> Option<Result<Value, CoercionError>> {
    Some(Ok(match op {
        Operator::Add => Value::Real(a + b),
        Operator::Sub => Value::Real(a - b),
        Operator::Mul => Value::Real(a * b),
        Operator::Div if b == 0.0 => return Some(Err(CoercionError::DivisionByZero)),
        Operator::Div => Value::Real(a / b),
        Operator::Eq => Value::Bool(a == b),
        Operator::NotEq => Value::Bool(a != b),
        Operator::Gt => Value::Bool(a > b),
        Operator::GtEq => Value::Bool(a >= b),
        Operator::Lt => Value::Bool(a < b),
        Operator::LtEq => Value::Bool(a <= b),
        Operator::Or | Operator::And => return None,
    }))
}

fn overrides(op: Operator, left: &Value, right: &Value, model: &dyn Model) -> Option<Result<Value, CoercionError>> {
    let is_text = |value: &Value| matches!(value, Value::Text(_));
    let result = match (op, left, right) {
        (Operator::Add, Value::Absent, other) | (Operator::Add, other, Value::Absent) => other.clone(),
        (Operator::Add, l, r) if is_text(l) || is_text(r) => {
            Value::Text(l.render(model) + &r.render(model))
        }
        (Operator::Sub, Value::Text(l), r) => {
            let removed = r.render(model);
            if removed.is_empty() {
                Value::Text(l.clone())
            } else {
                Value::Text(l.replace(&removed, ""))
            }
        }
        (Operator::Sub, Value::Node(l), Value::Node(r)) => {
            if l == r {
                Value::Absent
            } else {
                Value::Node(*l)
            }
        }
        (Operator::Mul | Operator::Div, l, r) if is_text(l) || is_text(r) => {
            let (l, r) = (numeric(l)?, numeric(r)?);
            return on_numbers(op, &l, &r);
        }
        (Operator::Eq | Operator::NotEq, l, r) => {
            let equal = if is_text(l) != is_text(r) {
                l.render(model) == r.render(model)
            } else {
                l == r
            };
            Value::Bool(equal == (op == Operator::Eq))
        }
        (Operator::Gt | Operator::GtEq | Operator::Lt | Operator::LtEq, Value::Text(l), Value::Text(r)) => {
            Value::Bool(match op {
                Operator::Gt => l > r,
                Operator::GtEq => l >= r,
                Operator::Lt => l < r,
                _ => l <= r,
            })
        }
        _ => return None,
    };
    Some(Ok(result))
}

fn fallback(op: Operator, left: &Value, right: &Value) -> Result<Value, CoercionError> {
    let mismatch = || CoercionError::Operator {
        op: op.literal(),
        left: left.type_name(),
        right: right.type_name(),
    };
    match op {
        Operator::Or | Operator::And => {
            let (a, b) = (to_bool(left).map_err(|_| mismatch())?, to_bool(right).map_err(|_| mismatch())?);
            Ok(Value::Bool(if op == Operator::Or { a || b } else { a && b }))
        }
        _ => {
            let (a, b) = (to_real(left).map_err(|_| mismatch())?, to_real(right).map_err(|_| mismatch())?);
            real_arithmetic(op, a, b).unwrap_or_else(|| Err(mismatch()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;
    use pretty_assertions::assert_eq;

    fn eval(op: Operator, left: Value, right: Value) -> Result<Value, CoercionError> {
        apply(op, &left, &right, &MemoryModel::new())
    }

    fn list(items: &[Value]) -> Value {
        Value::List(items.iter().cloned().map(ValueNode::new).collect())
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval(Operator::Add, Value::Int(1), Value::Int(2)), Ok(Value::Int(3)));
        assert_eq!(eval(Operator::Div, Value::Int(7), Value::Int(2)), Ok(Value::Int(3)));
        assert_eq!(eval(Operator::Div, Value::Int(-7), Value::Int(2)), Ok(Value::Int(-3)));
        assert_eq!(
            eval(Operator::Mul, Value::Int(i64::MAX), Value::Int(2)),
            Err(CoercionError::Overflow { op: "*" })
        );
        assert_eq!(eval(Operator::Lt, Value::Int(1), Value::Int(2)), Ok(Value::Bool(true)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval(Operator::Div, Value::Int(1), Value::Int(0)),
            Err(CoercionError::DivisionByZero)
        );
        assert_eq!(
            eval(Operator::Div, Value::Real(1.0), Value::Real(0.0)),
            Err(CoercionError::DivisionByZero)
        );
        assert_eq!(
            eval(Operator::Div, Value::Int(1), Value::Real(0.0)),
            Err(CoercionError::DivisionByZero)
        );
        assert_eq!(
            eval(Operator::Div, Value::from("4"), Value::from("0")),
            Err(CoercionError::DivisionByZero)
        );
    }

    #[test]
    fn mixed_numbers_promote_to_real() {
        assert_eq!(eval(Operator::Add, Value::Int(1), Value::Real(0.5)), Ok(Value::Real(1.5)));
        assert_eq!(eval(Operator::Eq, Value::Int(2), Value::Real(2.0)), Ok(Value::Bool(true)));
    }

    #[test]
    fn list_operators() {
        let ab = list(&[Value::from("a"), Value::from("b")]);
        let bc = list(&[Value::from("b"), Value::from("c")]);
        assert_eq!(
            eval(Operator::Add, ab.clone(), bc.clone()),
            Ok(list(&[Value::from("a"), Value::from("b"), Value::from("b"), Value::from("c")]))
        );
        assert_eq!(
            eval(Operator::Add, ab.clone(), Value::from("z")),
            Ok(list(&[Value::from("a"), Value::from("b"), Value::from("z")]))
        );
        assert_eq!(eval(Operator::And, ab.clone(), bc.clone()), Ok(list(&[Value::from("b")])));
        assert_eq!(eval(Operator::Sub, ab.clone(), bc), Ok(list(&[Value::from("a")])));
        assert_eq!(
            eval(Operator::Sub, list(&[Value::Int(1), Value::Int(2), Value::Int(1)]), Value::Int(1)),
            Ok(list(&[Value::Int(2)]))
        );
        assert_eq!(eval(Operator::Or, ab.clone(), Value::Absent), Ok(ab));
    }

    #[test]
    fn text_operators() {
        assert_eq!(eval(Operator::Sub, Value::from("ababab"), Value::from("ab")), Ok(Value::from("")));
        assert_eq!(eval(Operator::Sub, Value::from("xaybzc"), Value::from("y")), Ok(Value::from("xabzc")));
        assert_eq!(eval(Operator::Add, Value::from("n"), Value::Int(1)), Ok(Value::from("n1")));
        assert_eq!(eval(Operator::Add, Value::Absent, Value::Int(1)), Ok(Value::Int(1)));
        assert_eq!(eval(Operator::Mul, Value::from("3"), Value::Int(2)), Ok(Value::Int(6)));
        assert_eq!(eval(Operator::Mul, Value::from("1.5"), Value::Int(2)), Ok(Value::Real(3.0)));
        assert_eq!(eval(Operator::Lt, Value::from("abc"), Value::from("abd")), Ok(Value::Bool(true)));
        assert_eq!(eval(Operator::Eq, Value::from("1"), Value::Int(1)), Ok(Value::Bool(true)));
        assert_eq!(eval(Operator::NotEq, Value::from("a"), Value::from("a")), Ok(Value::Bool(false)));
    }

    #[test]
    fn node_subtraction() {
        let model = MemoryModel::new();
        let a = model.create_root("T");
        let b = model.create_root("T");
        assert_eq!(apply(Operator::Sub, &Value::Node(a), &Value::Node(b), &model), Ok(Value::Node(a)));
        assert_eq!(apply(Operator::Sub, &Value::Node(a), &Value::Node(a), &model), Ok(Value::Absent));
    }

    #[test]
    fn fallback_coercion() {
        assert_eq!(eval(Operator::Or, Value::from("false"), Value::Bool(true)), Ok(Value::Bool(true)));
        assert_eq!(eval(Operator::And, Value::Absent, Value::Bool(true)), Ok(Value::Bool(false)));
        assert_eq!(eval(Operator::Gt, Value::from("3"), Value::Int(2)), Ok(Value::Bool(true)));
        assert_eq!(
            eval(Operator::Sub, Value::Bool(true), Value::Int(1)),
            Err(CoercionError::Operator {
                op: "-",
                left: "bool",
                right: "int"
            })
        );
        assert!(eval(Operator::Mul, Value::from("x"), Value::Int(2)).is_err());
    }
}
