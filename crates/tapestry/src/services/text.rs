//! Text services. Indices count characters, starting at 0.

use regex::Regex;

use super::{char_offset, Invocation, Returns, ServiceCollection, ServiceError, INT, TEXT};
use crate::scope::Rank;
use crate::value::{TypeRef, Value, ValueNode};

type Outcome = Result<Value, ServiceError>;

pub fn text_services() -> ServiceCollection {
    use Returns::Fixed;
    ServiceCollection::new("text", Rank::Default)
        .add("length", TEXT, &[], Fixed(TypeRef::Int), length)
        .add("toUpperCase", TEXT, &[], Fixed(TypeRef::Text), to_upper_case)
        .add("toLowerCase", TEXT, &[], Fixed(TypeRef::Text), to_lower_case)
        .add("toU1Case", TEXT, &[], Fixed(TypeRef::Text), to_u1_case)
        .add("toL1Case", TEXT, &[], Fixed(TypeRef::Text), to_l1_case)
        .add("trim", TEXT, &[], Fixed(TypeRef::Text), trim)
        .add("substring", TEXT, &[INT], Fixed(TypeRef::Text), substring_from)
        .add("substring", TEXT, &[INT, INT], Fixed(TypeRef::Text), substring)
        .add("indexOf", TEXT, &[TEXT], Fixed(TypeRef::Int), index_of)
        .add("lastIndexOf", TEXT, &[TEXT], Fixed(TypeRef::Int), last_index_of)
        .add("startsWith", TEXT, &[TEXT], Fixed(TypeRef::Bool), starts_with)
        .add("endsWith", TEXT, &[TEXT], Fixed(TypeRef::Bool), ends_with)
        .add("contains", TEXT, &[TEXT], Fixed(TypeRef::Bool), contains)
        .add("replace", TEXT, &[TEXT, TEXT], Fixed(TypeRef::Text), replace)
        .add("replaceAll", TEXT, &[TEXT, TEXT], Fixed(TypeRef::Text), replace_all)
        .add("split", TEXT, &[TEXT], Fixed(TypeRef::list_of(TypeRef::Text)), split)
        .add("equalsIgnoreCase", TEXT, &[TEXT], Fixed(TypeRef::Bool), equals_ignore_case)
        .add("charAt", TEXT, &[INT], Fixed(TypeRef::Text), char_at)
        .add("indentSpace", TEXT, &[], Fixed(TypeRef::Text), indent_space)
        .add("indentTab", TEXT, &[], Fixed(TypeRef::Text), indent_tab)
        .add("toString", TEXT, &[], Fixed(TypeRef::Text), to_string)
}

fn length(call: &mut Invocation<'_>) -> Outcome {
    Ok(Value::Int(call.receiver_text()?.chars().count() as i64))
}

fn to_upper_case(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_text()?.to_uppercase().into())
}

fn to_lower_case(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_text()?.to_lowercase().into())
}

fn map_first_char(text: &str, f: impl FnOnce(char) -> String) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => f(first) + chars.as_str(),
        None => String::new(),
    }
}

fn to_u1_case(call: &mut Invocation<'_>) -> Outcome {
    Ok(map_first_char(call.receiver_text()?, |c| c.to_uppercase().collect()).into())
}

fn to_l1_case(call: &mut Invocation<'_>) -> Outcome {
    Ok(map_first_char(call.receiver_text()?, |c| c.to_lowercase().collect()).into())
}

fn trim(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_text()?.trim().into())
}

fn out_of_range(index: i64, text: &str) -> ServiceError {
    ServiceError::failed(format!(
        "index {index} out of range for text of length {}",
        text.chars().count()
    ))
}

fn substring_from(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    let begin = call.int(0)?;
    let from = char_offset(text, begin).ok_or_else(|| out_of_range(begin, text))?;
    Ok(text[from..].into())
}

fn substring(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    let (begin, end) = (call.int(0)?, call.int(1)?);
    let from = char_offset(text, begin).ok_or_else(|| out_of_range(begin, text))?;
    let to = char_offset(text, end).ok_or_else(|| out_of_range(end, text))?;
    if from > to {
        return Err(ServiceError::failed(format!(
            "substring begins at {begin} after its end {end}"
        )));
    }
    Ok(text[from..to].into())
}

/// Character index of a byte offset.
fn char_index(text: &str, offset: Option<usize>) -> Value {
    Value::Int(offset.map_or(-1, |offset| text[..offset].chars().count() as i64))
}

fn index_of(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    Ok(char_index(text, text.find(call.text(0)?)))
}

fn last_index_of(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    Ok(char_index(text, text.rfind(call.text(0)?)))
}

fn starts_with(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_text()?.starts_with(call.text(0)?).into())
}

fn ends_with(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_text()?.ends_with(call.text(0)?).into())
}

fn contains(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_text()?.contains(call.text(0)?).into())
}

fn replace(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    let (from, to) = (call.text(0)?, call.text(1)?);
    if from.is_empty() {
        return Ok(text.into());
    }
    Ok(text.replacen(from, to, 1).into())
}

fn replace_all(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    let pattern = call.text(0)?;
    let regex = Regex::new(pattern)
        .map_err(|e| ServiceError::failed(format!("invalid regular expression '{pattern}': {e}")))?;
    Ok(regex.replace_all(text, call.text(1)?).into_owned().into())
}

fn split(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    let separator = call.text(0)?;
    let parts: Vec<ValueNode> = if separator.is_empty() {
        text.chars().map(|c| ValueNode::text(c.to_string())).collect()
    } else {
        text.split(separator).map(ValueNode::text).collect()
    };
    Ok(Value::List(parts))
}

fn equals_ignore_case(call: &mut Invocation<'_>) -> Outcome {
    let (text, other) = (call.receiver_text()?, call.text(0)?);
    Ok((text.to_lowercase() == other.to_lowercase()).into())
}

fn char_at(call: &mut Invocation<'_>) -> Outcome {
    let text = call.receiver_text()?;
    let index = call.int(0)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| text.chars().nth(i))
        .map(|c| Value::Text(c.to_string()))
        .ok_or_else(|| out_of_range(index, text))
}

/// Prefix every non-empty line with `indent`.
fn indent(text: &str, indent: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim_end_matches(['\r', '\n']).is_empty() {
                line.to_string()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect()
}

fn indent_space(call: &mut Invocation<'_>) -> Outcome {
    let width = " ".repeat(call.settings.indent_width);
    Ok(indent(call.receiver_text()?, &width).into())
}

fn indent_tab(call: &mut Invocation<'_>) -> Outcome {
    Ok(indent(call.receiver_text()?, "\t").into())
}

fn to_string(call: &mut Invocation<'_>) -> Outcome {
    Ok(call.receiver_text()?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalContext;
    use crate::model::MemoryModel;
    use crate::settings::Settings;
    use pretty_assertions::assert_eq;

    fn run(name: &str, receiver: &str, args: &[Value]) -> Result<Value, ServiceError> {
        let model = MemoryModel::new();
        let settings = Settings::default();
        let mut context = EvalContext::new();
        let args: Vec<ValueNode> = args.iter().cloned().map(ValueNode::new).collect();
        text_services()
            .invoke(name, &ValueNode::text(receiver), &args, &model, &settings, &mut context)
            .unwrap_or_else(|| panic!("no service {name}/{}", args.len()))
    }

    fn text(value: &str) -> Value {
        Value::from(value)
    }

    #[test]
    fn case_services() {
        assert_eq!(run("toUpperCase", "abc", &[]), Ok(text("ABC")));
        assert_eq!(run("toU1Case", "élan", &[]), Ok(text("Élan")));
        assert_eq!(run("toL1Case", "Name", &[]), Ok(text("name")));
        assert_eq!(run("toU1Case", "", &[]), Ok(text("")));
        assert_eq!(run("equalsIgnoreCase", "AbC", &[text("aBc")]), Ok(Value::Bool(true)));
    }

    #[test]
    fn character_indices() {
        assert_eq!(run("length", "héllo", &[]), Ok(Value::Int(5)));
        assert_eq!(run("substring", "héllo", &[Value::Int(1)]), Ok(text("éllo")));
        assert_eq!(run("substring", "héllo", &[Value::Int(1), Value::Int(3)]), Ok(text("él")));
        assert_eq!(run("indexOf", "héllo", &[text("l")]), Ok(Value::Int(2)));
        assert_eq!(run("lastIndexOf", "héllo", &[text("l")]), Ok(Value::Int(3)));
        assert_eq!(run("indexOf", "héllo", &[text("z")]), Ok(Value::Int(-1)));
        assert_eq!(run("charAt", "héllo", &[Value::Int(1)]), Ok(text("é")));
        assert!(run("charAt", "abc", &[Value::Int(3)]).is_err());
        assert!(run("substring", "abc", &[Value::Int(2), Value::Int(1)]).is_err());
    }

    #[test]
    fn integer_arguments_coerce_from_text() {
        assert_eq!(run("substring", "abcdef", &[text("4")]), Ok(text("ef")));
    }

    #[test]
    fn replacing() {
        assert_eq!(run("replace", "a.b.c", &[text("."), text("-")]), Ok(text("a-b.c")));
        assert_eq!(run("replaceAll", "a1b22c", &[text("[0-9]+"), text("#")]), Ok(text("a#b#c")));
        assert!(run("replaceAll", "a", &[text("("), text("")]).is_err());
    }

    #[test]
    fn splitting() {
        assert_eq!(
            run("split", "a,b,,c", &[text(",")]),
            Ok(Value::List(
                ["a", "b", "", "c"].into_iter().map(ValueNode::text).collect()
            ))
        );
        assert_eq!(
            run("split", "ab", &[text("")]),
            Ok(Value::List(vec![ValueNode::text("a"), ValueNode::text("b")]))
        );
    }

    #[test]
    fn indentation() {
        assert_eq!(run("indentSpace", "a\n\nb", &[]), Ok(text("    a\n\n    b")));
        assert_eq!(run("indentTab", "a\nb\n", &[]), Ok(text("\ta\n\tb\n")));
    }

    #[test]
    fn predicates() {
        assert_eq!(run("startsWith", "prefix", &[text("pre")]), Ok(Value::Bool(true)));
        assert_eq!(run("endsWith", "prefix", &[text("pre")]), Ok(Value::Bool(false)));
        assert_eq!(run("contains", "prefix", &[text("efi")]), Ok(Value::Bool(true)));
        assert_eq!(run("trim", "  x ", &[]), Ok(text("x")));
    }
}
