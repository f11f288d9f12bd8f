//! Script units: a template file holding named template definitions.
//!
//! ```text
//! [extends base/]
//! [import common/]
//!
//! [template class(Class) file(name + ".java") post(trim())]
//! public class [name/] {}
//! [/template]
//! ```
//!
//! Outside of definitions only whitespace, comments and directives are
//! allowed. One leading and one trailing newline of a template body belong
//! to the tags, not to the generated text.

use crate::ast::{Expression, NodeId, ParentTable, Statement};
use crate::parser::{opens_keyword, Parser};
use crate::scanner::{is_ident_char, trim};
use crate::span::Span;
use crate::token;
use crate::ParseError;

/// `[import name/]` or `[extends name/]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub span: Span,
}

/// `[template name(Type) file(expr) post(expr)] body [/template]`
#[derive(Debug, Clone)]
pub struct TemplateDef {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
    /// Receiver type, or `*` for any receiver.
    pub type_name: String,
    /// Path of the generated file, relative to the output root.
    pub file: Option<Expression>,
    /// Evaluated against the body's text.
    pub post: Option<Expression>,
    pub body: Statement,
}

impl PartialEq for TemplateDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.type_name == other.type_name
            && self.file == other.file
            && self.post == other.post
            && self.body == other.body
    }
}

impl TemplateDef {
    pub fn accepts_any(&self) -> bool {
        self.type_name == token::ANY_TYPE
    }
}

/// A parsed script file.
#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub source: String,
    pub imports: Vec<Directive>,
    pub extends: Option<Directive>,
    pub templates: Vec<TemplateDef>,
    pub parents: ParentTable,
}

impl Script {
    /// Templates called `name`, in declaration order.
    pub fn templates_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a TemplateDef> + 'n
    where
        'a: 'n,
    {
        self.templates.iter().filter(move |t| t.name == name)
    }

    /// Templates that generate files.
    pub fn file_templates(&self) -> impl Iterator<Item = &TemplateDef> {
        self.templates.iter().filter(|t| t.file.is_some())
    }

    /// Names of the scripts this one depends on, `extends` first.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.extends
            .iter()
            .chain(self.imports.iter())
            .map(|d| d.name.as_str())
    }
}

/// Parse the script `name` from `source`.
pub fn parse_script(name: &str, source: &str) -> Result<Script, ParseError> {
    let mut parser = Parser::new(source);
    let mut imports = Vec::new();
    let mut extends: Option<Directive> = None;
    let mut templates = Vec::new();

    let end = source.len();
    let mut pos = 0;
    while pos < end {
        let rest = &source[pos..];
        let skipped = rest.len() - rest.trim_start().len();
        if skipped > 0 {
            pos += skipped;
            continue;
        }

        if rest.starts_with(token::COMMENT_BEGIN) {
            let close = parser.block_scanner().block_end(
                source,
                token::COMMENT_BEGIN,
                token::COMMENT_END,
                pos,
                Span::new(pos, end),
                true,
            );
            if !close.is_found() {
                return Err(parser.unclosed(
                    token::COMMENT_BEGIN,
                    token::COMMENT_END,
                    Span::new(pos, pos + token::COMMENT_BEGIN.len()),
                ));
            }
            pos = close.end;
        } else if opens_keyword(rest, token::TEMPLATE_BEGIN) {
            let (template, next) = template(&mut parser, pos, end)?;
            templates.push(template);
            pos = next;
        } else if opens_keyword(rest, token::IMPORT) {
            let (directive, next) = directive(&parser, token::IMPORT, pos, end)?;
            imports.push(directive);
            pos = next;
        } else if opens_keyword(rest, token::EXTENDS) {
            let (directive, next) = directive(&parser, token::EXTENDS, pos, end)?;
            if extends.is_some() {
                return Err(ParseError::UnexpectedTag {
                    tag: token::EXTENDS.to_string(),
                    span: directive.span,
                    location: parser.location(pos),
                });
            }
            extends = Some(directive);
            pos = next;
        } else {
            let line_end = rest.find('\n').map_or(end, |i| pos + i);
            return Err(parser.syntax(
                "only templates, directives and comments are allowed at top level",
                Span::new(pos, line_end),
            ));
        }
    }

    Ok(Script {
        name: name.to_string(),
        source: source.to_string(),
        imports,
        extends,
        templates,
        parents: parser.into_parents(),
    })
}

fn directive(
    parser: &Parser<'_>,
    keyword: &'static str,
    start: usize,
    end: usize,
) -> Result<(Directive, usize), ParseError> {
    let source = parser.source();
    let close = parser
        .expression_scanner()
        .find(source, token::FEATURE_END, Span::new(start + keyword.len(), end));
    if !close.is_found() {
        return Err(parser.unclosed(
            keyword,
            token::FEATURE_END,
            Span::new(start, start + keyword.len()),
        ));
    }
    let name_span = trim(source, Span::new(start + keyword.len(), close.begin));
    let name = name_span.slice(source).unwrap_or("");
    if !is_script_name(name) {
        return Err(ParseError::InvalidIdentifier {
            name: name.to_string(),
            span: name_span,
            location: parser.location(name_span.begin),
        });
    }
    Ok((
        Directive {
            name: name.to_string(),
            span: Span::new(start, close.end),
        },
        close.end,
    ))
}

fn template(parser: &mut Parser<'_>, start: usize, end: usize) -> Result<(TemplateDef, usize), ParseError> {
    let source = parser.source();
    let header = parser.tag_close(start, end);
    if !header.is_found() {
        return Err(parser.unclosed(
            token::TEMPLATE_BEGIN,
            token::TAG_CLOSE,
            Span::new(start, start + token::TEMPLATE_BEGIN.len()),
        ));
    }

    // Name and receiver type: `name(Type)`.
    let signature = trim(source, Span::new(start + token::TEMPLATE_BEGIN.len(), header.begin));
    let text = signature.slice(source).unwrap_or("");
    let name_len = text.find(|c: char| !is_ident_char(c)).unwrap_or(text.len());
    let name = &text[..name_len];
    if !token::is_identifier(name) {
        return Err(ParseError::InvalidIdentifier {
            name: name.to_string(),
            span: Span::new(signature.begin, signature.begin + name_len),
            location: parser.location(signature.begin),
        });
    }
    let after_name = trim(source, Span::new(signature.begin + name_len, signature.end));
    let (type_span, mut pos) = group(parser, after_name).ok_or_else(|| {
        parser.syntax(
            format!("template '{name}' expects a parenthesized receiver type"),
            after_name,
        )
    })?;
    let type_span = trim(source, type_span);
    let type_name = type_span.slice(source).unwrap_or("");
    if !is_type_name(type_name) {
        return Err(ParseError::InvalidIdentifier {
            name: type_name.to_string(),
            span: type_span,
            location: parser.location(type_span.begin),
        });
    }

    // Attributes: `file(expr)` and `post(expr)`, any order, at most once each.
    let mut file = None;
    let mut post = None;
    loop {
        let attribute = trim(source, Span::new(pos, signature.end));
        if attribute.is_empty() {
            break;
        }
        let text = attribute.slice(source).unwrap_or("");
        let key_len = text.find(|c: char| !is_ident_char(c)).unwrap_or(text.len());
        let key = &text[..key_len];
        let key_span = Span::new(attribute.begin, attribute.begin + key_len);
        let slot = match key {
            token::ATTR_FILE => &mut file,
            token::ATTR_POST => &mut post,
            _ => {
                return Err(parser.syntax(format!("unknown template attribute '{text}'"), attribute));
            }
        };
        if slot.is_some() {
            return Err(parser.syntax(format!("duplicate template attribute '{key}'"), key_span));
        }
        let value = trim(source, Span::new(key_span.end, attribute.end));
        let Some((inner, next)) = group(parser, value) else {
            return Err(parser.syntax(
                format!("attribute '{key}' expects a parenthesized expression"),
                key_span,
            ));
        };
        *slot = Some(parser.expression(inner)?);
        pos = next;
    }

    let close = parser
        .block_scanner()
        .find(source, token::TEMPLATE_END, Span::new(header.end, end));
    if !close.is_found() {
        return Err(parser.unclosed(token::TEMPLATE_BEGIN, token::TEMPLATE_END, Span::new(start, header.end)));
    }
    let body = parser.statement(strip_newlines(source, Span::new(header.end, close.begin)))?;

    let id = parser.register();
    for expr in file.iter().chain(post.iter()) {
        parser.attach(id, expr.id);
    }
    parser.attach(id, body.id);
    Ok((
        TemplateDef {
            id,
            span: Span::new(start, close.end),
            name: name.to_string(),
            type_name: type_name.to_string(),
            file,
            post,
            body,
        },
        close.end,
    ))
}

/// A `( ... )` group at the start of `span`: the inside, and the offset
/// right after the closing parenthesis.
fn group(parser: &Parser<'_>, span: Span) -> Option<(Span, usize)> {
    let source = parser.source();
    if !span.slice(source)?.starts_with(token::ARGS_OPEN) {
        return None;
    }
    let close = parser.expression_scanner().block_end(
        source,
        token::ARGS_OPEN,
        token::ARGS_CLOSE,
        span.begin,
        span,
        true,
    );
    close
        .is_found()
        .then(|| (Span::new(span.begin + 1, close.begin), close.end))
}

/// Drop one leading and one trailing line break.
fn strip_newlines(source: &str, span: Span) -> Span {
    let Some(text) = span.slice(source) else {
        return span;
    };
    let lead = if text.starts_with("\r\n") {
        2
    } else if text.starts_with('\n') {
        1
    } else {
        0
    };
    let rest = &text[lead..];
    let tail = if rest.ends_with("\r\n") {
        2
    } else if rest.ends_with('\n') {
        1
    } else {
        0
    };
    Span::new(span.begin + lead, span.end - tail)
}

fn is_script_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| is_ident_char(c) || matches!(c, '-' | '.'))
}

fn is_type_name(name: &str) -> bool {
    name == token::ANY_TYPE
        || name
            .split(token::PREFIX_SEPARATOR)
            .all(token::is_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, StmtKind};
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"[comment]Generates one class per entity.[/comment]
[extends base/]
[import common/]
[import naming/]

[template class(Entity) file(name + ".java") post(trim())]
public class [name/] {
[for (attributes)]  [type/] [name/];
[/for]}
[/template]

[template field(*)]
[name/]
[/template]
"#;

    #[test]
    fn parses_directives_and_templates() {
        let script = parse_script("entities", SOURCE).unwrap();
        assert_eq!(script.name, "entities");
        assert_eq!(script.extends.as_ref().map(|d| d.name.as_str()), Some("base"));
        assert_eq!(
            script.imports.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["common", "naming"]
        );
        assert_eq!(script.dependencies().collect::<Vec<_>>(), vec!["base", "common", "naming"]);
        assert_eq!(script.templates.len(), 2);

        let class = &script.templates[0];
        assert_eq!(class.name, "class");
        assert_eq!(class.type_name, "Entity");
        assert!(matches!(
            class.file.as_ref().map(|e| &e.kind),
            Some(ExprKind::Operator { .. })
        ));
        assert!(class.post.is_some());
        assert_eq!(script.file_templates().count(), 1);

        let field = script.templates_named("field").next().unwrap();
        assert!(field.accepts_any());
        assert_eq!(script.parents.parent(field.body.id), Some(field.id));
    }

    #[test]
    fn body_newlines_belong_to_tags() {
        let script = parse_script("s", "[template t(*)]\nline\n[/template]").unwrap();
        let StmtKind::Sequence(items) = &script.templates[0].body.kind else {
            panic!("expected sequence");
        };
        assert_eq!(items[0].kind, StmtKind::Text("line".to_string()));

        let script = parse_script("s", "[template t(*)]\n\nkeep\n\n[/template]").unwrap();
        let StmtKind::Sequence(items) = &script.templates[0].body.kind else {
            panic!("expected sequence");
        };
        assert_eq!(items[0].kind, StmtKind::Text("\nkeep\n".to_string()));
    }

    #[test]
    fn attributes_in_any_order() {
        let script = parse_script("s", "[template t(A) post(trim()) file(\"x\")]x[/template]").unwrap();
        assert!(script.templates[0].file.is_some());
        assert!(script.templates[0].post.is_some());
    }

    #[test]
    fn commented_end_tag_does_not_close() {
        let source = "[template t(*)][comment][/template][/comment]body[/template]";
        let script = parse_script("s", source).unwrap();
        assert_eq!(script.templates.len(), 1);
        assert_eq!(script.templates[0].body.children().len(), 2);
    }

    #[test]
    fn script_errors() {
        for source in [
            "stray text",
            "[template t]x[/template]",
            "[template t(*) color(red)]x[/template]",
            "[template t(*) file(a) file(b)]x[/template]",
            "[template t(*)]never closed",
            "[import /]",
            "[extends a/][extends b/]",
            "[template 1t(*)]x[/template]",
            "[template t(a b)]x[/template]",
        ] {
            assert!(parse_script("s", source).is_err(), "accepted {source:?}");
        }
    }

    #[test]
    fn round_trip() {
        let script = parse_script("entities", SOURCE).unwrap();
        let printed = script.to_string();
        let reparsed = parse_script("entities", &printed).unwrap();
        assert_eq!(script.imports.len(), reparsed.imports.len());
        assert_eq!(script.extends.map(|d| d.name), reparsed.extends.map(|d| d.name));
        assert_eq!(script.templates, reparsed.templates);
    }
}
