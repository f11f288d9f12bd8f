//! Canonical source rendering of trees.
//!
//! `parse(node.to_string())` yields a structurally equal node.

use std::fmt::{self, Display, Formatter, Write};

use crate::ast::{Call, CallChain, ExprKind, Expression, Literal, Statement, StmtKind};
use crate::script::{Script, TemplateDef};
use crate::token;

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str(token::KW_NULL),
            Literal::Bool(true) => f.write_str(token::KW_TRUE),
            Literal::Bool(false) => f.write_str(token::KW_FALSE),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Real(value) => write!(f, "{value:?}"),
            Literal::Text(text) => {
                f.write_char(token::QUOTE)?;
                for c in text.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        other => f.write_char(other)?,
                    }
                }
                f.write_char(token::QUOTE)
            }
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(literal) => literal.fmt(f),
            ExprKind::Operator { op, operands } => {
                for (index, operand) in operands.iter().enumerate() {
                    if index > 0 {
                        write!(f, " {op} ")?;
                    }
                    operand.fmt(f)?;
                }
                Ok(())
            }
            ExprKind::Not(operand) => write!(f, "{}{operand}", token::NOT),
            ExprKind::Parenthesis(inner) => write!(f, "({inner})"),
            ExprKind::Chain(chain) => chain.fmt(f),
        }
    }
}

impl Display for CallChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let Some(receiver) = &self.receiver {
            receiver.fmt(f)?;
            first = false;
        }
        for call in &self.calls {
            if !first {
                f.write_str(token::CALL_SEPARATOR)?;
            }
            call.fmt(f)?;
            first = false;
        }
        Ok(())
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}{}", token::PREFIX_SEPARATOR)?;
        }
        f.write_str(&self.name)?;
        if self.parenthesized || !self.args.is_empty() {
            f.write_str(token::ARGS_OPEN)?;
            for (index, arg) in self.args.iter().enumerate() {
                if index > 0 {
                    write!(f, "{} ", token::ARG_SEPARATOR)?;
                }
                arg.fmt(f)?;
            }
            f.write_str(token::ARGS_CLOSE)?;
        }
        if let Some(filter) = &self.filter {
            write!(f, "{}{filter}{}", token::FILTER_OPEN, token::FILTER_CLOSE)?;
        }
        Ok(())
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Text(text) => f.write_str(&text.replace('[', "\\[")),
            StmtKind::Sequence(items) => items.iter().try_for_each(|item| item.fmt(f)),
            StmtKind::Feature(expr) => write!(f, "{}{expr}{}", token::TAG_OPEN, token::FEATURE_END),
            StmtKind::For { condition, body } => write!(
                f,
                "{} ({condition}){}{body}{}",
                token::FOR_BEGIN,
                token::TAG_CLOSE,
                token::FOR_END
            ),
            StmtKind::If(block) => {
                write!(
                    f,
                    "{} ({}){}{}",
                    token::IF_BEGIN,
                    block.condition,
                    token::TAG_CLOSE,
                    block.then_branch
                )?;
                for else_if in &block.else_ifs {
                    write!(
                        f,
                        "{} ({}){}{}",
                        token::ELSE_IF,
                        else_if.condition,
                        token::TAG_CLOSE,
                        else_if.body
                    )?;
                }
                if let Some(else_branch) = &block.else_branch {
                    write!(f, "{}{else_branch}", token::ELSE)?;
                }
                f.write_str(token::IF_END)
            }
            StmtKind::Comment(body) => {
                write!(f, "{}{body}{}", token::COMMENT_BEGIN, token::COMMENT_END)
            }
        }
    }
}

impl Display for TemplateDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}({})", token::TEMPLATE_BEGIN, self.name, self.type_name)?;
        if let Some(file) = &self.file {
            write!(f, " {}({file})", token::ATTR_FILE)?;
        }
        if let Some(post) = &self.post {
            write!(f, " {}({post})", token::ATTR_POST)?;
        }
        writeln!(f, "{}", token::TAG_CLOSE)?;
        writeln!(f, "{}", self.body)?;
        f.write_str(token::TEMPLATE_END)
    }
}

impl Display for Script {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.extends {
            writeln!(f, "{} {}{}", token::EXTENDS, parent.name, token::FEATURE_END)?;
        }
        for import in &self.imports {
            writeln!(f, "{} {}{}", token::IMPORT, import.name, token::FEATURE_END)?;
        }
        for template in &self.templates {
            writeln!(f)?;
            writeln!(f, "{template}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::span::Span;
    use crate::{parse_expression, parse_statement};
    use pretty_assertions::assert_eq;

    fn round_trip_expression(source: &str) {
        let parsed = parse_expression(source, Span::of(source)).unwrap();
        let printed = parsed.to_string();
        let reparsed = parse_expression(&printed, Span::of(&printed)).unwrap();
        assert_eq!(parsed, reparsed, "printed as {printed}");
    }

    fn round_trip_statement(source: &str) {
        let parsed = parse_statement(source, Span::of(source)).unwrap();
        let printed = parsed.to_string();
        let reparsed = parse_statement(&printed, Span::of(&printed)).unwrap();
        assert_eq!(parsed, reparsed, "printed as {printed}");
    }

    #[test]
    fn expressions_round_trip() {
        for source in [
            "null",
            "true",
            "false",
            "-12",
            "2.5",
            r#""quote \" and \\ and \n""#,
            "a || b && c",
            "1 + 2 * 3 - 4 / 5",
            "a == b != c",
            "x >= 1 && y <= 2 || z > 3 && w < 4",
            "!(a || b)",
            "!flag",
            r#"meta::children[name != "x"].name(1, "y").i"#,
            "args(0).size()",
            r#""abc".toUpperCase"#,
            "(a + b).length",
            "startUserCode + endUserCode",
        ] {
            round_trip_expression(source);
        }
    }

    #[test]
    fn statements_round_trip() {
        for source in [
            "plain text",
            r"escaped \[bracket/] text",
            "a[name/]b",
            "[for (items)][i/]: [name/]\n[/for]",
            "[if (a)]1[elseif (b)]2[elseif (c)]3[else]4[/if]",
            "[if (a)]only[/if]",
            "[comment]not [evaluated/][/comment]",
            "[for (3)][if (i == 0)]first[else], [/if][/for]",
        ] {
            round_trip_statement(source);
        }
    }

    #[test]
    fn canonical_spacing() {
        let source = "[for(   items  )][  name /][/for]";
        let parsed = parse_statement(source, Span::of(source)).unwrap();
        assert_eq!(parsed.to_string(), "[for (items)][name/][/for]");
    }
}
