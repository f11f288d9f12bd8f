//! Recursive-descent parser over scanner-delimited spans.
//!
//! Expressions are parsed by trying grammar alternatives in a fixed order,
//! first success wins: operator split, `!` prefix, parenthesis, literal,
//! call chain. Statements are found by locating block markers with the
//! [`Scanner`] and recursing into each delimited sub-range.

use crate::ast::{
    Call, CallChain, CallKind, ElseIf, ExprKind, Expression, IfBlock, Literal, NodeId,
    ParentTable, Statement, StmtKind,
};
use crate::scanner::{is_ident_char, trim, Pair, Scanner};
use crate::span::Span;
use crate::token::{self, Operator};
use crate::{Location, ParseError};

/// Parse the expression found in `span` of `buffer`.
pub fn parse_expression(buffer: &str, span: Span) -> Result<Expression, ParseError> {
    Parser::new(buffer).expression(span)
}

/// Parse the statements found in `span` of `buffer` into a sequence.
pub fn parse_statement(buffer: &str, span: Span) -> Result<Statement, ParseError> {
    Parser::new(buffer).statement(span)
}

/// Parser over one source buffer. Node ids and parent links accumulate
/// across calls, so one parser builds one unit.
pub struct Parser<'s> {
    source: &'s str,
    /// Expressions: quotes, parentheses and brackets are opaque.
    expr: Scanner,
    /// Template text: only `\[` escapes.
    text: Scanner,
    /// Block bodies: nested comments are opaque.
    block: Scanner,
    /// `[elseif`/`[else]` search: nested blocks are opaque.
    branches: Scanner,
    parents: ParentTable,
}

/// Characters after which a `-` is a sign rather than a subtraction.
const SIGN_CONTEXT: &[char] = &['|', '&', '=', '!', '<', '>', '+', '-', '/', '*', '(', ','];

impl<'s> Parser<'s> {
    pub fn new(source: &'s str) -> Self {
        let comments = Pair::new(token::COMMENT_BEGIN, token::COMMENT_END);
        Self {
            source,
            expr: Scanner::expression(),
            text: Scanner::new().with_escape(token::ESCAPE),
            block: Scanner::new()
                .with_escape(token::ESCAPE)
                .inhibit(comments.clone()),
            branches: Scanner::new()
                .with_escape(token::ESCAPE)
                .inhibit(comments)
                .inhibit(Pair::keyword(token::IF_BEGIN, token::IF_END))
                .inhibit(Pair::keyword(token::FOR_BEGIN, token::FOR_END)),
            parents: ParentTable::new(),
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn into_parents(self) -> ParentTable {
        self.parents
    }

    pub(crate) fn expression_scanner(&self) -> &Scanner {
        &self.expr
    }

    pub(crate) fn block_scanner(&self) -> &Scanner {
        &self.block
    }

    pub(crate) fn register(&mut self) -> NodeId {
        self.parents.register()
    }

    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.parents.attach(parent, child);
    }

    // ========================================================================
    // Errors
    // ========================================================================

    pub(crate) fn location(&self, offset: usize) -> Location {
        Location::locate(self.source, offset)
    }

    pub(crate) fn syntax(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::Syntax {
            message: message.into(),
            span,
            location: self.location(span.begin),
        }
    }

    pub(crate) fn unclosed(
        &self,
        construct: &'static str,
        expected: &'static str,
        span: Span,
    ) -> ParseError {
        ParseError::Unclosed {
            construct,
            expected,
            span,
            location: self.location(span.begin),
        }
    }

    fn text_of(&self, span: Span) -> &'s str {
        span.slice(self.source).unwrap_or("")
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Parse an expression; whitespace around it is ignored.
    pub fn expression(&mut self, span: Span) -> Result<Expression, ParseError> {
        let span = trim(self.source, span);
        if !span.is_found() {
            return Err(self.syntax("expression out of range", span));
        }
        if span.is_empty() {
            return Err(self.syntax("empty expression", span));
        }
        if let Some(expr) = self.operator(span)? {
            return Ok(expr);
        }
        if let Some(expr) = self.not(span)? {
            return Ok(expr);
        }
        if let Some(expr) = self.parenthesis(span)? {
            return Ok(expr);
        }
        if let Some(literal) = self.literal(span) {
            let id = self.register();
            return Ok(Expression {
                id,
                span,
                kind: ExprKind::Literal(literal),
            });
        }
        self.call_chain(span)
    }

    fn operator(&mut self, span: Span) -> Result<Option<Expression>, ParseError> {
        for op in Operator::ALL {
            let positions: Vec<Span> = self
                .expr
                .split_positions(self.source, op.literal(), span)
                .into_iter()
                .filter(|position| op != Operator::Sub || !self.is_sign(span, *position))
                .collect();
            if positions.is_empty() {
                continue;
            }

            let mut segments = Vec::with_capacity(positions.len() + 1);
            let mut start = span.begin;
            for position in &positions {
                segments.push(Span::new(start, position.begin));
                start = position.end;
            }
            segments.push(Span::new(start, span.end));

            let mut operands = Vec::with_capacity(segments.len());
            for (index, segment) in segments.into_iter().enumerate() {
                if trim(self.source, segment).is_empty() {
                    let at = positions[index.min(positions.len() - 1)];
                    return Err(self.syntax(format!("missing operand for '{op}'"), at));
                }
                operands.push(self.expression(segment)?);
            }

            let id = self.register();
            for operand in &operands {
                self.attach(id, operand.id);
            }
            return Ok(Some(Expression {
                id,
                span,
                kind: ExprKind::Operator { op, operands },
            }));
        }
        Ok(None)
    }

    /// A `-` with nothing or another operator before it is a sign.
    fn is_sign(&self, span: Span, position: Span) -> bool {
        let before = self.text_of(Span::new(span.begin, position.begin)).trim_end();
        match before.chars().last() {
            None => true,
            Some(c) => SIGN_CONTEXT.contains(&c),
        }
    }

    fn not(&mut self, span: Span) -> Result<Option<Expression>, ParseError> {
        let text = self.text_of(span);
        if !text.starts_with(token::NOT) {
            return Ok(None);
        }
        let operand = self.expression(Span::new(span.begin + token::NOT.len(), span.end))?;
        let id = self.register();
        self.attach(id, operand.id);
        Ok(Some(Expression {
            id,
            span,
            kind: ExprKind::Not(Box::new(operand)),
        }))
    }

    fn parenthesis(&mut self, span: Span) -> Result<Option<Expression>, ParseError> {
        if !self.text_of(span).starts_with(token::ARGS_OPEN) {
            return Ok(None);
        }
        let close = self.expr.block_end(
            self.source,
            token::ARGS_OPEN,
            token::ARGS_CLOSE,
            span.begin,
            span,
            true,
        );
        if !close.is_found() {
            return Err(self.unclosed("(", ")", Span::new(span.begin, span.begin + 1)));
        }
        if close.end != span.end {
            return Ok(None);
        }
        let inner = self.expression(Span::new(span.begin + 1, close.begin))?;
        let id = self.register();
        self.attach(id, inner.id);
        Ok(Some(Expression {
            id,
            span,
            kind: ExprKind::Parenthesis(Box::new(inner)),
        }))
    }

    fn literal(&self, span: Span) -> Option<Literal> {
        let text = self.text_of(span);
        match text {
            token::KW_TRUE => return Some(Literal::Bool(true)),
            token::KW_FALSE => return Some(Literal::Bool(false)),
            token::KW_NULL => return Some(Literal::Null),
            _ => {}
        }
        if text.starts_with(token::QUOTE) {
            let quote = token::QUOTE.to_string();
            let close = self
                .expr
                .block_end(self.source, &quote, &quote, span.begin, span, false);
            if close.is_found() && close.end == span.end {
                return Some(Literal::Text(unescape(&text[1..text.len() - 1])));
            }
            return None;
        }
        parse_number(text)
    }

    fn call_chain(&mut self, span: Span) -> Result<Expression, ParseError> {
        let segments: Vec<Span> = self
            .expr
            .split(self.source, token::CALL_SEPARATOR, span)
            .into_iter()
            .map(|segment| trim(self.source, segment))
            .collect();
        if let Some(empty) = segments.iter().find(|segment| segment.is_empty()) {
            return Err(self.syntax("empty call in chain", *empty));
        }

        let mut receiver = None;
        let mut rest = &segments[..];
        if segments.len() > 1 && !self.text_of(segments[0]).starts_with(is_ident_char) {
            receiver = Some(Box::new(self.expression(segments[0])?));
            rest = &segments[1..];
        }
        let mut calls = Vec::with_capacity(rest.len());
        for segment in rest {
            calls.push(self.call(*segment)?);
        }

        let id = self.register();
        if let Some(receiver) = &receiver {
            self.attach(id, receiver.id);
        }
        for call in &calls {
            self.attach(id, call.id);
        }
        Ok(Expression {
            id,
            span,
            kind: ExprKind::Chain(CallChain { receiver, calls }),
        })
    }

    fn call(&mut self, span: Span) -> Result<Call, ParseError> {
        let text = self.text_of(span);
        let head_len = text
            .find(|c| c == '(' || c == '[')
            .unwrap_or(text.len());
        let head_span = trim(self.source, Span::new(span.begin, span.begin + head_len));
        let head = self.text_of(head_span);

        let (prefix, name) = match head.split_once(token::PREFIX_SEPARATOR) {
            Some((prefix, name)) => (Some(prefix.trim()), name.trim()),
            None => (None, head),
        };
        for part in prefix.iter().chain(std::iter::once(&name)) {
            if !token::is_identifier(part) {
                return Err(ParseError::InvalidIdentifier {
                    name: head.to_string(),
                    span: head_span,
                    location: self.location(head_span.begin),
                });
            }
        }
        if token::is_reserved_word(name) {
            return Err(ParseError::ReservedWord {
                word: name.to_string(),
                span: head_span,
                location: self.location(head_span.begin),
            });
        }

        let mut pos = span.begin + head_len;
        let mut args = Vec::new();
        let mut parenthesized = false;
        if self.text_of(Span::new(pos, span.end)).starts_with(token::ARGS_OPEN) {
            let close = self.expr.block_end(
                self.source,
                token::ARGS_OPEN,
                token::ARGS_CLOSE,
                pos,
                span,
                true,
            );
            if !close.is_found() {
                return Err(self.unclosed("(", ")", Span::new(pos, pos + 1)));
            }
            parenthesized = true;
            let inner = Span::new(pos + 1, close.begin);
            if !trim(self.source, inner).is_empty() {
                for arg in self.expr.split(self.source, token::ARG_SEPARATOR, inner) {
                    args.push(self.expression(arg)?);
                }
            }
            pos = trim(self.source, Span::new(close.end, span.end)).begin;
        }

        let mut filter = None;
        if self.text_of(Span::new(pos, span.end)).starts_with(token::FILTER_OPEN) {
            let close = self.expr.block_end(
                self.source,
                token::FILTER_OPEN,
                token::FILTER_CLOSE,
                pos,
                span,
                true,
            );
            if !close.is_found() {
                return Err(self.unclosed("[", "]", Span::new(pos, pos + 1)));
            }
            filter = Some(Box::new(self.expression(Span::new(pos + 1, close.begin))?));
            pos = trim(self.source, Span::new(close.end, span.end)).begin;
        }

        if pos < span.end {
            return Err(self.syntax(
                format!("unexpected '{}' after call", self.text_of(Span::new(pos, span.end))),
                Span::new(pos, span.end),
            ));
        }

        let kind = match (prefix, name, args.len()) {
            (None, token::CALL_LOOP_INDEX, 0) => CallKind::LoopIndex,
            (None, token::CALL_ARGUMENT, 1) => CallKind::Argument,
            (None, token::CALL_USER_CODE_BEGIN, 0) => CallKind::UserCodeBegin,
            (None, token::CALL_USER_CODE_END, 0) => CallKind::UserCodeEnd,
            _ => CallKind::Link,
        };

        let id = self.register();
        for arg in &args {
            self.attach(id, arg.id);
        }
        if let Some(filter) = &filter {
            self.attach(id, filter.id);
        }
        Ok(Call {
            id,
            span,
            prefix: prefix.map(str::to_string),
            name: name.to_string(),
            kind,
            args,
            filter,
            parenthesized,
        })
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Parse the statements of `span` into a sequence.
    pub fn statement(&mut self, span: Span) -> Result<Statement, ParseError> {
        let end = span.end;
        let mut items = Vec::new();
        let mut text = String::new();
        let mut text_start = span.begin;
        let mut pos = span.begin;

        while pos < end {
            let found = self.text.find(self.source, token::TAG_OPEN, Span::new(pos, end));
            if !found.is_found() {
                text.push_str(self.text_of(Span::new(pos, end)));
                break;
            }
            text.push_str(self.text_of(Span::new(pos, found.begin)));
            let rest = self.text_of(Span::new(found.begin, end));

            let parsed = if rest.starts_with(token::COMMENT_BEGIN) {
                Some(self.comment(found.begin, end)?)
            } else if opens_keyword(rest, token::FOR_BEGIN) {
                Some(self.for_block(found.begin, end)?)
            } else if opens_keyword(rest, token::IF_BEGIN) {
                Some(self.if_block(found.begin, end)?)
            } else if let Some(tag) = stray_tag(rest) {
                return Err(ParseError::UnexpectedTag {
                    tag: tag.to_string(),
                    span: Span::new(found.begin, found.begin + tag.len()),
                    location: self.location(found.begin),
                });
            } else {
                self.feature(found.begin, end)?
            };

            match parsed {
                Some((statement, next)) => {
                    self.flush_text(&mut items, &mut text, text_start, found.begin);
                    items.push(statement);
                    pos = next;
                    text_start = next;
                }
                None => {
                    // Not a tag: the bracket is literal text.
                    text.push_str(token::TAG_OPEN);
                    pos = found.end;
                }
            }
        }
        self.flush_text(&mut items, &mut text, text_start, end);

        let id = self.register();
        for item in &items {
            self.attach(id, item.id);
        }
        Ok(Statement {
            id,
            span,
            kind: StmtKind::Sequence(items),
        })
    }

    fn flush_text(&mut self, items: &mut Vec<Statement>, text: &mut String, begin: usize, end: usize) {
        if text.is_empty() {
            return;
        }
        let id = self.register();
        items.push(Statement {
            id,
            span: Span::new(begin, end),
            kind: StmtKind::Text(unescape_text(&std::mem::take(text))),
        });
    }

    /// `[expr/]`, or `None` when the bracket does not open a feature.
    fn feature(&mut self, start: usize, end: usize) -> Result<Option<(Statement, usize)>, ParseError> {
        let close = self.tag_close(start, end);
        if !close.is_found() || close.begin <= start + 1 {
            return Ok(None);
        }
        let body_end = close.begin - 1;
        if self.text_of(Span::new(body_end, close.begin)) != "/" {
            return Ok(None);
        }
        let expr = self.expression(Span::new(start + token::TAG_OPEN.len(), body_end))?;
        let id = self.register();
        self.attach(id, expr.id);
        Ok(Some((
            Statement {
                id,
                span: Span::new(start, close.end),
                kind: StmtKind::Feature(expr),
            },
            close.end,
        )))
    }

    fn comment(&mut self, start: usize, end: usize) -> Result<(Statement, usize), ParseError> {
        let close = self.block.block_end(
            self.source,
            token::COMMENT_BEGIN,
            token::COMMENT_END,
            start,
            Span::new(start, end),
            true,
        );
        if !close.is_found() {
            return Err(self.unclosed(
                token::COMMENT_BEGIN,
                token::COMMENT_END,
                Span::new(start, start + token::COMMENT_BEGIN.len()),
            ));
        }
        let body = self.text_of(Span::new(start + token::COMMENT_BEGIN.len(), close.begin));
        let id = self.register();
        Ok((
            Statement {
                id,
                span: Span::new(start, close.end),
                kind: StmtKind::Comment(body.to_string()),
            },
            close.end,
        ))
    }

    fn for_block(&mut self, start: usize, end: usize) -> Result<(Statement, usize), ParseError> {
        let header = self.tag_close(start, end);
        if !header.is_found() {
            return Err(self.unclosed(token::FOR_BEGIN, token::TAG_CLOSE, Span::new(start, start + token::FOR_BEGIN.len())));
        }
        let condition = self.header_condition(start + token::FOR_BEGIN.len(), header.begin, token::FOR_BEGIN)?;

        let close = self.block.pair_end(
            self.source,
            &Pair::keyword(token::FOR_BEGIN, token::FOR_END),
            start,
            Span::new(start, end),
        );
        if !close.is_found() {
            return Err(self.unclosed(token::FOR_BEGIN, token::FOR_END, Span::new(start, header.end)));
        }
        let body = self.statement(Span::new(header.end, close.begin))?;

        let id = self.register();
        self.attach(id, condition.id);
        self.attach(id, body.id);
        Ok((
            Statement {
                id,
                span: Span::new(start, close.end),
                kind: StmtKind::For {
                    condition,
                    body: Box::new(body),
                },
            },
            close.end,
        ))
    }

    fn if_block(&mut self, start: usize, end: usize) -> Result<(Statement, usize), ParseError> {
        let header = self.tag_close(start, end);
        if !header.is_found() {
            return Err(self.unclosed(token::IF_BEGIN, token::TAG_CLOSE, Span::new(start, start + token::IF_BEGIN.len())));
        }
        let condition = self.header_condition(start + token::IF_BEGIN.len(), header.begin, token::IF_BEGIN)?;

        let close = self.block.pair_end(
            self.source,
            &Pair::keyword(token::IF_BEGIN, token::IF_END),
            start,
            Span::new(start, end),
        );
        if !close.is_found() {
            return Err(self.unclosed(token::IF_BEGIN, token::IF_END, Span::new(start, header.end)));
        }

        // Branch markers at this nesting level, in source order.
        let body_end = close.begin;
        let mut markers: Vec<(bool, Span)> = Vec::new();
        let mut cursor = header.end;
        while cursor < body_end {
            let Some((index, at)) = self.branches.find_any(
                self.source,
                &[token::ELSE_IF, token::ELSE],
                Span::new(cursor, body_end),
            ) else {
                break;
            };
            let is_else_if = index == 0;
            let rest = self.text_of(Span::new(at.begin, body_end));
            if is_else_if && !opens_keyword(rest, token::ELSE_IF) {
                cursor = at.end;
                continue;
            }
            markers.push((is_else_if, at));
            cursor = at.end;
        }

        let mut then_end = body_end;
        if let Some((_, first)) = markers.first() {
            then_end = first.begin;
        }
        let then_branch = self.statement(Span::new(header.end, then_end))?;

        let mut else_ifs = Vec::new();
        let mut else_branch = None;
        for (index, (is_else_if, at)) in markers.iter().enumerate() {
            let section_end = markers.get(index + 1).map_or(body_end, |(_, next)| next.begin);
            if else_branch.is_some() {
                return Err(ParseError::UnexpectedTag {
                    tag: self.text_of(*at).to_string(),
                    span: *at,
                    location: self.location(at.begin),
                });
            }
            if *is_else_if {
                let tag_close = self.tag_close(at.begin, section_end);
                if !tag_close.is_found() {
                    return Err(self.unclosed(token::ELSE_IF, token::TAG_CLOSE, *at));
                }
                let condition = self.header_condition(at.end, tag_close.begin, token::ELSE_IF)?;
                let body = self.statement(Span::new(tag_close.end, section_end))?;
                else_ifs.push(ElseIf { condition, body });
            } else {
                else_branch = Some(Box::new(self.statement(Span::new(at.end, section_end))?));
            }
        }

        let id = self.register();
        self.attach(id, condition.id);
        self.attach(id, then_branch.id);
        for else_if in &else_ifs {
            self.attach(id, else_if.condition.id);
            self.attach(id, else_if.body.id);
        }
        if let Some(else_branch) = &else_branch {
            self.attach(id, else_branch.id);
        }
        Ok((
            Statement {
                id,
                span: Span::new(start, close.end),
                kind: StmtKind::If(IfBlock {
                    condition,
                    then_branch: Box::new(then_branch),
                    else_ifs,
                    else_branch,
                }),
            },
            close.end,
        ))
    }

    /// Matching `]` of the tag opened at `start`.
    pub(crate) fn tag_close(&self, start: usize, end: usize) -> Span {
        self.expr.block_end(
            self.source,
            token::TAG_OPEN,
            token::TAG_CLOSE,
            start,
            Span::new(start, end),
            true,
        )
    }

    /// `(cond)` between a block keyword and the closing `]`.
    fn header_condition(&mut self, begin: usize, end: usize, construct: &'static str) -> Result<Expression, ParseError> {
        let inner = trim(self.source, Span::new(begin, end));
        let group = self.parenthesized(inner);
        match group {
            Some(condition) => self.expression(condition),
            None => Err(self.syntax(
                format!("'{construct}' expects a parenthesized condition"),
                Span::new(begin, end),
            )),
        }
    }

    /// Inside of `span` when it is exactly one balanced `( ... )` group.
    pub(crate) fn parenthesized(&self, span: Span) -> Option<Span> {
        if !span.is_found() || !self.text_of(span).starts_with(token::ARGS_OPEN) {
            return None;
        }
        let close = self.expr.block_end(
            self.source,
            token::ARGS_OPEN,
            token::ARGS_CLOSE,
            span.begin,
            span,
            true,
        );
        (close.is_found() && close.end == span.end).then(|| Span::new(span.begin + 1, close.begin))
    }
}

/// Does `rest` start with the keyword tag `keyword` (`[for`, `[if`, ...)?
pub(crate) fn opens_keyword(rest: &str, keyword: &str) -> bool {
    rest.starts_with(keyword) && !rest[keyword.len()..].starts_with(is_ident_char)
}

/// Closing or continuation tags that cannot start a statement.
fn stray_tag(rest: &str) -> Option<&'static str> {
    [token::FOR_END, token::IF_END, token::ELSE, token::COMMENT_END, token::TEMPLATE_END]
        .into_iter()
        .find(|tag| rest.starts_with(tag))
        .or_else(|| {
            [token::ELSE_IF, token::TEMPLATE_BEGIN, token::IMPORT, token::EXTENDS]
                .into_iter()
                .find(|tag| opens_keyword(rest, tag))
        })
}

fn parse_number(text: &str) -> Option<Literal> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if text.contains('.') {
        text.parse::<f64>().ok().map(Literal::Real)
    } else {
        text.parse::<i64>().ok().map(Literal::Int)
    }
}

/// Decode escapes of a string literal body.
pub(crate) fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != token::ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push(token::ESCAPE),
        }
    }
    out
}

/// Decode `\[` in template text.
fn unescape_text(text: &str) -> String {
    text.replace("\\[", "[")
}
