//! Expression parsing (Pratt parser)

use super::{Parser, Precedence};
use crate::ast::*;
use crate::diagnostic::codes;
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};

impl Parser {
    /// Parse an expression, including the conditional form `a if c else b`
    pub(super) fn parse_expression(&mut self) -> Result<Expr, ()> {
        let body = self.parse_precedence(Precedence::Lowest)?;
        if !self.match_token(TokenKind::If) {
            return Ok(body);
        }

        let test = self.parse_precedence(Precedence::Lowest)?;
        self.consume(TokenKind::Else, "expected 'else' after condition")?;
        let orelse = self.parse_expression()?;
        let span = body.span.merge(orelse.span);

        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            span,
        ))
    }

    /// Parse `expr, expr, ...`; more than one item (or a trailing comma)
    /// produces a tuple
    pub(super) fn parse_expression_list(&mut self) -> Result<Expr, ()> {
        let first = self.parse_item()?;
        if !self.check(TokenKind::Comma) {
            return self.unstarred(first);
        }

        let start = first.span;
        let mut items = vec![first];
        while self.match_token(TokenKind::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.parse_item()?);
        }

        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    /// Parse one item of a tuple or list display, which may be `*iterable`
    fn parse_item(&mut self) -> Result<Expr, ()> {
        match self.parse_starred()? {
            Some(starred) => Ok(starred),
            None => self.parse_expression(),
        }
    }

    /// Parse `*operand` if the next token is `*`
    fn parse_starred(&mut self) -> Result<Option<Expr>, ()> {
        if !self.check(TokenKind::Star) {
            return Ok(None);
        }
        let star = self.advance().span;
        let operand = self.parse_precedence(Precedence::Comparison)?;
        let span = star.merge(operand.span);
        Ok(Some(Expr::new(ExprKind::Starred(Box::new(operand)), span)))
    }

    /// Reject a starred item standing on its own
    fn unstarred(&mut self, expr: Expr) -> Result<Expr, ()> {
        if matches!(expr.kind, ExprKind::Starred(_)) {
            self.error_at(
                codes::INVALID_SYNTAX,
                "can't use starred expression here",
                expr.span,
            );
            return Err(());
        }
        Ok(expr)
    }

    /// Tokens that end an unparenthesized expression list
    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Semicolon
                | TokenKind::Equal
                | TokenKind::Colon
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::SlashSlashEqual
                | TokenKind::PercentEqual
        )
    }

    /// Parse an expression with operators binding tighter than `min`
    pub(super) fn parse_precedence(&mut self, min: Precedence) -> Result<Expr, ()> {
        self.nested(|p| {
            p.chained(|p, links| {
                let mut left = p.parse_prefix()?;
                while let Some(precedence) = p.infix_precedence() {
                    if precedence <= min {
                        break;
                    }
                    p.link(links)?;
                    left = p.parse_infix(left, precedence)?;
                }
                Ok(left)
            })
        })
    }

    /// Precedence of the current token as an infix operator
    fn infix_precedence(&self) -> Option<Precedence> {
        let precedence = match self.peek().kind {
            TokenKind::Or => Precedence::Or,
            TokenKind::And => Precedence::And,
            TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::In
            | TokenKind::Is => Precedence::Comparison,
            TokenKind::Not if self.peek_next().kind == TokenKind::In => Precedence::Comparison,
            TokenKind::Plus | TokenKind::Minus => Precedence::Term,
            TokenKind::Star | TokenKind::Slash | TokenKind::SlashSlash | TokenKind::Percent => {
                Precedence::Factor
            }
            TokenKind::StarStar => Precedence::Power,
            _ => return None,
        };
        Some(precedence)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ()> {
        let token = self.peek().clone();
        let op = match token.kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => {
                let atom = self.parse_atom()?;
                return self.parse_trailers(atom);
            }
        };

        self.advance();
        let operand_precedence = if op == UnaryOp::Not {
            Precedence::Not
        } else {
            Precedence::Unary
        };
        let operand = self.parse_precedence(operand_precedence)?;
        let span = token.span.merge(operand.span);

        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_infix(&mut self, left: Expr, precedence: Precedence) -> Result<Expr, ()> {
        match precedence {
            Precedence::Or | Precedence::And => {
                self.advance();
                let op = if precedence == Precedence::Or {
                    LogicalOp::Or
                } else {
                    LogicalOp::And
                };
                let right = self.parse_precedence(precedence)?;
                let span = left.span.merge(right.span);
                Ok(Expr::new(
                    ExprKind::Logical {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                ))
            }
            Precedence::Comparison => {
                let mut comparisons = Vec::new();
                while self.infix_precedence() == Some(Precedence::Comparison) {
                    let op = self.parse_compare_op();
                    let right = self.parse_precedence(Precedence::Comparison)?;
                    comparisons.push((op, right));
                }
                let end = comparisons.last().map(|(_, e)| e.span).unwrap_or(left.span);
                let span = left.span.merge(end);
                Ok(Expr::new(
                    ExprKind::Compare {
                        left: Box::new(left),
                        comparisons,
                    },
                    span,
                ))
            }
            _ => {
                let token = self.advance();
                let op = match token.kind {
                    TokenKind::Plus => BinaryOp::Add,
                    TokenKind::Minus => BinaryOp::Sub,
                    TokenKind::Star => BinaryOp::Mul,
                    TokenKind::Slash => BinaryOp::Div,
                    TokenKind::SlashSlash => BinaryOp::FloorDiv,
                    TokenKind::Percent => BinaryOp::Mod,
                    _ => BinaryOp::Pow,
                };
                // `**` is right-associative and accepts a signed right operand
                let right_precedence = if op == BinaryOp::Pow {
                    Precedence::Unary
                } else {
                    precedence
                };
                let right = self.parse_precedence(right_precedence)?;
                let span = left.span.merge(right.span);
                Ok(Expr::new(
                    ExprKind::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                ))
            }
        }
    }

    /// Consume a comparison operator (one or two tokens)
    fn parse_compare_op(&mut self) -> CompareOp {
        match self.advance().kind {
            TokenKind::EqualEqual => CompareOp::Eq,
            TokenKind::BangEqual => CompareOp::NotEq,
            TokenKind::Less => CompareOp::Lt,
            TokenKind::LessEqual => CompareOp::LtE,
            TokenKind::Greater => CompareOp::Gt,
            TokenKind::GreaterEqual => CompareOp::GtE,
            TokenKind::In => CompareOp::In,
            TokenKind::Not => {
                self.advance();
                CompareOp::NotIn
            }
            _ => {
                if self.match_token(TokenKind::Not) {
                    CompareOp::IsNot
                } else {
                    CompareOp::Is
                }
            }
        }
    }

    // === Atoms ===

    fn parse_atom(&mut self) -> Result<Expr, ()> {
        let token = self.peek().clone();
        let span = token.span;

        let kind = match token.kind {
            TokenKind::Int => {
                self.advance();
                match token.lexeme.parse::<i64>() {
                    Ok(value) => ExprKind::Literal(Literal::Int(value)),
                    Err(_) => {
                        self.error_at(codes::INVALID_SYNTAX, "invalid integer literal", span);
                        return Err(());
                    }
                }
            }
            TokenKind::Float => {
                self.advance();
                match token.lexeme.parse::<f64>() {
                    Ok(value) => ExprKind::Literal(Literal::Float(value)),
                    Err(_) => {
                        self.error_at(codes::INVALID_SYNTAX, "invalid float literal", span);
                        return Err(());
                    }
                }
            }
            TokenKind::String | TokenKind::Bytes | TokenKind::FString => {
                return self.parse_strings();
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::None => {
                self.advance();
                ExprKind::Literal(Literal::None)
            }
            TokenKind::Identifier => {
                self.advance();
                ExprKind::Name(token.lexeme)
            }
            TokenKind::LeftParen => {
                self.advance();
                return self.parse_paren(span);
            }
            TokenKind::LeftBracket => {
                self.advance();
                return self.parse_list(span);
            }
            TokenKind::LeftBrace => {
                self.advance();
                return self.parse_dict(span);
            }
            TokenKind::Reserved => {
                self.error_at(
                    codes::UNSUPPORTED,
                    &format!("'{}' is not supported", token.lexeme),
                    span,
                );
                return Err(());
            }
            _ => {
                self.error(codes::INVALID_SYNTAX, "invalid syntax");
                return Err(());
            }
        };

        Ok(Expr::new(kind, span))
    }

    /// Parse calls, subscripts, and attribute accesses following an atom
    fn parse_trailers(&mut self, expr: Expr) -> Result<Expr, ()> {
        self.chained(|p, links| p.parse_trailer_chain(expr, links))
    }

    fn parse_trailer_chain(&mut self, mut expr: Expr, links: &mut usize) -> Result<Expr, ()> {
        loop {
            if matches!(
                self.peek().kind,
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::Dot
            ) {
                self.link(links)?;
            }
            match self.peek().kind {
                TokenKind::LeftParen => {
                    self.advance();
                    expr = self.parse_call(expr)?;
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    self.consume(TokenKind::RightBracket, "expected ']'")?;
                    let span = self.span_from(expr.span);
                    expr = Expr::new(
                        ExprKind::Subscript {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.consume_identifier("an attribute name after '.'")?;
                    let span = self.span_from(expr.span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            object: Box::new(expr),
                            name: name.lexeme,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parse call arguments after `(`
    fn parse_call(&mut self, func: Expr) -> Result<Expr, ()> {
        let mut args: Vec<Expr> = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while !self.check(TokenKind::RightParen) {
            if self.check(TokenKind::Star) || self.check(TokenKind::StarStar) {
                self.error(codes::UNSUPPORTED, "argument unpacking is not supported");
                return Err(());
            }

            if self.check(TokenKind::Identifier) && self.peek_next().kind == TokenKind::Equal {
                let name = self.advance();
                self.advance();
                let value = self.parse_expression()?;
                if kwargs.iter().any(|(k, _)| *k == name.lexeme) {
                    self.error_at(
                        codes::INVALID_SYNTAX,
                        &format!("keyword argument repeated: {}", name.lexeme),
                        name.span,
                    );
                    return Err(());
                }
                kwargs.push((name.lexeme, value));
            } else {
                if !kwargs.is_empty() {
                    self.error(
                        codes::INVALID_SYNTAX,
                        "positional argument follows keyword argument",
                    );
                    return Err(());
                }
                let mut arg = self.parse_expression()?;
                if self.check(TokenKind::For) {
                    let generators = self.parse_comprehension_clauses()?;
                    let span = self.span_from(arg.span);
                    arg = Expr::new(
                        ExprKind::ListComp {
                            element: Box::new(arg),
                            generators,
                        },
                        span,
                    );
                    if !args.is_empty() || !self.check(TokenKind::RightParen) {
                        self.error_at(
                            codes::INVALID_SYNTAX,
                            "generator expression must be parenthesized",
                            span,
                        );
                        return Err(());
                    }
                }
                args.push(arg);
            }

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RightParen, "expected ')' after arguments")?;
        let span = self.span_from(func.span);

        Ok(Expr::new(
            ExprKind::Call {
                func: Box::new(func),
                args,
                kwargs,
            },
            span,
        ))
    }

    /// Parse the index inside `[...]`: an expression, a tuple, or a slice
    fn parse_subscript(&mut self) -> Result<Expr, ()> {
        let start = self.peek().span;
        let mut lower = None;

        if !self.check(TokenKind::Colon) {
            let first = self.parse_expression()?;
            if !self.check(TokenKind::Colon) {
                if !self.check(TokenKind::Comma) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.match_token(TokenKind::Comma) {
                    if self.check(TokenKind::RightBracket) {
                        break;
                    }
                    items.push(self.parse_expression()?);
                }
                return Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)));
            }
            lower = Some(Box::new(first));
        }

        self.consume(TokenKind::Colon, "expected ':'")?;
        let upper = if self.check(TokenKind::Colon) || self.check(TokenKind::RightBracket) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.match_token(TokenKind::Colon) && !self.check(TokenKind::RightBracket) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        Ok(Expr::new(
            ExprKind::Slice { lower, upper, step },
            self.span_from(start),
        ))
    }

    /// Parse `( ... )`: grouping, tuple, or generator expression
    fn parse_paren(&mut self, start: Span) -> Result<Expr, ()> {
        if self.match_token(TokenKind::RightParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), self.span_from(start)));
        }

        let first = self.parse_item()?;

        if self.check(TokenKind::For) {
            let first = self.comprehension_element(first)?;
            let generators = self.parse_comprehension_clauses()?;
            self.consume(TokenKind::RightParen, "expected ')'")?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    element: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }

        if !self.check(TokenKind::Comma) {
            self.consume(TokenKind::RightParen, "expected ')'")?;
            return self.unstarred(first);
        }

        let mut items = vec![first];
        while self.match_token(TokenKind::Comma) {
            if self.check(TokenKind::RightParen) {
                break;
            }
            items.push(self.parse_item()?);
        }
        self.consume(TokenKind::RightParen, "expected ')'")?;

        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    /// Parse `[ ... ]`: list display or list comprehension
    fn parse_list(&mut self, start: Span) -> Result<Expr, ()> {
        if self.match_token(TokenKind::RightBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), self.span_from(start)));
        }

        let first = self.parse_item()?;

        if self.check(TokenKind::For) {
            let first = self.comprehension_element(first)?;
            let generators = self.parse_comprehension_clauses()?;
            self.consume(TokenKind::RightBracket, "expected ']'")?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    element: Box::new(first),
                    generators,
                },
                self.span_from(start),
            ));
        }

        let mut items = vec![first];
        while self.match_token(TokenKind::Comma) {
            if self.check(TokenKind::RightBracket) {
                break;
            }
            items.push(self.parse_item()?);
        }
        self.consume(TokenKind::RightBracket, "expected ']'")?;

        Ok(Expr::new(ExprKind::List(items), self.span_from(start)))
    }

    /// Parse `{ ... }`: dict display or dict comprehension
    fn parse_dict(&mut self, start: Span) -> Result<Expr, ()> {
        if self.match_token(TokenKind::RightBrace) {
            return Ok(Expr::new(ExprKind::Dict(Vec::new()), self.span_from(start)));
        }

        self.reject_dict_unpacking()?;
        let key = self.parse_expression()?;
        if !self.check(TokenKind::Colon) {
            self.error(codes::UNSUPPORTED, "set displays are not supported");
            return Err(());
        }
        self.advance();
        let value = self.parse_expression()?;

        if self.check(TokenKind::For) {
            let generators = self.parse_comprehension_clauses()?;
            self.consume(TokenKind::RightBrace, "expected '}'")?;
            return Ok(Expr::new(
                ExprKind::DictComp {
                    key: Box::new(key),
                    value: Box::new(value),
                    generators,
                },
                self.span_from(start),
            ));
        }

        let mut entries = vec![(key, value)];
        while self.match_token(TokenKind::Comma) {
            if self.check(TokenKind::RightBrace) {
                break;
            }
            self.reject_dict_unpacking()?;
            let key = self.parse_expression()?;
            self.consume(TokenKind::Colon, "expected ':' after dict key")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
        }
        self.consume(TokenKind::RightBrace, "expected '}'")?;

        Ok(Expr::new(ExprKind::Dict(entries), self.span_from(start)))
    }

    fn reject_dict_unpacking(&mut self) -> Result<(), ()> {
        if self.check(TokenKind::StarStar) {
            self.error(codes::UNSUPPORTED, "dict unpacking in displays is not supported");
            return Err(());
        }
        Ok(())
    }

    fn comprehension_element(&mut self, element: Expr) -> Result<Expr, ()> {
        if matches!(element.kind, ExprKind::Starred(_)) {
            self.error_at(
                codes::INVALID_SYNTAX,
                "iterable unpacking cannot be used in comprehension",
                element.span,
            );
            return Err(());
        }
        Ok(element)
    }

    /// Parse one or more `for target in iter [if cond]...` clauses
    pub(super) fn parse_comprehension_clauses(&mut self) -> Result<Vec<Comprehension>, ()> {
        let mut generators = Vec::new();

        while self.match_token(TokenKind::For) {
            let target = self.parse_target_list()?;
            self.consume(TokenKind::In, "expected 'in'")?;
            let iter = self.parse_precedence(Precedence::Lowest)?;
            let mut conditions = Vec::new();
            while self.match_token(TokenKind::If) {
                conditions.push(self.parse_precedence(Precedence::Lowest)?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }

        Ok(generators)
    }

    /// Parse a loop target such as `x` or `key, value`
    pub(super) fn parse_target_list(&mut self) -> Result<Target, ()> {
        let start = self.peek().span;
        let first = self.parse_target_item()?;
        if !self.check(TokenKind::Comma) {
            return self.to_target(first);
        }

        let mut items = vec![first];
        while self.match_token(TokenKind::Comma) {
            if self.check(TokenKind::In) {
                break;
            }
            items.push(self.parse_target_item()?);
        }

        let tuple = Expr::new(ExprKind::Tuple(items), self.span_from(start));
        self.to_target(tuple)
    }

    fn parse_target_item(&mut self) -> Result<Expr, ()> {
        match self.parse_starred()? {
            Some(starred) => Ok(starred),
            None => self.parse_precedence(Precedence::Comparison),
        }
    }

    /// Convert a parsed expression into an assignment target
    pub(super) fn to_target(&mut self, expr: Expr) -> Result<Target, ()> {
        self.target_for(expr, "assign to")
    }

    /// Convert a parsed expression into a target for `verb` (`assign to`, `delete`)
    pub(super) fn target_for(&mut self, expr: Expr, verb: &str) -> Result<Target, ()> {
        let span = expr.span;
        match expr.kind {
            ExprKind::Name(name) => Ok(Target::Name(name, span)),
            ExprKind::Subscript { object, index } => Ok(Target::Subscript {
                object,
                index,
                span,
            }),
            ExprKind::Attribute { object, name } => Ok(Target::Attribute { object, name, span }),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                let starred = items
                    .iter()
                    .filter(|item| matches!(item.kind, ExprKind::Starred(_)))
                    .count();
                if starred > 1 && verb != "delete" {
                    self.error_at(
                        codes::INVALID_TARGET,
                        "multiple starred expressions in assignment",
                        span,
                    );
                    return Err(());
                }
                let targets = items
                    .into_iter()
                    .map(|item| self.target_item(item, verb))
                    .collect::<Result<Vec<_>, ()>>()?;
                Ok(Target::Tuple(targets, span))
            }
            ExprKind::Starred(_) => {
                let message = if verb == "delete" {
                    "cannot delete starred"
                } else {
                    "starred assignment target must be in a list or tuple"
                };
                self.error_at(codes::INVALID_TARGET, message, span);
                Err(())
            }
            other => {
                let what = match other {
                    ExprKind::Literal(_) => "literal",
                    ExprKind::Call { .. } => "function call",
                    ExprKind::Compare { .. } => "comparison",
                    ExprKind::IfExp { .. } => "conditional expression",
                    ExprKind::FString(_) => "f-string expression",
                    ExprKind::ListComp { .. } => "list comprehension",
                    ExprKind::DictComp { .. } => "dict comprehension",
                    ExprKind::Dict(_) => "dict literal",
                    _ => "expression",
                };
                self.error_at(
                    codes::INVALID_TARGET,
                    &format!("cannot {} {}", verb, what),
                    span,
                );
                Err(())
            }
        }
    }

    /// Convert one element of an unpacking target
    fn target_item(&mut self, expr: Expr, verb: &str) -> Result<Target, ()> {
        let span = expr.span;
        match expr.kind {
            ExprKind::Starred(inner) if verb != "delete" => {
                let inner = self.target_for(*inner, verb)?;
                Ok(Target::Starred(Box::new(inner), span))
            }
            kind => self.target_for(Expr::new(kind, span), verb),
        }
    }

    // === String literals ===

    /// Parse one or more adjacent string literals
    fn parse_strings(&mut self) -> Result<Expr, ()> {
        let start = self.peek().span;
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut bytes: Vec<u8> = Vec::new();
        let mut has_bytes = false;
        let mut has_text = false;
        let mut formatted = false;

        while matches!(
            self.peek().kind,
            TokenKind::String | TokenKind::Bytes | TokenKind::FString
        ) {
            let token = self.advance();
            match token.kind {
                TokenKind::Bytes => {
                    has_bytes = true;
                    bytes.extend(token.lexeme.chars().map(|c| c as u32 as u8));
                }
                TokenKind::FString => {
                    has_text = true;
                    formatted = true;
                    self.parse_fstring(&token, &mut parts)?;
                }
                _ => {
                    has_text = true;
                    push_text(&mut parts, &token.lexeme);
                }
            }
        }

        let span = self.span_from(start);

        if has_bytes && has_text {
            self.error_at(
                codes::INVALID_SYNTAX,
                "cannot mix bytes and nonbytes literals",
                span,
            );
            return Err(());
        }

        let kind = if has_bytes {
            ExprKind::Literal(Literal::Bytes(bytes.into()))
        } else if formatted {
            ExprKind::FString(parts)
        } else {
            let text: String = parts
                .into_iter()
                .map(|part| match part {
                    FStringPart::Text(text) => text,
                    FStringPart::Field { .. } => String::new(),
                })
                .collect();
            ExprKind::Literal(Literal::Str(text.into()))
        };

        Ok(Expr::new(kind, span))
    }

    /// Split an f-string body into text and replacement fields
    fn parse_fstring(&mut self, token: &Token, parts: &mut Vec<FStringPart>) -> Result<(), ()> {
        let chars: Vec<char> = token.lexeme.chars().collect();
        let mut text = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '{' {
                if chars.get(i + 1) == Some(&'{') {
                    text.push('{');
                    i += 2;
                    continue;
                }
                push_text(parts, &text);
                text.clear();
                let (end, field) = self.parse_fstring_field(&chars, i + 1, token.span)?;
                parts.push(field);
                i = end + 1;
                continue;
            }
            if c == '}' {
                if chars.get(i + 1) == Some(&'}') {
                    text.push('}');
                    i += 2;
                    continue;
                }
                self.error_at(
                    codes::INVALID_SYNTAX,
                    "f-string: single '}' is not allowed",
                    token.span,
                );
                return Err(());
            }
            text.push(c);
            i += 1;
        }

        push_text(parts, &text);
        Ok(())
    }

    /// Parse one `{expr[!conv][:spec]}` field starting after the `{`.
    ///
    /// Returns the index of the closing `}` and the field.
    fn parse_fstring_field(
        &mut self,
        chars: &[char],
        start: usize,
        span: Span,
    ) -> Result<(usize, FStringPart), ()> {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut expr_end = None;
        let mut j = start;

        while j < chars.len() {
            let c = chars[j];
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                j += 1;
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                '}' if depth > 0 => depth -= 1,
                '}' | ':' if depth == 0 => {
                    expr_end = Some(j);
                    break;
                }
                '!' if depth == 0 && chars.get(j + 1) != Some(&'=') => {
                    expr_end = Some(j);
                    break;
                }
                _ => {}
            }
            j += 1;
        }

        let Some(expr_end) = expr_end else {
            self.error_at(codes::INVALID_SYNTAX, "f-string: expecting '}'", span);
            return Err(());
        };

        let expr_text: String = chars[start..expr_end].iter().collect();
        if expr_text.trim().is_empty() {
            self.error_at(
                codes::INVALID_SYNTAX,
                "f-string: empty expression not allowed",
                span,
            );
            return Err(());
        }

        let mut j = expr_end;
        let mut conversion = None;
        if chars.get(j) == Some(&'!') {
            match chars.get(j + 1) {
                Some(c @ ('r' | 's' | 'a')) => conversion = Some(*c),
                _ => {
                    self.error_at(
                        codes::INVALID_SYNTAX,
                        "f-string: invalid conversion character",
                        span,
                    );
                    return Err(());
                }
            }
            j += 2;
        }

        let mut spec = String::new();
        if chars.get(j) == Some(&':') {
            j += 1;
            while j < chars.len() && chars[j] != '}' {
                if chars[j] == '{' {
                    self.error_at(
                        codes::UNSUPPORTED,
                        "f-string: nested replacement fields are not supported",
                        span,
                    );
                    return Err(());
                }
                spec.push(chars[j]);
                j += 1;
            }
        }

        if chars.get(j) != Some(&'}') {
            self.error_at(codes::INVALID_SYNTAX, "f-string: expecting '}'", span);
            return Err(());
        }

        let expr = self.parse_embedded(expr_text.trim(), span)?;
        Ok((
            j,
            FStringPart::Field {
                expr,
                conversion,
                spec,
            },
        ))
    }

    /// Parse the expression inside an f-string field
    fn parse_embedded(&mut self, text: &str, span: Span) -> Result<Expr, ()> {
        let (mut tokens, diagnostics) = Lexer::new(text).tokenize();
        if let Some(diag) = diagnostics.first() {
            self.error_at(
                codes::INVALID_SYNTAX,
                &format!("f-string: {}", diag.message),
                span,
            );
            return Err(());
        }
        for token in &mut tokens {
            token.span = span;
        }

        let mut sub = Parser::new(tokens);
        sub.depth = self.depth;
        let result = sub.parse_expression_list();
        let complete = sub.check(TokenKind::Newline) || sub.is_at_end();
        let failed = !sub.diagnostics.is_empty();
        self.diagnostics.append(&mut sub.diagnostics);

        match result {
            Ok(expr) if complete => Ok(expr),
            _ => {
                if !failed {
                    self.error_at(codes::INVALID_SYNTAX, "f-string: invalid syntax", span);
                }
                Err(())
            }
        }
    }
}

/// Append literal text, merging with a preceding text part
fn push_text(parts: &mut Vec<FStringPart>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(FStringPart::Text(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FStringPart::Text(text.to_string()));
    }
}
