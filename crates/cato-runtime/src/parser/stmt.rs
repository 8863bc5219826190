//! Statement parsing

use super::Parser;
use crate::ast::*;
use crate::diagnostic::codes;
use crate::token::TokenKind;
use std::collections::HashSet;
use std::rc::Rc;

impl Parser {
    /// Parse one logical line (possibly several `;`-separated statements)
    /// or one compound statement
    pub(super) fn parse_statement(&mut self) -> Result<Vec<Stmt>, ()> {
        match self.peek().kind {
            TokenKind::If => Ok(vec![self.parse_if()?]),
            TokenKind::While => Ok(vec![self.parse_while()?]),
            TokenKind::For => Ok(vec![self.parse_for()?]),
            TokenKind::Def => Ok(vec![self.parse_function()?]),
            TokenKind::Try => Ok(vec![self.parse_try()?]),
            TokenKind::Indent => {
                self.indentation_error(codes::UNEXPECTED_INDENT, "unexpected indent");
                Err(())
            }
            _ => self.parse_simple_line(),
        }
    }

    /// Parse `stmt; stmt; ...` up to the end of the line
    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, ()> {
        let mut stmts = vec![self.parse_simple_statement()?];

        while self.match_token(TokenKind::Semicolon) {
            if self.check(TokenKind::Newline) || self.is_at_end() {
                break;
            }
            stmts.push(self.parse_simple_statement()?);
        }

        if !self.is_at_end() {
            self.consume(TokenKind::Newline, "invalid syntax")?;
        }
        Ok(stmts)
    }

    /// Parse the `: body` of a compound statement
    pub(super) fn parse_block(&mut self) -> Result<Vec<Stmt>, ()> {
        self.consume(TokenKind::Colon, "expected ':'")?;

        if !self.check(TokenKind::Newline) {
            return self.parse_simple_line();
        }
        self.advance();

        if !self.check(TokenKind::Indent) {
            self.indentation_error(codes::EXPECTED_INDENT, "expected an indented block");
            return Err(());
        }
        self.advance();

        self.nested(|p| {
            let mut body = Vec::new();
            while !p.check(TokenKind::Dedent) && !p.is_at_end() {
                if p.match_token(TokenKind::Newline) {
                    continue;
                }
                body.extend(p.parse_statement()?);
            }
            p.match_token(TokenKind::Dedent);
            Ok(body)
        })
    }

    // === Compound statements ===

    fn parse_if(&mut self) -> Result<Stmt, ()> {
        let start = self.advance().span;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        let mut branches = vec![(condition, body)];

        while self.match_token(TokenKind::Elif) {
            let condition = self.parse_expression()?;
            let body = self.parse_block()?;
            branches.push((condition, body));
        }

        let orelse = if self.match_token(TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            span: self.span_from(start),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ()> {
        let start = self.advance().span;
        let condition = self.parse_expression()?;
        let body = self.parse_loop_body()?;
        let orelse = self.parse_loop_else()?;

        Ok(Stmt {
            kind: StmtKind::While {
                condition,
                body,
                orelse,
            },
            span: self.span_from(start),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ()> {
        let start = self.advance().span;
        let target = self.parse_target_list()?;
        self.consume(TokenKind::In, "expected 'in'")?;
        let iter = self.parse_expression_list()?;
        let body = self.parse_loop_body()?;
        let orelse = self.parse_loop_else()?;

        Ok(Stmt {
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            span: self.span_from(start),
        })
    }

    fn parse_loop_body(&mut self) -> Result<Vec<Stmt>, ()> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    /// `else:` block of a loop; it belongs to the enclosing scope, so
    /// `break` inside it targets an outer loop
    fn parse_loop_else(&mut self) -> Result<Vec<Stmt>, ()> {
        if self.match_token(TokenKind::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_function(&mut self) -> Result<Stmt, ()> {
        let start = self.advance().span;
        let name = self.consume_identifier("a function name")?.lexeme;
        self.consume(TokenKind::LeftParen, "expected '(' after function name")?;

        let mut params: Vec<Param> = Vec::new();
        while !self.check(TokenKind::RightParen) {
            if self.check(TokenKind::Star) || self.check(TokenKind::StarStar) {
                self.error(codes::UNSUPPORTED, "variadic parameters are not supported");
                return Err(());
            }

            let token = self.consume_identifier("a parameter name")?;
            if params.iter().any(|p| p.name == token.lexeme) {
                self.error_at(
                    codes::INVALID_SYNTAX,
                    &format!("duplicate argument '{}' in function definition", token.lexeme),
                    token.span,
                );
                return Err(());
            }

            // Annotations are accepted and ignored
            if self.match_token(TokenKind::Colon) {
                self.parse_expression()?;
            }

            let default = if self.match_token(TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    self.error_at(
                        codes::INVALID_SYNTAX,
                        "non-default argument follows default argument",
                        token.span,
                    );
                    return Err(());
                }
                None
            };

            params.push(Param {
                name: token.lexeme,
                default,
                span: self.span_from(token.span),
            });

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after parameters")?;

        // Return annotation `-> expr`
        if self.check(TokenKind::Minus) && self.peek_next().kind == TokenKind::Greater {
            self.advance();
            self.advance();
            self.parse_expression()?;
        }

        let enclosing_loops = std::mem::take(&mut self.loop_depth);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = enclosing_loops;
        let body = body?;

        let mut locals = HashSet::new();
        let mut globals = HashSet::new();
        collect_bindings(&body, &mut locals, &mut globals);

        for param in &params {
            if globals.contains(&param.name) {
                self.error_at(
                    codes::INVALID_SYNTAX,
                    &format!("name '{}' is parameter and global", param.name),
                    start,
                );
                return Err(());
            }
            locals.insert(param.name.clone());
        }
        locals.retain(|name| !globals.contains(name));

        let span = self.span_from(start);
        Ok(Stmt {
            kind: StmtKind::FunctionDef(Rc::new(FunctionDef {
                name,
                params,
                body,
                locals,
                globals,
                span,
            })),
            span,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ()> {
        let start = self.advance().span;
        let body = self.parse_block()?;
        self.reject_finally()?;

        let mut handlers: Vec<ExceptHandler> = Vec::new();
        while self.check(TokenKind::Except) {
            let handler_start = self.advance().span;
            if handlers.last().is_some_and(|h| h.types.is_none()) {
                self.error_at(
                    codes::INVALID_SYNTAX,
                    "default 'except:' must be last",
                    handler_start,
                );
                return Err(());
            }

            let types = if self.check(TokenKind::Colon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            let name = if self.match_token(TokenKind::As) {
                Some(self.consume_identifier("a name after 'as'")?.lexeme)
            } else {
                None
            };
            let body = self.parse_block()?;

            handlers.push(ExceptHandler {
                types,
                name,
                body,
                span: self.span_from(handler_start),
            });
        }

        if handlers.is_empty() {
            self.error(codes::INVALID_SYNTAX, "expected 'except' block");
            return Err(());
        }

        let orelse = if self.match_token(TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        self.reject_finally()?;

        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
            },
            span: self.span_from(start),
        })
    }

    fn reject_finally(&mut self) -> Result<(), ()> {
        if self.check(TokenKind::Reserved) && self.peek().lexeme == "finally" {
            self.error(codes::UNSUPPORTED, "'finally' is not supported");
            return Err(());
        }
        Ok(())
    }

    // === Simple statements ===

    fn parse_simple_statement(&mut self) -> Result<Stmt, ()> {
        let start = self.peek().span;

        let kind = match self.peek().kind {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                if self.loop_depth == 0 {
                    self.error(codes::MISPLACED, "'break' outside loop");
                    return Err(());
                }
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                if self.loop_depth == 0 {
                    self.error(codes::MISPLACED, "'continue' not properly in loop");
                    return Err(());
                }
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                if self.function_depth == 0 {
                    self.error(codes::MISPLACED, "'return' outside function");
                    return Err(());
                }
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expression_list()?))
                }
            }
            TokenKind::Global => {
                self.advance();
                let mut names = vec![self.consume_identifier("a name after 'global'")?.lexeme];
                while self.match_token(TokenKind::Comma) {
                    names.push(self.consume_identifier("a name after ','")?.lexeme);
                }
                StmtKind::Global(names)
            }
            TokenKind::Del => {
                self.advance();
                let expr = self.parse_expression_list()?;
                let targets = match expr {
                    Expr {
                        kind: ExprKind::Tuple(items),
                        ..
                    } => items
                        .into_iter()
                        .map(|item| self.target_for(item, "delete"))
                        .collect::<Result<Vec<_>, ()>>()?,
                    other => vec![self.target_for(other, "delete")?],
                };
                StmtKind::Del(targets)
            }
            TokenKind::Import => {
                self.advance();
                let mut names = vec![self.parse_import_alias(true)?];
                while self.match_token(TokenKind::Comma) {
                    names.push(self.parse_import_alias(true)?);
                }
                StmtKind::Import(names)
            }
            TokenKind::From => self.parse_from_import()?,
            TokenKind::Raise => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Raise(None)
                } else {
                    let exc = self.parse_expression()?;
                    // `raise X from Y`: the cause is evaluated for syntax only
                    if self.match_token(TokenKind::From) {
                        self.parse_expression()?;
                    }
                    StmtKind::Raise(Some(exc))
                }
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_expression()?;
                let message = if self.match_token(TokenKind::Comma) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                StmtKind::Assert { test, message }
            }
            TokenKind::Reserved => {
                let message = format!("'{}' is not supported", self.peek().lexeme);
                self.error(codes::UNSUPPORTED, &message);
                return Err(());
            }
            _ => self.parse_assignment_or_expression()?,
        };

        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn parse_assignment_or_expression(&mut self) -> Result<StmtKind, ()> {
        let first = self.parse_expression_list()?;

        if self.check(TokenKind::Equal) {
            let mut exprs = vec![first];
            while self.match_token(TokenKind::Equal) {
                exprs.push(self.parse_expression_list()?);
            }
            let Some(value) = exprs.pop() else {
                return Err(());
            };
            let targets = exprs
                .into_iter()
                .map(|expr| self.to_target(expr))
                .collect::<Result<Vec<_>, ()>>()?;
            return Ok(StmtKind::Assign { targets, value });
        }

        if let Some(op) = self.augmented_operator() {
            if !matches!(
                first.kind,
                ExprKind::Name(_) | ExprKind::Subscript { .. } | ExprKind::Attribute { .. }
            ) {
                self.error_at(
                    codes::INVALID_TARGET,
                    "illegal expression for augmented assignment",
                    first.span,
                );
                return Err(());
            }
            self.advance();
            let target = self.to_target(first)?;
            let value = self.parse_expression_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        // Annotated assignment `name: type [= value]`
        if self.match_token(TokenKind::Colon) {
            if !matches!(
                first.kind,
                ExprKind::Name(_) | ExprKind::Subscript { .. } | ExprKind::Attribute { .. }
            ) {
                self.error_at(
                    codes::INVALID_TARGET,
                    "illegal target for annotation",
                    first.span,
                );
                return Err(());
            }
            self.parse_expression()?;
            if !self.match_token(TokenKind::Equal) {
                return Ok(StmtKind::Pass);
            }
            let target = self.to_target(first)?;
            let value = self.parse_expression_list()?;
            return Ok(StmtKind::Assign {
                targets: vec![target],
                value,
            });
        }

        Ok(StmtKind::Expr(first))
    }

    fn augmented_operator(&self) -> Option<BinaryOp> {
        let op = match self.peek().kind {
            TokenKind::PlusEqual => BinaryOp::Add,
            TokenKind::MinusEqual => BinaryOp::Sub,
            TokenKind::StarEqual => BinaryOp::Mul,
            TokenKind::SlashEqual => BinaryOp::Div,
            TokenKind::SlashSlashEqual => BinaryOp::FloorDiv,
            TokenKind::PercentEqual => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// Parse `from module import name [as alias], ...`
    fn parse_from_import(&mut self) -> Result<StmtKind, ()> {
        self.advance();
        if self.check(TokenKind::Dot) {
            self.error(codes::UNSUPPORTED, "relative imports are not supported");
            return Err(());
        }
        let module = self.parse_dotted_name()?;
        self.consume(TokenKind::Import, "expected 'import'")?;

        if self.check(TokenKind::Star) {
            self.error(codes::UNSUPPORTED, "wildcard import is not supported");
            return Err(());
        }

        let parenthesized = self.match_token(TokenKind::LeftParen);
        let mut names = vec![self.parse_import_alias(false)?];
        while self.match_token(TokenKind::Comma) {
            if parenthesized && self.check(TokenKind::RightParen) {
                break;
            }
            names.push(self.parse_import_alias(false)?);
        }
        if parenthesized {
            self.consume(TokenKind::RightParen, "expected ')'")?;
        }

        Ok(StmtKind::ImportFrom { module, names })
    }

    fn parse_import_alias(&mut self, dotted: bool) -> Result<ImportAlias, ()> {
        let start = self.peek().span;
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.consume_identifier("a name to import")?.lexeme
        };
        let alias = if self.match_token(TokenKind::As) {
            Some(self.consume_identifier("a name after 'as'")?.lexeme)
        } else {
            None
        };
        Ok(ImportAlias {
            name,
            alias,
            span: self.span_from(start),
        })
    }

    fn parse_dotted_name(&mut self) -> Result<String, ()> {
        let mut name = self.consume_identifier("a module name")?.lexeme;
        while self.match_token(TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.consume_identifier("a module name")?.lexeme);
        }
        Ok(name)
    }
}
