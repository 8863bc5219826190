//! Parsing (tokens to AST)
//!
//! The parser converts a stream of tokens into an Abstract Syntax Tree (AST).
//! Uses Pratt parsing for expressions and recursive descent for statements.

mod expr;
mod stmt;

use crate::ast::*;
use crate::diagnostic::{codes, Diagnostic};
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Deepest expression or block nesting accepted before giving up
const MAX_NESTING: usize = 100;

/// Parser state for building AST from tokens
pub struct Parser {
    pub(super) tokens: Vec<Token>,
    pub(super) current: usize,
    pub(super) diagnostics: Vec<Diagnostic>,
    /// Current expression/block nesting
    pub(super) depth: usize,
    /// Enclosing loops in the current function (for `break`/`continue`)
    pub(super) loop_depth: usize,
    /// Enclosing function definitions (for `return`)
    pub(super) function_depth: usize,
}

/// Operator precedence levels for Pratt parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    Lowest,
    Or,         // or
    And,        // and
    Not,        // not
    Comparison, // == != < <= > >= in not in is is not
    Term,       // + -
    Factor,     // * / // %
    Unary,      // -x +x
    Power,      // **
}

/// Lex and parse a whole script
///
/// Returns every diagnostic (lexer first) when the source does not compile.
pub fn parse_program(source: &str) -> Result<Program, Vec<Diagnostic>> {
    let (tokens, mut diagnostics) = Lexer::new(source).tokenize();
    let (program, parse_diagnostics) = Parser::new(tokens).parse();
    diagnostics.extend(parse_diagnostics);

    if diagnostics.is_empty() {
        Ok(program)
    } else {
        Err(diagnostics)
    }
}

impl Parser {
    /// Create a new parser for the given tokens
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", span));
        }
        Self {
            tokens,
            current: 0,
            diagnostics: Vec::new(),
            depth: 0,
            loop_depth: 0,
            function_depth: 0,
        }
    }

    /// Parse tokens into an AST
    pub fn parse(&mut self) -> (Program, Vec<Diagnostic>) {
        let mut body = Vec::new();

        while !self.is_at_end() {
            // Stray dedents only appear after error recovery
            if self.match_token(TokenKind::Dedent) || self.match_token(TokenKind::Newline) {
                continue;
            }
            match self.parse_statement() {
                Ok(stmts) => body.extend(stmts),
                Err(_) => self.synchronize(),
            }
        }

        (Program { body }, std::mem::take(&mut self.diagnostics))
    }

    /// Run `f` one nesting level deeper, failing once the limit is hit
    pub(super) fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ()>,
    ) -> Result<T, ()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(codes::TOO_DEEP, "too many nested expressions or blocks"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Run `f`, which builds a left-nested chain in a loop and calls
    /// [`Parser::link`] once per level it adds
    ///
    /// Each link holds one nesting level until `f` returns, so long
    /// operator or trailer chains share the limit with bracketed nesting.
    pub(super) fn chained<T>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut usize) -> Result<T, ()>,
    ) -> Result<T, ()> {
        let mut links = 0;
        let result = f(self, &mut links);
        self.depth -= links;
        result
    }

    /// Take one nesting level for the chain being built by [`Parser::chained`]
    pub(super) fn link(&mut self, links: &mut usize) -> Result<(), ()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(codes::TOO_DEEP, "too many nested expressions or blocks"));
        }
        self.depth += 1;
        *links += 1;
        Ok(())
    }

    // === Token navigation ===

    /// Current token
    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    /// Token after the current one
    pub(super) fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    /// Most recently consumed token
    pub(super) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    /// Consume the current token and return it
    pub(super) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(super) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(super) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a token of the given kind or record `message`
    pub(super) fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, ()> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(codes::INVALID_SYNTAX, message))
        }
    }

    /// Consume an identifier
    pub(super) fn consume_identifier(&mut self, what: &str) -> Result<Token, ()> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance())
        } else {
            Err(self.error(codes::INVALID_SYNTAX, &format!("expected {}", what)))
        }
    }

    /// Span from `start` through the last consumed token
    pub(super) fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous().span)
    }

    // === Diagnostics ===

    /// Record an error at the current token
    pub(super) fn error(&mut self, code: &str, message: &str) {
        let token = self.peek().clone();
        // The lexer already reported this one
        if token.kind == TokenKind::Error {
            return;
        }
        let label = match token.kind {
            TokenKind::Eof | TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent => {
                token.kind.describe().to_string()
            }
            _ => format!("found '{}'", token.lexeme),
        };
        self.diagnostics
            .push(Diagnostic::error_with_code(code, message, token.span).with_label(label));
    }

    /// Record an error at a specific span
    pub(super) fn error_at(&mut self, code: &str, message: &str, span: Span) {
        self.diagnostics.push(Diagnostic::error_with_code(code, message, span));
    }

    /// Record an indentation error at the current token
    pub(super) fn indentation_error(&mut self, code: &str, message: &str) {
        let span = self.peek().span;
        self.diagnostics.push(Diagnostic::indentation(code, message, span));
    }

    /// Skip to the start of the next statement after an error
    fn synchronize(&mut self) {
        let mut depth: i32 = 0;
        while !self.is_at_end() {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => depth -= 1,
                TokenKind::Newline
                    if depth <= 0
                        && !matches!(self.peek().kind, TokenKind::Indent | TokenKind::Dedent) =>
                {
                    return;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse_ok(source: &str) -> Program {
        match parse_program(source) {
            Ok(program) => program,
            Err(diags) => panic!("unexpected diagnostics: {:?}", diags),
        }
    }

    fn first_error(source: &str) -> String {
        match parse_program(source) {
            Ok(_) => panic!("expected a syntax error for {:?}", source),
            Err(diags) => diags[0].to_string(),
        }
    }

    fn single_expr(source: &str) -> ExprKind {
        let program = parse_ok(source);
        match &program.body[0].kind {
            StmtKind::Expr(expr) => expr.kind.clone(),
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let ExprKind::Binary { op, right, .. } = single_expr("1 + 2 * 3\n") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        let ExprKind::Unary { op, operand } = single_expr("-2 ** 2\n") else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Neg);
        assert!(matches!(operand.kind, ExprKind::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn test_chained_comparison() {
        let ExprKind::Compare { comparisons, .. } = single_expr("a < b <= c not in d\n") else {
            panic!("expected compare");
        };
        let ops: Vec<CompareOp> = comparisons.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![CompareOp::Lt, CompareOp::LtE, CompareOp::NotIn]);
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let ExprKind::Unary { op, operand } = single_expr("not a == b\n") else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Not);
        assert!(matches!(operand.kind, ExprKind::Compare { .. }));
    }

    #[test]
    fn test_conditional_expression() {
        assert!(matches!(single_expr("a if c else b\n"), ExprKind::IfExp { .. }));
    }

    #[test]
    fn test_tuple_unpacking_assignment() {
        let program = parse_ok("a, b = 1, 2\n");
        let StmtKind::Assign { targets, value } = &program.body[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(&targets[0], Target::Tuple(items, _) if items.len() == 2));
        assert!(matches!(value.kind, ExprKind::Tuple(_)));
    }

    #[test]
    fn test_starred_unpacking_target() {
        let program = parse_ok("first, *rest = items\n");
        let StmtKind::Assign { targets, .. } = &program.body[0].kind else {
            panic!("expected assignment");
        };
        let Target::Tuple(items, _) = &targets[0] else {
            panic!("expected tuple target");
        };
        assert!(matches!(&items[1], Target::Starred(inner, _) if matches!(**inner, Target::Name(..))));
    }

    #[test]
    fn test_loop_else_and_assert() {
        let program = parse_ok("for x in y:\n    pass\nelse:\n    z = 1\nassert z, 'missing'\n");
        assert!(matches!(&program.body[0].kind, StmtKind::For { orelse, .. } if orelse.len() == 1));
        assert!(matches!(
            &program.body[1].kind,
            StmtKind::Assert {
                message: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_chained_assignment() {
        let program = parse_ok("a = b = 1\n");
        let StmtKind::Assign { targets, .. } = &program.body[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let program = parse_ok("x = 1; y = 2; print(x)\n");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_function_locals_and_globals() {
        let program = parse_ok(
            "def f(a, b=2):\n    global total\n    total = a\n    c = b\n    for i in range(3):\n        pass\n",
        );
        let StmtKind::FunctionDef(def) = &program.body[0].kind else {
            panic!("expected def");
        };
        assert!(def.locals.contains("a"));
        assert!(def.locals.contains("c"));
        assert!(def.locals.contains("i"));
        assert!(!def.locals.contains("total"));
        assert!(def.globals.contains("total"));
        assert!(def.params[1].default.is_some());
    }

    #[test]
    fn test_list_comprehension_with_condition() {
        let kind = single_expr("[x * 2 for x in xs if x > 1]\n");
        let ExprKind::ListComp { generators, .. } = kind else {
            panic!("expected comprehension");
        };
        assert_eq!(generators[0].conditions.len(), 1);
    }

    #[test]
    fn test_generator_argument() {
        let ExprKind::Call { args, .. } = single_expr("sum(x for x in xs)\n") else {
            panic!("expected call");
        };
        assert!(matches!(args[0].kind, ExprKind::ListComp { .. }));
    }

    #[test]
    fn test_slices() {
        let ExprKind::Subscript { index, .. } = single_expr("s[1:-1:2]\n") else {
            panic!("expected subscript");
        };
        assert!(matches!(
            index.kind,
            ExprKind::Slice { lower: Some(_), upper: Some(_), step: Some(_) }
        ));
    }

    #[test]
    fn test_fstring_parts() {
        let ExprKind::FString(parts) = single_expr("f'a{{b}} {x + 1:.2f}!'\n") else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], FStringPart::Text("a{b} ".to_string()));
        assert!(matches!(&parts[1], FStringPart::Field { spec, .. } if spec == ".2f"));
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        assert_eq!(
            single_expr("'ab' \"cd\"\n"),
            ExprKind::Literal(Literal::Str("abcd".into()))
        );
    }

    #[test]
    fn test_try_except_else() {
        let program = parse_ok(
            "try:\n    x = 1\nexcept (ValueError, KeyError) as e:\n    pass\nexcept:\n    pass\nelse:\n    y = 2\n",
        );
        let StmtKind::Try { handlers, orelse, .. } = &program.body[0].kind else {
            panic!("expected try");
        };
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn test_single_line_block() {
        let program = parse_ok("if x: y = 1; z = 2\nw = 3\n");
        let StmtKind::If { branches, .. } = &program.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches[0].1.len(), 2);
        assert_eq!(program.body.len(), 2);
    }

    #[rstest]
    #[case("x = \n", "SyntaxError: invalid syntax (line 1)")]
    #[case("if x\n    y = 1\n", "SyntaxError: expected ':' (line 1)")]
    #[case("if x:\ny = 1\n", "IndentationError: expected an indented block (line 2)")]
    #[case("  x = 1\n", "IndentationError: unexpected indent (line 1)")]
    #[case("1 = x\n", "SyntaxError: cannot assign to literal (line 1)")]
    #[case("f() = 1\n", "SyntaxError: cannot assign to function call (line 1)")]
    #[case("break\n", "SyntaxError: 'break' outside loop (line 1)")]
    #[case("return 1\n", "SyntaxError: 'return' outside function (line 1)")]
    #[case("class A:\n    pass\n", "SyntaxError: 'class' is not supported (line 1)")]
    #[case("f = lambda: 1\n", "SyntaxError: 'lambda' is not supported (line 1)")]
    #[case("x = {1, 2}\n", "SyntaxError: set displays are not supported (line 1)")]
    #[case("def f(a=1, b):\n    pass\n", "SyntaxError: non-default argument follows default argument (line 1)")]
    #[case("f(a=1, 2)\n", "SyntaxError: positional argument follows keyword argument (line 1)")]
    #[case("try:\n    pass\nfinally:\n    pass\n", "SyntaxError: 'finally' is not supported (line 3)")]
    #[case("def f(*args):\n    pass\n", "SyntaxError: variadic parameters are not supported (line 1)")]
    #[case("f(*xs)\n", "SyntaxError: argument unpacking is not supported (line 1)")]
    #[case("x = {**d}\n", "SyntaxError: dict unpacking in displays is not supported (line 1)")]
    #[case("x = *a\n", "SyntaxError: can't use starred expression here (line 1)")]
    #[case("x = [*a for a in b]\n", "SyntaxError: iterable unpacking cannot be used in comprehension (line 1)")]
    #[case("a, *b, *c = [1]\n", "SyntaxError: multiple starred expressions in assignment (line 1)")]
    #[case("for *a in b:\n    pass\n", "SyntaxError: starred assignment target must be in a list or tuple (line 1)")]
    #[case("del *a, b\n", "SyntaxError: cannot delete starred (line 1)")]
    #[case("while x:\n    pass\nelse:\n    break\n", "SyntaxError: 'break' outside loop (line 4)")]
    #[case("x = f'{}'\n", "SyntaxError: f-string: empty expression not allowed (line 1)")]
    fn test_syntax_errors(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(first_error(source), expected);
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("x = {}1{}\n", "(".repeat(500), ")".repeat(500));
        let message = first_error(&source);
        assert!(message.contains("too many nested"), "{}", message);
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let source = format!("x = 1{}\n", " + 1".repeat(5_000));
        let message = first_error(&source);
        assert!(message.contains("too many nested"), "{}", message);
    }

    #[test]
    fn test_long_trailer_chain_is_rejected() {
        let source = format!("x = a{}\n", "[0]".repeat(5_000));
        let message = first_error(&source);
        assert!(message.contains("too many nested"), "{}", message);
    }

    #[test]
    fn test_short_operator_chain_is_accepted() {
        let source = format!("x = 1{}\n", " + 1".repeat(50));
        assert!(parse_program(&source).is_ok());
    }

    #[test]
    fn test_error_recovery_reports_first_error_line() {
        let source = "a = 1\nb = = 2\nc = 3\n";
        let diags = parse_program(source).unwrap_err();
        assert_eq!(diags[0].line(), 2);
    }
}
