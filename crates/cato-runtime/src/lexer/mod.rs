//! Lexical analysis (tokenization)
//!
//! The lexer converts script source into a stream of tokens with span
//! information. Block structure is resolved here: leading whitespace turns
//! into INDENT/DEDENT tokens, line breaks inside brackets are ignored and a
//! trailing `\` joins two physical lines.

use crate::diagnostic::{codes, Diagnostic};
use crate::span::Span;
use crate::token::{Token, TokenKind};

mod literals;

/// Deepest block nesting accepted
const MAX_INDENT_LEVELS: usize = 100;

/// Lexer state for tokenizing source code
pub struct Lexer {
    /// Characters of source code
    pub(super) chars: Vec<char>,
    /// Current position in chars
    pub(super) current: usize,
    /// Current line number (1-indexed)
    pub(super) line: u32,
    /// Start position of current token
    pub(super) start_pos: usize,
    /// Start line of current token
    pub(super) start_line: u32,
    /// Collected diagnostics
    pub(super) diagnostics: Vec<Diagnostic>,
    /// Widths of the open indentation levels, always starting with 0
    indent_stack: Vec<usize>,
    /// Open `(`, `[` and `{` count
    paren_depth: usize,
    /// Next scan begins a physical line
    at_line_start: bool,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str) -> Self {
        let chars: Vec<char> = source.replace("\r\n", "\n").chars().collect();
        Self {
            chars,
            current: 0,
            line: 1,
            start_pos: 0,
            start_line: 1,
            diagnostics: Vec::new(),
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
        }
    }

    /// Tokenize the source code, returning tokens and any diagnostics
    pub fn tokenize(&mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens: Vec<Token> = Vec::new();

        loop {
            if self.at_line_start {
                self.at_line_start = false;
                if self.paren_depth == 0 && self.scan_indentation(&mut tokens) {
                    continue;
                }
            }

            self.skip_whitespace_and_comments();

            self.start_pos = self.current;
            self.start_line = self.line;

            if self.is_at_end() {
                self.finish(&mut tokens);
                break;
            }

            if self.peek() == '\n' {
                self.advance();
                let after_statement = tokens
                    .last()
                    .is_some_and(|t| t.kind != TokenKind::Newline);
                if after_statement {
                    tokens.push(self.make_token(TokenKind::Newline, "\n"));
                }
                self.at_line_start = true;
                continue;
            }

            let token = self.next_token();
            tokens.push(token);
        }

        (tokens, std::mem::take(&mut self.diagnostics))
    }

    /// Measure leading whitespace and emit INDENT/DEDENT tokens.
    ///
    /// Returns true when the line was blank or comment-only and has been
    /// consumed entirely.
    fn scan_indentation(&mut self, tokens: &mut Vec<Token>) -> bool {
        let mut width = 0usize;
        while !self.is_at_end() {
            match self.peek() {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\r' | '\x0c' => {}
                _ => break,
            }
            self.advance();
        }

        if self.is_at_end() {
            return true;
        }

        match self.peek() {
            '\n' => {
                self.advance();
                self.at_line_start = true;
                return true;
            }
            '#' => {
                while !self.is_at_end() && self.peek() != '\n' {
                    self.advance();
                }
                if !self.is_at_end() {
                    self.advance();
                    self.at_line_start = true;
                }
                return true;
            }
            _ => {}
        }

        self.start_pos = self.current;
        self.start_line = self.line;
        let current = self.current_indent();

        if width > current {
            if self.indent_stack.len() > MAX_INDENT_LEVELS {
                let token = self.error_token(codes::TOO_DEEP, "too many levels of indentation");
                tokens.push(token);
            }
            self.indent_stack.push(width);
            tokens.push(self.make_token(TokenKind::Indent, ""));
        } else if width < current {
            while self.current_indent() > width {
                self.indent_stack.pop();
                tokens.push(self.make_token(TokenKind::Dedent, ""));
            }
            if self.current_indent() != width {
                let span = self.current_span();
                self.diagnostics.push(
                    Diagnostic::indentation(
                        codes::BAD_DEDENT,
                        "unindent does not match any outer indentation level",
                        span,
                    )
                    .with_label("inconsistent dedent"),
                );
                tokens.push(Token::new(TokenKind::Error, "", span));
                self.indent_stack.push(width);
            }
        }

        false
    }

    /// Close the final line and any open blocks
    fn finish(&mut self, tokens: &mut Vec<Token>) {
        let needs_newline = tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Dedent));
        if needs_newline {
            tokens.push(self.make_token(TokenKind::Newline, ""));
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            tokens.push(self.make_token(TokenKind::Dedent, ""));
        }
        tokens.push(self.make_token(TokenKind::Eof, ""));
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    /// Scan the next token
    fn next_token(&mut self) -> Token {
        let c = self.advance();

        match c {
            // Brackets
            '(' => self.open(TokenKind::LeftParen, "("),
            '[' => self.open(TokenKind::LeftBracket, "["),
            '{' => self.open(TokenKind::LeftBrace, "{"),
            ')' => self.close(TokenKind::RightParen, ")"),
            ']' => self.close(TokenKind::RightBracket, "]"),
            '}' => self.close(TokenKind::RightBrace, "}"),

            // Single-character tokens
            ',' => self.make_token(TokenKind::Comma, ","),
            ':' => self.make_token(TokenKind::Colon, ":"),
            ';' => self.make_token(TokenKind::Semicolon, ";"),

            // Operators with potential compound forms
            '+' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::PlusEqual, "+=")
                } else {
                    self.make_token(TokenKind::Plus, "+")
                }
            }
            '-' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::MinusEqual, "-=")
                } else {
                    self.make_token(TokenKind::Minus, "-")
                }
            }
            '*' => {
                if self.match_char('*') {
                    self.make_token(TokenKind::StarStar, "**")
                } else if self.match_char('=') {
                    self.make_token(TokenKind::StarEqual, "*=")
                } else {
                    self.make_token(TokenKind::Star, "*")
                }
            }
            '/' => {
                if self.match_char('/') {
                    if self.match_char('=') {
                        self.make_token(TokenKind::SlashSlashEqual, "//=")
                    } else {
                        self.make_token(TokenKind::SlashSlash, "//")
                    }
                } else if self.match_char('=') {
                    self.make_token(TokenKind::SlashEqual, "/=")
                } else {
                    self.make_token(TokenKind::Slash, "/")
                }
            }
            '%' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::PercentEqual, "%=")
                } else {
                    self.make_token(TokenKind::Percent, "%")
                }
            }

            // Comparison and assignment
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual, "==")
                } else {
                    self.make_token(TokenKind::Equal, "=")
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual, "!=")
                } else {
                    self.error_token(codes::UNEXPECTED_CHARACTER, "invalid syntax")
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual, "<=")
                } else {
                    self.make_token(TokenKind::Less, "<")
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual, ">=")
                } else {
                    self.make_token(TokenKind::Greater, ">")
                }
            }

            // Attribute access or a float like `.5`
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.number()
                } else {
                    self.make_token(TokenKind::Dot, ".")
                }
            }

            // String literals
            '"' | '\'' => self.string(c, literals::StringFlags::default()),

            // Numbers
            c if c.is_ascii_digit() => self.number(),

            // Identifiers, keywords and prefixed strings
            c if c.is_alphabetic() || c == '_' => self.identifier(),

            '\\' => self.error_token(
                codes::UNEXPECTED_CHARACTER,
                "unexpected character after line continuation character",
            ),
            '@' | '&' | '|' | '^' | '~' => self.error_token(
                codes::UNEXPECTED_CHARACTER,
                &format!("operator '{}' is not supported", c),
            ),

            _ => self.error_token(
                codes::UNEXPECTED_CHARACTER,
                &format!("invalid character '{}'", c),
            ),
        }
    }

    fn open(&mut self, kind: TokenKind, lexeme: &str) -> Token {
        self.paren_depth += 1;
        self.make_token(kind, lexeme)
    }

    fn close(&mut self, kind: TokenKind, lexeme: &str) -> Token {
        self.paren_depth = self.paren_depth.saturating_sub(1);
        self.make_token(kind, lexeme)
    }

    /// Scan an identifier, keyword, or a string with a prefix such as `f"..."`
    fn identifier(&mut self) -> Token {
        while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            self.advance();
        }

        let text: String = self.chars[self.start_pos..self.current].iter().collect();

        if matches!(self.peek(), '"' | '\'') {
            if let Some(flags) = literals::StringFlags::from_prefix(&text) {
                let quote = self.advance();
                return self.string(quote, flags);
            }
        }

        match TokenKind::keyword(&text) {
            Some(kind) => self.make_token(kind, &text),
            None => self.make_token(TokenKind::Identifier, &text),
        }
    }

    /// Skip spaces, comments, line continuations, and newlines inside brackets
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            if self.is_at_end() {
                return;
            }

            match self.peek() {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance();
                }
                '#' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                '\n' if self.paren_depth > 0 => {
                    self.advance();
                }
                '\\' if self.peek_next() == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                _ => return,
            }
        }
    }

    // === Character navigation ===

    /// Advance to next character and return it
    pub(super) fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
        }
        c
    }

    /// Peek at current character without advancing
    pub(super) fn peek(&self) -> char {
        self.peek_at(0).unwrap_or('\0')
    }

    /// Peek at next character (current + 1)
    pub(super) fn peek_next(&self) -> Option<char> {
        self.peek_at(1)
    }

    /// Peek `offset` characters ahead
    pub(super) fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.current + offset).copied()
    }

    /// Check if current character matches expected, and advance if so
    fn match_char(&mut self, expected: char) -> bool {
        if self.peek_at(0) == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Check if we've reached the end of source
    pub(super) fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    // === Token creation ===

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current.max(self.start_pos + 1),
            self.start_line,
        )
    }

    /// Create a token with the given kind and lexeme
    pub(super) fn make_token(&self, kind: TokenKind, lexeme: &str) -> Token {
        Token::new(
            kind,
            lexeme,
            Span::new(self.start_pos, self.current, self.start_line),
        )
    }

    /// Create an error token and record a diagnostic
    pub(super) fn error_token(&mut self, code: &str, message: &str) -> Token {
        let span = self.current_span();
        self.diagnostics
            .push(Diagnostic::error_with_code(code, message, span).with_label("lexer error"));
        Token::new(TokenKind::Error, message, span)
    }
}
