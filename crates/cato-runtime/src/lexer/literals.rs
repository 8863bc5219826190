//! Literal parsing for the lexer

use crate::diagnostic::codes;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// String prefix flags (`r`, `b`, `f` and their combinations)
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct StringFlags {
    pub(super) raw: bool,
    pub(super) bytes: bool,
    pub(super) format: bool,
}

impl StringFlags {
    /// Interpret an identifier directly followed by a quote as a prefix
    pub(super) fn from_prefix(prefix: &str) -> Option<Self> {
        let lower = prefix.to_ascii_lowercase();
        let flags = match lower.as_str() {
            "u" => Self::default(),
            "r" => Self { raw: true, ..Self::default() },
            "b" => Self { bytes: true, ..Self::default() },
            "f" => Self { format: true, ..Self::default() },
            "rb" | "br" => Self { raw: true, bytes: true, format: false },
            "rf" | "fr" => Self { raw: true, bytes: false, format: true },
            _ => return None,
        };
        Some(flags)
    }
}

impl Lexer {
    /// Scan a string literal whose opening quote has been consumed
    pub(super) fn string(&mut self, quote: char, flags: StringFlags) -> Token {
        let triple = self.peek() == quote && self.peek_next() == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut value = String::new();
        let mut field_depth = 0usize;
        let mut error_token = None;

        loop {
            if self.is_at_end() {
                return self.error_unterminated_string(triple);
            }

            let c = self.peek();

            if c == '\n' && !triple {
                return self.error_unterminated_string(triple);
            }

            if c == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
                value.push(self.advance());
                continue;
            }

            if flags.format {
                if c == '{' {
                    if field_depth == 0 && self.peek_next() == Some('{') {
                        value.push(self.advance());
                        value.push(self.advance());
                        continue;
                    }
                    field_depth += 1;
                } else if c == '}' && field_depth > 0 {
                    field_depth -= 1;
                }
            }

            if c == '\\' {
                self.advance();
                if self.is_at_end() {
                    return self.error_unterminated_string(triple);
                }

                if flags.raw || field_depth > 0 {
                    // Backslash still protects the quote from ending the literal
                    value.push('\\');
                    value.push(self.advance());
                    continue;
                }

                if let Err(message) = self.read_escape(&mut value, flags.bytes) {
                    if error_token.is_none() {
                        error_token = Some(self.error_token(codes::INVALID_ESCAPE, &message));
                    }
                }
                continue;
            }

            if flags.bytes && !c.is_ascii() {
                if error_token.is_none() {
                    error_token = Some(self.error_token(
                        codes::INVALID_ESCAPE,
                        "bytes can only contain ASCII literal characters",
                    ));
                }
                self.advance();
                continue;
            }

            value.push(self.advance());
        }

        if let Some(err) = error_token {
            return err;
        }

        let kind = if flags.bytes {
            TokenKind::Bytes
        } else if flags.format {
            TokenKind::FString
        } else {
            TokenKind::String
        };
        self.make_token(kind, &value)
    }

    /// Decode one escape sequence (the backslash is already consumed)
    fn read_escape(&mut self, out: &mut String, bytes: bool) -> Result<(), String> {
        let c = self.advance();
        let decoded = match c {
            // Escaped newline continues the literal on the next line
            '\n' => return Ok(()),
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().to_digit(8) {
                        Some(d) if !self.is_at_end() => {
                            code = code * 8 + d;
                            self.advance();
                        }
                        _ => break,
                    }
                }
                if bytes && code > 0xff {
                    return Err("octal escape value out of range".to_string());
                }
                char::from_u32(code).ok_or_else(|| "invalid octal escape".to_string())?
            }
            'x' => {
                let code = self.read_hex(2, 'x')?;
                char::from_u32(code).ok_or_else(|| "invalid \\x escape".to_string())?
            }
            'u' if !bytes => {
                let code = self.read_hex(4, 'u')?;
                char::from_u32(code).ok_or_else(|| "invalid \\u escape".to_string())?
            }
            'U' if !bytes => {
                let code = self.read_hex(8, 'U')?;
                char::from_u32(code).ok_or_else(|| "illegal Unicode character".to_string())?
            }
            other => {
                out.push('\\');
                other
            }
        };
        out.push(decoded);
        Ok(())
    }

    fn read_hex(&mut self, digits: usize, escape: char) -> Result<u32, String> {
        let mut code = 0u32;
        for _ in 0..digits {
            match self.peek_at(0).and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    code = code * 16 + d;
                    self.advance();
                }
                None => return Err(format!("truncated \\{}{} escape", escape, "X".repeat(digits))),
            }
        }
        Ok(code)
    }

    /// Scan a number literal (integer, float, or scientific notation)
    pub(super) fn number(&mut self) -> Token {
        let first = self.chars[self.start_pos];

        if first == '0' && matches!(self.peek(), 'x' | 'X' | 'o' | 'O' | 'b' | 'B') {
            let radix = match self.advance().to_ascii_lowercase() {
                'x' => 16,
                'o' => 8,
                _ => 2,
            };
            let mut digits = String::new();
            while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
                let c = self.advance();
                if c != '_' {
                    digits.push(c);
                }
            }
            return match i64::from_str_radix(&digits, radix) {
                Ok(value) => self.make_token(TokenKind::Int, &value.to_string()),
                Err(_) => self.error_token(codes::INVALID_NUMBER, "invalid integer literal"),
            };
        }

        let mut text = String::new();
        text.push(first);
        let mut is_float = first == '.';
        self.consume_digits(&mut text);

        if !is_float && self.peek() == '.' && !self.is_at_end() {
            is_float = true;
            text.push(self.advance());
            self.consume_digits(&mut text);
        }

        if matches!(self.peek(), 'e' | 'E') {
            let has_exponent = match self.peek_next() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+') | Some('-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if has_exponent {
                is_float = true;
                self.advance();
                text.push('e');
                if matches!(self.peek(), '+' | '-') {
                    text.push(self.advance());
                }
                self.consume_digits(&mut text);
            }
        }

        if !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
                self.advance();
            }
            return self.error_token(codes::INVALID_NUMBER, "invalid decimal literal");
        }

        if is_float {
            return self.make_token(TokenKind::Float, &text);
        }

        if text.len() > 1 && text.starts_with('0') && text.chars().any(|c| c != '0') {
            return self.error_token(
                codes::INVALID_NUMBER,
                "leading zeros in decimal integer literals are not permitted",
            );
        }

        match text.parse::<i64>() {
            Ok(value) => self.make_token(TokenKind::Int, &value.to_string()),
            Err(_) => self.error_token(codes::INVALID_NUMBER, "integer literal is too large"),
        }
    }

    /// Consume digits, dropping `_` separators
    fn consume_digits(&mut self, text: &mut String) {
        while !self.is_at_end() {
            let c = self.peek();
            if c.is_ascii_digit() {
                text.push(self.advance());
            } else if c == '_' && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Report an unterminated string literal
    fn error_unterminated_string(&mut self, triple: bool) -> Token {
        let message = if triple {
            "unterminated triple-quoted string literal"
        } else {
            "unterminated string literal"
        };
        self.error_token(codes::UNTERMINATED_STRING, message)
    }
}
