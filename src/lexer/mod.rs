//! Lexical analysis for DSDL definition files.
//!
//! The lexer converts the text of one definition into a token stream.
//! DSDL is line-oriented, so line terminators are significant and are
//! emitted as [`TokenKind::Newline`] tokens; `#` comments are stripped.
//! Numeric literals are converted to exact values during scanning.

pub mod token;

use crate::diag::Diag;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;
use token::{Token, TokenKind};

/// Result of lexical analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct LexerResult {
    /// The tokens produced, including an EOF token at the end.
    pub tokens: Vec<Token>,
    /// Diagnostics encountered during scanning.
    pub diagnostics: Vec<Diag>,
}

/// Tokenizes one definition file.
pub fn tokenize(source: &str) -> LexerResult {
    Lexer::new(source).tokenize()
}

/// A lexical analyzer for DSDL source text.
///
/// The lexer scans character by character and continues after errors so
/// that one pass reports as much as possible; the parser stops at the
/// first error-severity diagnostic.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    tokens: Vec<Token>,
    diagnostics: Vec<Diag>,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Tokenizes the source text and returns the result.
    pub fn tokenize(mut self) -> LexerResult {
        while !self.is_at_end() {
            self.skip_blanks_and_comments();
            if self.is_at_end() {
                break;
            }
            self.scan_token();
        }

        let eof = self.source.len();
        self.tokens.push(Token::new(TokenKind::Eof, eof..eof, ""));

        LexerResult {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        }
    }

    fn scan_token(&mut self) {
        let start = self.pos;
        let ch = self.advance();

        match ch {
            '\n' => self.add_token(TokenKind::Newline, start),
            '\r' => {
                if self.match_char('\n') {
                    self.add_token(TokenKind::Newline, start);
                } else {
                    self.error(start, "stray carriage return without line feed");
                }
            }

            '(' => self.add_token(TokenKind::LParen, start),
            ')' => self.add_token(TokenKind::RParen, start),
            '[' => self.add_token(TokenKind::LBracket, start),
            ']' => self.add_token(TokenKind::RBracket, start),
            '{' => self.add_token(TokenKind::LBrace, start),
            '}' => self.add_token(TokenKind::RBrace, start),
            ',' => self.add_token(TokenKind::Comma, start),
            '@' => self.add_token(TokenKind::At, start),
            '+' => self.add_token(TokenKind::Plus, start),
            '^' => self.add_token(TokenKind::Caret, start),
            '%' => self.add_token(TokenKind::Percent, start),
            '.' => self.add_token(TokenKind::Dot, start),

            '*' => {
                if self.match_char('*') {
                    self.add_token(TokenKind::StarStar, start);
                } else {
                    self.add_token(TokenKind::Star, start);
                }
            }
            '/' => {
                if self.match_char('/') {
                    self.add_token(TokenKind::SlashSlash, start);
                } else {
                    self.add_token(TokenKind::Slash, start);
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenKind::PipePipe, start);
                } else {
                    self.add_token(TokenKind::Pipe, start);
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.add_token(TokenKind::AmpersandAmpersand, start);
                } else {
                    self.add_token(TokenKind::Ampersand, start);
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::EqEq, start);
                } else {
                    self.add_token(TokenKind::Assign, start);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEq, start);
                } else {
                    self.add_token(TokenKind::Bang, start);
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Le, start);
                } else {
                    self.add_token(TokenKind::Lt, start);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Ge, start);
                } else {
                    self.add_token(TokenKind::Gt, start);
                }
            }

            '-' => self.scan_dashes(start),
            '\'' | '"' => self.scan_string(start, ch),
            '0'..='9' => self.scan_number(start),
            'a'..='z' | 'A'..='Z' | '_' => self.scan_identifier_or_keyword(start),

            _ => self.error(start, format!("invalid character {ch:?}")),
        }
    }

    /// Scans a run of dashes: one is a minus sign, three or more form the
    /// service response marker. Two dashes match nothing in the grammar.
    fn scan_dashes(&mut self, start: usize) {
        let mut count = 1;
        while self.peek() == Some('-') {
            self.advance();
            count += 1;
        }
        match count {
            1 => self.add_token(TokenKind::Minus, start),
            2 => self.error(start, "unexpected '--'; the service marker is '---'"),
            _ => self.add_token(TokenKind::ServiceMarker, start),
        }
    }

    fn scan_identifier_or_keyword(&mut self, start: usize) {
        while matches!(self.peek(), Some('a'..='z' | 'A'..='Z' | '0'..='9' | '_')) {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        let kind = match text {
            "saturated" => TokenKind::Saturated,
            "truncated" => TokenKind::Truncated,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(text.into()),
        };
        self.add_token(kind, start);
    }

    fn scan_number(&mut self, start: usize) {
        // Radix prefixes only apply when '0' is the whole integer part,
        // so "0x" must be inspected before decimal scanning.
        if &self.source[start..self.pos] == "0" {
            let radix = match self.peek() {
                Some('b' | 'B') => Some(2),
                Some('o' | 'O') => Some(8),
                Some('x' | 'X') => Some(16),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                let digits_start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
                    self.advance();
                }
                let digits: String = self.source[digits_start..self.pos]
                    .chars()
                    .filter(|c| *c != '_')
                    .collect();
                match BigInt::parse_bytes(digits.as_bytes(), radix) {
                    Some(value) if !digits.is_empty() => {
                        self.add_token(TokenKind::IntegerLiteral(value), start);
                    }
                    _ => self.error(start, "malformed integer literal"),
                }
                return;
            }
        }

        while matches!(self.peek(), Some('0'..='9' | '_')) {
            self.advance();
        }
        let int_text: String = self.source[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();

        let mut frac_text = String::new();
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some('0'..='9')) {
            self.advance();
            let frac_start = self.pos;
            while matches!(self.peek(), Some('0'..='9' | '_')) {
                self.advance();
            }
            frac_text = self.source[frac_start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
        }

        let mut exponent: Option<i64> = None;
        if matches!(self.peek(), Some('e' | 'E')) {
            let after_e = self.peek_at(1);
            let exp_is_next = matches!(after_e, Some('0'..='9'))
                || (matches!(after_e, Some('+' | '-'))
                    && matches!(self.peek_at(2), Some('0'..='9')));
            if exp_is_next {
                self.advance();
                let negative = match self.peek() {
                    Some('-') => {
                        self.advance();
                        true
                    }
                    Some('+') => {
                        self.advance();
                        false
                    }
                    _ => false,
                };
                let exp_start = self.pos;
                while matches!(self.peek(), Some('0'..='9' | '_')) {
                    self.advance();
                }
                let exp_text: String = self.source[exp_start..self.pos]
                    .chars()
                    .filter(|c| *c != '_')
                    .collect();
                match exp_text.parse::<i64>() {
                    Ok(exp) if exp <= 16_384 => {
                        exponent = Some(if negative { -exp } else { exp });
                    }
                    _ => {
                        self.error(start, "exponent out of range");
                        return;
                    }
                }
            }
        }

        if frac_text.is_empty() && exponent.is_none() {
            match int_text.parse::<BigInt>() {
                Ok(value) => self.add_token(TokenKind::IntegerLiteral(value), start),
                Err(_) => self.error(start, "malformed integer literal"),
            }
            return;
        }

        match exact_real(&int_text, &frac_text, exponent.unwrap_or(0)) {
            Some(value) => self.add_token(TokenKind::RealLiteral(value), start),
            None => self.error(start, "malformed real literal"),
        }
    }

    fn scan_string(&mut self, start: usize, quote: char) {
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n' | '\r') => {
                    self.error(start, "unterminated string literal");
                    return;
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escape_start = self.pos;
                    match self.peek() {
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('r') => {
                            self.advance();
                            value.push('\r');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('0') => {
                            self.advance();
                            value.push('\0');
                        }
                        Some('\\' | '\'' | '"') => {
                            let c = self.advance();
                            value.push(c);
                        }
                        Some('u') => {
                            self.advance();
                            match self.scan_unicode_escape() {
                                Some(c) => value.push(c),
                                None => {
                                    self.error(escape_start, "invalid unicode escape");
                                    return;
                                }
                            }
                        }
                        _ => {
                            self.error(escape_start, "unsupported escape sequence");
                            return;
                        }
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }
        self.add_token(TokenKind::StringLiteral(value.into()), start);
    }

    /// Scans the `XXXX` of a `\uXXXX` escape. Surrogate code points are
    /// rejected; strings hold scalar values only.
    fn scan_unicode_escape(&mut self) -> Option<char> {
        let mut code: u32 = 0;
        for _ in 0..4 {
            let digit = self.peek()?.to_digit(16)?;
            self.advance();
            code = code * 16 + digit;
        }
        if (0xD800..=0xDFFF).contains(&code) {
            return None;
        }
        char::from_u32(code)
    }

    fn skip_blanks_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t') => {
                    self.advance();
                }
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n' | '\r')) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn add_token(&mut self, kind: TokenKind, start: usize) {
        let text = &self.source[start..self.pos];
        self.tokens.push(Token::new(kind, start..self.pos, text));
    }

    fn error(&mut self, start: usize, message: impl Into<String>) {
        let span = start..self.pos.max(start);
        self.diagnostics
            .push(Diag::error(message).with_label(span, "here"));
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) -> char {
        let c = self.peek().expect("advance past end of input");
        self.pos += c.len_utf8();
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }
}

/// Builds the exact rational `int.frac * 10^exponent`.
fn exact_real(int_text: &str, frac_text: &str, exponent: i64) -> Option<BigRational> {
    if int_text.is_empty() && frac_text.is_empty() {
        return None;
    }
    let mantissa_text = format!("{int_text}{frac_text}");
    let mantissa: BigInt = mantissa_text.parse().ok()?;
    let ten = BigInt::from(10u32);

    let mut numerator = mantissa;
    let mut denominator = ten.pow(frac_text.len() as u32);
    if exponent >= 0 {
        numerator *= ten.pow(exponent as u32);
    } else {
        denominator *= ten.pow(exponent.unsigned_abs() as u32);
    }
    if denominator.is_zero() {
        return None;
    }
    Some(BigRational::new(numerator, denominator))
}
