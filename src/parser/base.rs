//! Shared parser infrastructure for token stream navigation and error handling.
//!
//! All parser modules use composition with [`TokenStream`] rather than
//! reimplementing navigation, lookahead, and matching.

use crate::diag::{Diag, Span};
use crate::lexer::token::{Token, TokenKind};

/// Common error type for parsing operations.
pub type ParseError = Box<Diag>;

/// Common result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Token stream navigator providing common operations for all parsers.
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    /// Creates a new token stream from a token slice.
    ///
    /// The slice must end with an EOF token; the lexer guarantees this.
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Returns the current token.
    ///
    /// Past-the-end positions return the last token (EOF).
    pub fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream must be non-empty"))
    }

    /// Returns the next token without consuming the current one.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    /// Advances to the next token. Does nothing at EOF.
    pub fn advance(&mut self) {
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
    }

    /// Checks if the current token matches the given kind.
    pub fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    /// Consumes the current token if it matches the given kind.
    pub fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expects a specific token kind and returns its span.
    pub fn expect(&mut self, kind: TokenKind) -> ParseResult<Span> {
        if self.check(&kind) {
            let span = self.current().span.clone();
            self.advance();
            Ok(span)
        } else {
            Err(self.error_here(format!("expected {kind}, found {}", self.current().kind)))
        }
    }

    /// Creates an error at the current token position.
    pub fn error_here(&self, message: impl Into<String>) -> ParseError {
        Box::new(Diag::error(message.into()).with_label(self.current().span.clone(), "here"))
    }

    /// Returns the current position in the token stream.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns true when the current token terminates a statement line.
    pub fn at_line_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Newline | TokenKind::Eof)
    }
}

/// Merges two spans into a single span covering both.
pub fn merge_spans(start: &Span, end: &Span) -> Span {
    start.start..end.end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tokens() -> Vec<Token> {
        vec![
            Token::new(TokenKind::Identifier("uint8".into()), 0..5, "uint8"),
            Token::new(TokenKind::Identifier("x".into()), 6..7, "x"),
            Token::new(TokenKind::Newline, 7..8, "\n"),
            Token::new(TokenKind::Eof, 8..8, ""),
        ]
    }

    #[test]
    fn navigation() {
        let tokens = make_tokens();
        let mut stream = TokenStream::new(&tokens);

        assert_eq!(stream.current().kind, TokenKind::Identifier("uint8".into()));
        assert_eq!(stream.peek().map(|t| &t.kind), Some(&TokenKind::Identifier("x".into())));

        stream.advance();
        assert_eq!(stream.current().kind, TokenKind::Identifier("x".into()));
        assert_eq!(stream.position(), 1);
    }

    #[test]
    fn check_and_consume() {
        let tokens = make_tokens();
        let mut stream = TokenStream::new(&tokens);

        assert!(stream.check(&TokenKind::Identifier("uint8".into())));
        assert!(!stream.consume(&TokenKind::Newline));
        assert!(stream.consume(&TokenKind::Identifier("uint8".into())));
    }

    #[test]
    fn expect_success_and_failure() {
        let tokens = make_tokens();
        let mut stream = TokenStream::new(&tokens);

        let span = stream.expect(TokenKind::Identifier("uint8".into())).unwrap();
        assert_eq!(span, 0..5);

        let err = stream.expect(TokenKind::Newline).unwrap_err();
        assert!(err.message.contains("expected end of line"));
        // Position unchanged after failed expect.
        assert_eq!(stream.current().kind, TokenKind::Identifier("x".into()));
    }

    #[test]
    fn stays_at_eof() {
        let tokens = make_tokens();
        let mut stream = TokenStream::new(&tokens);
        for _ in 0..10 {
            stream.advance();
        }
        assert_eq!(stream.current().kind, TokenKind::Eof);
        assert!(stream.at_line_end());
    }

    #[test]
    fn merge_spans_covers_both() {
        assert_eq!(merge_spans(&(2..4), &(7..9)), 2..9);
    }
}
