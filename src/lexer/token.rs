//! Token types for DSDL lexical analysis.

use crate::diag::Span;
use num_bigint::BigInt;
use num_rational::BigRational;
use smol_str::SmolStr;
use std::fmt;

/// The kind of a lexical token in a DSDL definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Keywords
    Saturated,
    Truncated,
    True,
    False,

    /// An identifier: type name component, attribute name, or directive name.
    Identifier(SmolStr),

    // Literals. Numeric values are parsed by the lexer so downstream
    // phases operate on exact numbers, never on digit strings.
    IntegerLiteral(BigInt),
    RealLiteral(BigRational),
    StringLiteral(SmolStr),

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Pipe,
    PipePipe,
    Ampersand,
    AmpersandAmpersand,
    Caret,
    Bang,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Dot,
    Comma,
    At,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    /// A `---` line splitting a service definition into request and response.
    ServiceMarker,
    /// End of a physical line (`\n` or `\r\n`).
    Newline,
    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Saturated => write!(f, "'saturated'"),
            TokenKind::Truncated => write!(f, "'truncated'"),
            TokenKind::True => write!(f, "'true'"),
            TokenKind::False => write!(f, "'false'"),
            TokenKind::Identifier(name) => write!(f, "identifier '{name}'"),
            TokenKind::IntegerLiteral(value) => write!(f, "integer literal {value}"),
            TokenKind::RealLiteral(_) => write!(f, "real literal"),
            TokenKind::StringLiteral(_) => write!(f, "string literal"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::StarStar => write!(f, "'**'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::SlashSlash => write!(f, "'//'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::Pipe => write!(f, "'|'"),
            TokenKind::PipePipe => write!(f, "'||'"),
            TokenKind::Ampersand => write!(f, "'&'"),
            TokenKind::AmpersandAmpersand => write!(f, "'&&'"),
            TokenKind::Caret => write!(f, "'^'"),
            TokenKind::Bang => write!(f, "'!'"),
            TokenKind::Assign => write!(f, "'='"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Le => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Ge => write!(f, "'>='"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::At => write!(f, "'@'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::ServiceMarker => write!(f, "'---'"),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its source span and original text.
///
/// The text is kept because a few constructs re-interpret it: a real
/// literal of the form `1.0` in a type-reference position is actually a
/// `MAJOR.MINOR` version pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The kind of this token.
    pub kind: TokenKind,
    /// The byte span of this token in the source.
    pub span: Span,
    /// The original source text of this token.
    pub text: SmolStr,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span, text: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            span,
            text: text.into(),
        }
    }
}
