//! Expression parsing for DSDL constant expressions.
//!
//! Implements the expression grammar with classical precedence, lowest
//! to highest: `||`, `&&`, comparison (non-chainable), `|`, `^`, `&`,
//! additive, multiplicative, unary, `**` (right-associative), and
//! attribute access `.` (tightest). Produces an [`Expression`] tree that
//! the evaluator walks against an attribute-scoped environment.

use crate::diag::Span;
use crate::error::ErrorKind;
use crate::lexer::token::TokenKind;
use crate::parser::base::{ParseError, ParseResult, TokenStream, merge_spans};
use crate::types::Version;
use num_rational::BigRational;
use smol_str::SmolStr;

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Minus,
    Not,
}

impl UnaryOperator {
    /// The source symbol of this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
            UnaryOperator::Not => "!",
        }
    }
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    BitOr,
    BitXor,
    BitAnd,
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
}

impl BinaryOperator {
    /// The source symbol of this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Or => "||",
            BinaryOperator::And => "&&",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessOrEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterOrEqual => ">=",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::FloorDivide => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "**",
        }
    }

    /// True for the six comparison operators.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Less
                | BinaryOperator::LessOrEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterOrEqual
        )
    }
}

/// A literal value appearing directly in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Rational(BigRational),
    Boolean(bool),
    String(SmolStr),
}

/// A dotted name as written in an expression or type reference.
///
/// `segments` holds the identifier components; a trailing `MAJOR.MINOR`
/// pair is captured as `version`. Which segments form a type name and
/// which are attribute accesses is decided at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePath {
    pub segments: Vec<SmolStr>,
    pub version: Option<Version>,
}

impl NamePath {
    /// The dotted form of the name, without the version.
    pub fn joined(&self) -> String {
        self.segments.join(".")
    }
}

/// A parsed constant expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal, Span),
    /// A non-empty set literal `{a, b, c}`.
    Set(Vec<Expression>, Span),
    /// A bare or dotted identifier, possibly with a version suffix.
    Name(NamePath, Span),
    /// Attribute access `base.name`.
    Attribute(Box<Expression>, SmolStr, Span),
    Unary(UnaryOperator, Box<Expression>, Span),
    Binary(BinaryOperator, Box<Expression>, Box<Expression>, Span),
}

impl Expression {
    /// Returns the source span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(_, span)
            | Expression::Set(_, span)
            | Expression::Name(_, span)
            | Expression::Attribute(_, _, span)
            | Expression::Unary(_, _, span)
            | Expression::Binary(_, _, _, span) => span.clone(),
        }
    }
}

/// Parses a complete expression at the current stream position.
pub fn parse_expression(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    parse_or(stream)
}

fn parse_or(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut left = parse_and(stream)?;
    while stream.consume(&TokenKind::PipePipe) {
        let right = parse_and(stream)?;
        let span = merge_spans(&left.span(), &right.span());
        left = Expression::Binary(BinaryOperator::Or, Box::new(left), Box::new(right), span);
    }
    Ok(left)
}

fn parse_and(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut left = parse_comparison(stream)?;
    while stream.consume(&TokenKind::AmpersandAmpersand) {
        let right = parse_comparison(stream)?;
        let span = merge_spans(&left.span(), &right.span());
        left = Expression::Binary(BinaryOperator::And, Box::new(left), Box::new(right), span);
    }
    Ok(left)
}

fn comparison_operator(kind: &TokenKind) -> Option<BinaryOperator> {
    match kind {
        TokenKind::EqEq => Some(BinaryOperator::Equal),
        TokenKind::NotEq => Some(BinaryOperator::NotEqual),
        TokenKind::Lt => Some(BinaryOperator::Less),
        TokenKind::Le => Some(BinaryOperator::LessOrEqual),
        TokenKind::Gt => Some(BinaryOperator::Greater),
        TokenKind::Ge => Some(BinaryOperator::GreaterOrEqual),
        _ => None,
    }
}

fn parse_comparison(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let left = parse_bit_or(stream)?;
    let Some(operator) = comparison_operator(&stream.current().kind) else {
        return Ok(left);
    };
    stream.advance();
    let right = parse_bit_or(stream)?;

    if comparison_operator(&stream.current().kind).is_some() {
        return Err(stream
            .error_here("comparison operators cannot be chained")
            .map_help("split the comparison into two expressions joined with '&&'"));
    }

    let span = merge_spans(&left.span(), &right.span());
    Ok(Expression::Binary(
        operator,
        Box::new(left),
        Box::new(right),
        span,
    ))
}

fn parse_bit_or(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut left = parse_bit_xor(stream)?;
    while stream.consume(&TokenKind::Pipe) {
        let right = parse_bit_xor(stream)?;
        let span = merge_spans(&left.span(), &right.span());
        left = Expression::Binary(BinaryOperator::BitOr, Box::new(left), Box::new(right), span);
    }
    Ok(left)
}

fn parse_bit_xor(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut left = parse_bit_and(stream)?;
    while stream.consume(&TokenKind::Caret) {
        let right = parse_bit_and(stream)?;
        let span = merge_spans(&left.span(), &right.span());
        left = Expression::Binary(BinaryOperator::BitXor, Box::new(left), Box::new(right), span);
    }
    Ok(left)
}

fn parse_bit_and(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut left = parse_additive(stream)?;
    while stream.consume(&TokenKind::Ampersand) {
        let right = parse_additive(stream)?;
        let span = merge_spans(&left.span(), &right.span());
        left = Expression::Binary(BinaryOperator::BitAnd, Box::new(left), Box::new(right), span);
    }
    Ok(left)
}

fn parse_additive(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut left = parse_multiplicative(stream)?;
    loop {
        let operator = match stream.current().kind {
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Minus => BinaryOperator::Subtract,
            _ => break,
        };
        stream.advance();
        let right = parse_multiplicative(stream)?;
        let span = merge_spans(&left.span(), &right.span());
        left = Expression::Binary(operator, Box::new(left), Box::new(right), span);
    }
    Ok(left)
}

fn parse_multiplicative(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut left = parse_unary(stream)?;
    loop {
        let operator = match stream.current().kind {
            TokenKind::Star => BinaryOperator::Multiply,
            TokenKind::Slash => BinaryOperator::Divide,
            TokenKind::SlashSlash => BinaryOperator::FloorDivide,
            TokenKind::Percent => BinaryOperator::Modulo,
            _ => break,
        };
        stream.advance();
        let right = parse_unary(stream)?;
        let span = merge_spans(&left.span(), &right.span());
        left = Expression::Binary(operator, Box::new(left), Box::new(right), span);
    }
    Ok(left)
}

fn parse_unary(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let operator = match stream.current().kind {
        TokenKind::Plus => Some(UnaryOperator::Plus),
        TokenKind::Minus => Some(UnaryOperator::Minus),
        TokenKind::Bang => Some(UnaryOperator::Not),
        _ => None,
    };
    if let Some(operator) = operator {
        let start = stream.current().span.clone();
        stream.advance();
        let operand = parse_unary(stream)?;
        let span = merge_spans(&start, &operand.span());
        return Ok(Expression::Unary(operator, Box::new(operand), span));
    }
    parse_power(stream)
}

fn parse_power(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let base = parse_postfix(stream)?;
    if stream.consume(&TokenKind::StarStar) {
        // Right-associative; a unary operator may follow directly
        // (`2 ** -1`), so the exponent re-enters the unary level.
        let exponent = parse_unary(stream)?;
        let span = merge_spans(&base.span(), &exponent.span());
        return Ok(Expression::Binary(
            BinaryOperator::Power,
            Box::new(base),
            Box::new(exponent),
            span,
        ));
    }
    Ok(base)
}

fn parse_postfix(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let mut expr = parse_atom(stream)?;
    while stream.check(&TokenKind::Dot) {
        stream.advance();
        let token = stream.current().clone();
        let name = match token.kind {
            TokenKind::Identifier(ref name) => name.clone(),
            ref other => {
                return Err(stream.error_here(format!(
                    "expected attribute name after '.', found {other}"
                )));
            }
        };
        stream.advance();
        let span = merge_spans(&expr.span(), &token.span);
        expr = Expression::Attribute(Box::new(expr), name, span);
    }
    Ok(expr)
}

fn parse_atom(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let token = stream.current().clone();
    match token.kind {
        TokenKind::IntegerLiteral(value) => {
            stream.advance();
            Ok(Expression::Literal(
                Literal::Rational(BigRational::from_integer(value)),
                token.span,
            ))
        }
        TokenKind::RealLiteral(value) => {
            stream.advance();
            Ok(Expression::Literal(Literal::Rational(value), token.span))
        }
        TokenKind::StringLiteral(value) => {
            stream.advance();
            Ok(Expression::Literal(Literal::String(value), token.span))
        }
        TokenKind::True => {
            stream.advance();
            Ok(Expression::Literal(Literal::Boolean(true), token.span))
        }
        TokenKind::False => {
            stream.advance();
            Ok(Expression::Literal(Literal::Boolean(false), token.span))
        }
        TokenKind::LBrace => parse_set(stream),
        TokenKind::LParen => {
            stream.advance();
            let inner = parse_expression(stream)?;
            let end = stream.expect(TokenKind::RParen)?;
            // The parenthesised span keeps grouping visible in diagnostics.
            let span = merge_spans(&token.span, &end);
            Ok(match inner {
                Expression::Literal(lit, _) => Expression::Literal(lit, span),
                other => other,
            })
        }
        TokenKind::Identifier(first) => {
            stream.advance();
            parse_name_path(stream, first, token.span)
        }
        _ => Err(stream.error_here(format!("expected expression, found {}", token.kind))),
    }
}

fn parse_set(stream: &mut TokenStream<'_>) -> ParseResult<Expression> {
    let start = stream.expect(TokenKind::LBrace)?;
    if stream.check(&TokenKind::RBrace) {
        return Err(stream
            .error_here("set literals cannot be empty")
            .map_help("an empty set has no element type and cannot be represented"));
    }
    let mut elements = vec![parse_expression(stream)?];
    while stream.consume(&TokenKind::Comma) {
        elements.push(parse_expression(stream)?);
    }
    let end = stream.expect(TokenKind::RBrace)?;
    Ok(Expression::Set(elements, merge_spans(&start, &end)))
}

/// Continues a dotted name after its first identifier has been consumed.
///
/// Consumes `.ident` segments and an optional trailing `MAJOR.MINOR`
/// version. A version written without spaces arrives from the lexer as a
/// single real-literal token (`1.0`) and is split back apart here using
/// the token text. Attribute accesses following a version are left for
/// the postfix loop.
pub fn parse_name_path(
    stream: &mut TokenStream<'_>,
    first: SmolStr,
    start: Span,
) -> ParseResult<Expression> {
    let mut segments = vec![first];
    let mut version = None;
    let mut end = start.clone();

    while version.is_none() && stream.check(&TokenKind::Dot) {
        let next = match stream.peek() {
            Some(token) => token.clone(),
            None => break,
        };
        match next.kind {
            TokenKind::Identifier(name) => {
                stream.advance();
                stream.advance();
                segments.push(name);
                end = next.span;
            }
            TokenKind::IntegerLiteral(major) => {
                // Spaced-out form: `.  1  .  0`.
                stream.advance();
                stream.advance();
                stream.expect(TokenKind::Dot)?;
                let minor_token = stream.current().clone();
                let minor = match minor_token.kind {
                    TokenKind::IntegerLiteral(ref minor) => minor.clone(),
                    ref other => {
                        return Err(stream.error_here(format!(
                            "expected minor version number, found {other}"
                        )));
                    }
                };
                stream.advance();
                version = Some(make_version(
                    stream,
                    &major.to_string(),
                    &minor.to_string(),
                )?);
                end = minor_token.span;
            }
            TokenKind::RealLiteral(_) => {
                let Some((major, minor)) = split_version_text(&next.text) else {
                    return Err(stream.error_here(format!(
                        "malformed version specifier '{}'",
                        next.text
                    )));
                };
                stream.advance();
                stream.advance();
                version = Some(make_version(stream, major, minor)?);
                end = next.span;
            }
            _ => break,
        }
    }

    let path = NamePath { segments, version };
    Ok(Expression::Name(path, merge_spans(&start, &end)))
}

fn make_version(stream: &TokenStream<'_>, major: &str, minor: &str) -> ParseResult<Version> {
    let parse = |text: &str| -> Option<u8> { text.parse().ok() };
    match (parse(major), parse(minor)) {
        (Some(major), Some(minor)) => Ok(Version { major, minor }),
        _ => Err(stream
            .error_here(format!("version {major}.{minor} is out of range"))
            .map_kind(ErrorKind::Version)),
    }
}

/// Splits `"1.0"` into `("1", "0")`; rejects anything that is not two
/// plain decimal digit runs.
fn split_version_text(text: &str) -> Option<(&str, &str)> {
    let (major, minor) = text.split_once('.')?;
    let plain = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    (plain(major) && plain(minor)).then_some((major, minor))
}

/// Extension helpers for boxed diagnostics used by the parser modules.
pub(crate) trait DiagBoxExt {
    fn map_help(self, help: &str) -> Self;
    fn map_kind(self, kind: ErrorKind) -> Self;
}

impl DiagBoxExt for ParseError {
    fn map_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    fn map_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }
}
