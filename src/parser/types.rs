//! Type-expression parsing: cast modes, primitive patterns, versioned
//! composite references, and array suffixes.

use crate::lexer::token::TokenKind;
use crate::parser::base::{ParseResult, TokenStream, merge_spans};
use crate::parser::expression::{
    DiagBoxExt, Expression, NamePath, parse_expression, parse_name_path,
};
use crate::diag::Span;
use crate::error::ErrorKind;
use crate::types::CastMode;

/// A primitive type name as recognized syntactically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    Byte,
    Utf8,
    UnsignedInt(u8),
    SignedInt(u8),
    Float(u8),
    Void(u8),
}

impl PrimitiveKind {
    /// True for types that accept a cast mode prefix.
    pub fn accepts_cast_mode(self) -> bool {
        matches!(
            self,
            PrimitiveKind::UnsignedInt(_) | PrimitiveKind::SignedInt(_) | PrimitiveKind::Float(_)
        )
    }
}

/// The scalar part of a type expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarTypeExpr {
    Primitive(PrimitiveKind),
    /// A reference to a composite type, resolved during the build.
    Versioned(NamePath),
}

/// The kind of an array suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySuffixKind {
    /// `[N]`: exactly N elements.
    Fixed,
    /// `[<=N]`: zero to N elements.
    Inclusive,
    /// `[<N]`: zero to N-1 elements.
    Exclusive,
}

/// An array suffix with its unevaluated capacity expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySuffix {
    pub kind: ArraySuffixKind,
    pub capacity: Expression,
    pub span: Span,
}

/// A complete syntactic type expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    /// Explicit cast mode, when written.
    pub cast_mode: Option<CastMode>,
    pub scalar: ScalarTypeExpr,
    pub array: Option<ArraySuffix>,
    pub span: Span,
}

/// Outcome of classifying an identifier as a primitive type name.
enum PrimitiveClass {
    /// Not shaped like a primitive; treat as a composite reference.
    NotPrimitive,
    Valid(PrimitiveKind),
    /// Shaped like a primitive but with an unsupported width.
    Invalid(String),
}

/// Classifies an identifier against the primitive type patterns.
///
/// The width is decimal with no leading zero, so `uint08` is malformed
/// rather than a composite name; that mistake deserves a direct message.
fn classify_primitive(text: &str) -> PrimitiveClass {
    match text {
        "bool" => return PrimitiveClass::Valid(PrimitiveKind::Bool),
        "byte" => return PrimitiveClass::Valid(PrimitiveKind::Byte),
        "utf8" => return PrimitiveClass::Valid(PrimitiveKind::Utf8),
        _ => {}
    }

    let (prefix, digits) = match text {
        _ if text.starts_with("uint") => ("uint", &text[4..]),
        _ if text.starts_with("int") => ("int", &text[3..]),
        _ if text.starts_with("float") => ("float", &text[5..]),
        _ if text.starts_with("void") => ("void", &text[4..]),
        _ => return PrimitiveClass::NotPrimitive,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return PrimitiveClass::NotPrimitive;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return PrimitiveClass::Invalid(format!(
            "bit length of '{text}' must not have a leading zero"
        ));
    }
    let bits: u16 = match digits.parse() {
        Ok(bits) => bits,
        Err(_) => return PrimitiveClass::Invalid(format!("bit length of '{text}' is out of range")),
    };

    let valid = match prefix {
        "uint" => (1..=64).contains(&bits),
        "int" => (2..=64).contains(&bits),
        "void" => (1..=64).contains(&bits),
        "float" => matches!(bits, 16 | 32 | 64),
        _ => unreachable!(),
    };
    if !valid {
        return PrimitiveClass::Invalid(format!("'{text}' has an unsupported bit length"));
    }
    let bits = bits as u8;
    PrimitiveClass::Valid(match prefix {
        "uint" => PrimitiveKind::UnsignedInt(bits),
        "int" => PrimitiveKind::SignedInt(bits),
        "void" => PrimitiveKind::Void(bits),
        "float" => PrimitiveKind::Float(bits),
        _ => unreachable!(),
    })
}

/// Parses a type expression at the current stream position.
pub fn parse_type_expr(stream: &mut TokenStream<'_>) -> ParseResult<TypeExpr> {
    let start = stream.current().span.clone();

    let cast_mode = match stream.current().kind {
        TokenKind::Saturated => {
            stream.advance();
            Some(CastMode::Saturated)
        }
        TokenKind::Truncated => {
            stream.advance();
            Some(CastMode::Truncated)
        }
        _ => None,
    };

    let name_token = stream.current().clone();
    let first = match name_token.kind {
        TokenKind::Identifier(ref name) => name.clone(),
        ref other => {
            return Err(stream.error_here(format!("expected type name, found {other}")));
        }
    };

    let scalar = match classify_primitive(&first) {
        PrimitiveClass::Valid(kind) => {
            stream.advance();
            if cast_mode.is_some() && !kind.accepts_cast_mode() {
                return Err(Box::new(
                    crate::diag::Diag::error(format!(
                        "cast modes do not apply to '{first}'"
                    ))
                    .with_label(name_token.span, "this type")
                    .with_kind(ErrorKind::Semantic),
                ));
            }
            ScalarTypeExpr::Primitive(kind)
        }
        PrimitiveClass::Invalid(message) => {
            return Err(stream.error_here(message).map_kind(ErrorKind::Semantic));
        }
        PrimitiveClass::NotPrimitive => {
            stream.advance();
            let expr = parse_name_path(stream, first, name_token.span.clone())?;
            let Expression::Name(path, _) = expr else {
                return Err(stream.error_here("expected a type reference"));
            };
            if cast_mode.is_some() {
                return Err(Box::new(
                    crate::diag::Diag::error(
                        "cast modes apply only to numeric primitive types",
                    )
                    .with_label(name_token.span, "referenced type")
                    .with_kind(ErrorKind::Semantic),
                ));
            }
            ScalarTypeExpr::Versioned(path)
        }
    };

    let mut end = previous_end(stream, &start);
    let array = if stream.check(&TokenKind::LBracket) {
        let bracket = stream.current().span.clone();
        stream.advance();
        let kind = if stream.consume(&TokenKind::Le) {
            ArraySuffixKind::Inclusive
        } else if stream.consume(&TokenKind::Lt) {
            ArraySuffixKind::Exclusive
        } else {
            ArraySuffixKind::Fixed
        };
        let capacity = parse_expression(stream)?;
        let close = stream.expect(TokenKind::RBracket)?;
        end = close.clone();
        Some(ArraySuffix {
            kind,
            capacity,
            span: merge_spans(&bracket, &close),
        })
    } else {
        None
    };

    Ok(TypeExpr {
        cast_mode,
        scalar,
        array,
        span: merge_spans(&start, &end),
    })
}

/// Best-effort end span for the scalar part: the token before the
/// current position, falling back to the start span.
fn previous_end(stream: &TokenStream<'_>, fallback: &Span) -> Span {
    if stream.position() == 0 {
        fallback.clone()
    } else {
        let end = stream.current().span.start;
        fallback.start..end.max(fallback.end)
    }
}

/// Returns the primitive kind when `name` matches a primitive pattern.
///
/// Used by the name-reservation checks: `uint8` is not acceptable as a
/// field or constant name regardless of capitalization context.
pub fn primitive_kind_of(name: &str) -> Option<PrimitiveKind> {
    match classify_primitive(name) {
        PrimitiveClass::Valid(kind) => Some(kind),
        _ => None,
    }
}
