//! Statement parsing and line lowering for DSDL definitions.
//!
//! A definition file is a sequence of lines; each line carries at most
//! one statement. Parsing lowers the token stream into [`Line`] records
//! that the builder interprets in order. The first syntax error aborts
//! the definition.

pub mod base;
pub mod expression;
pub mod types;

use crate::diag::Diag;
use crate::lexer::token::TokenKind;
use crate::lexer::tokenize;
use base::{ParseResult, TokenStream};
use expression::{Expression, parse_expression};
use smol_str::SmolStr;
use types::{TypeExpr, parse_type_expr};

/// The content of one source line after lowering.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A blank or comment-only line.
    Empty,
    /// The `---` marker separating service request and response sections.
    ServiceMarker,
    /// An `@`-prefixed directive with an optional argument expression.
    Directive {
        name: SmolStr,
        name_span: crate::diag::Span,
        expression: Option<Expression>,
    },
    /// A typed, named field.
    Field {
        ty: TypeExpr,
        name: SmolStr,
        name_span: crate::diag::Span,
    },
    /// An unnamed type standing alone; only void types are legal here,
    /// which the builder enforces.
    Padding { ty: TypeExpr },
    /// A typed, named constant with its initialiser.
    Constant {
        ty: TypeExpr,
        name: SmolStr,
        name_span: crate::diag::Span,
        expression: Expression,
    },
}

/// One lowered source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// 1-based physical line number.
    pub line_number: usize,
    pub statement: Statement,
}

/// Parses the text of one definition file into lowered lines.
///
/// Lexer errors surface here as well: the first error-severity
/// diagnostic from either phase aborts the definition.
pub fn parse_definition(source: &str) -> ParseResult<Vec<Line>> {
    let lex_result = tokenize(source);
    if let Some(diag) = lex_result.diagnostics.into_iter().next() {
        return Err(Box::new(diag));
    }

    let mut stream = TokenStream::new(&lex_result.tokens);
    let mut lines = Vec::new();
    let mut line_number = 1usize;

    loop {
        let statement = parse_statement(&mut stream)?;
        if !stream.at_line_end() {
            return Err(stream.error_here(format!(
                "unexpected {} after statement",
                stream.current().kind
            )));
        }
        lines.push(Line {
            line_number,
            statement,
        });
        if stream.check(&TokenKind::Eof) {
            break;
        }
        stream.advance(); // consume the newline
        line_number += 1;
        if stream.check(&TokenKind::Eof) {
            // The final newline terminates the last line; no trailing
            // empty line record is produced for it.
            break;
        }
    }

    Ok(lines)
}

fn parse_statement(stream: &mut TokenStream<'_>) -> ParseResult<Statement> {
    match &stream.current().kind {
        TokenKind::Newline | TokenKind::Eof => Ok(Statement::Empty),
        TokenKind::ServiceMarker => {
            stream.advance();
            Ok(Statement::ServiceMarker)
        }
        TokenKind::At => parse_directive(stream),
        _ => parse_attribute(stream),
    }
}

fn parse_directive(stream: &mut TokenStream<'_>) -> ParseResult<Statement> {
    stream.expect(TokenKind::At)?;
    let token = stream.current().clone();
    let name = match token.kind {
        TokenKind::Identifier(ref name) => name.clone(),
        ref other => {
            return Err(stream.error_here(format!(
                "expected directive name after '@', found {other}"
            )));
        }
    };
    stream.advance();

    let expression = if stream.at_line_end() {
        None
    } else {
        Some(parse_expression(stream)?)
    };

    Ok(Statement::Directive {
        name,
        name_span: token.span,
        expression,
    })
}

fn parse_attribute(stream: &mut TokenStream<'_>) -> ParseResult<Statement> {
    let ty = parse_type_expr(stream)?;

    let token = stream.current().clone();
    match token.kind {
        TokenKind::Identifier(name) => {
            stream.advance();
            if stream.consume(&TokenKind::Assign) {
                let expression = parse_expression(stream)?;
                Ok(Statement::Constant {
                    ty,
                    name,
                    name_span: token.span,
                    expression,
                })
            } else {
                Ok(Statement::Field {
                    ty,
                    name,
                    name_span: token.span,
                })
            }
        }
        TokenKind::Newline | TokenKind::Eof => Ok(Statement::Padding { ty }),
        _ => Err(Box::new(
            Diag::error(format!("expected field name, found {}", token.kind))
                .with_label(token.span, "here"),
        )),
    }
}
