//! Expression evaluation against an attribute-scoped environment.
//!
//! The evaluator walks a parsed [`Expression`] and produces a [`Value`].
//! Name resolution is delegated to an [`EvalContext`]: the builder
//! supplies the constants declared above the current line, the special
//! `_offset_` identifier, and access to peer composite types through the
//! resolver.

use crate::error::{ErrorKind, FrontendError};
use crate::expr::value::{self, ScalarValue, Value, ValueSet};
use crate::parser::expression::{Expression, Literal, NamePath};
use crate::parser::types::primitive_kind_of;
use crate::parser::types::PrimitiveKind;
use crate::types::{CastMode, ResolvedType, Version};
use num_rational::BigRational;

/// A failure during expression evaluation.
///
/// Local failures carry a classification and message; the caller knows
/// the file and line. Failures originating in a recursively built peer
/// definition are propagated unchanged so the original location survives.
#[derive(Debug)]
pub enum EvalError {
    Invalid { kind: ErrorKind, message: String },
    Propagated(FrontendError),
}

impl EvalError {
    /// An `InvalidOperand` failure.
    pub fn invalid_operand(message: impl Into<String>) -> Self {
        EvalError::Invalid {
            kind: ErrorKind::InvalidOperand,
            message: message.into(),
        }
    }

    /// An `UndefinedAttribute` failure.
    pub fn undefined_attribute(message: impl Into<String>) -> Self {
        EvalError::Invalid {
            kind: ErrorKind::UndefinedAttribute,
            message: message.into(),
        }
    }
}

/// Name-resolution services the evaluator needs from its caller.
pub trait EvalContext {
    /// Resolves a bare identifier: a constant declared strictly above
    /// the current attribute, or `_offset_`.
    fn lookup_identifier(&self, name: &str) -> Result<Option<Value>, EvalError>;

    /// Resolves a composite type reference by (possibly relative) name.
    ///
    /// `None` means the name is unknown; the evaluator decides whether
    /// that is fatal. Errors from recursively building the referenced
    /// definition are reported through `EvalError::Propagated`.
    fn resolve_composite(
        &mut self,
        name: &str,
        version: Option<Version>,
    ) -> Result<Option<ResolvedType>, EvalError>;
}

/// Evaluates an expression to a value.
pub fn evaluate(expression: &Expression, ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    match expression {
        Expression::Literal(literal, _) => Ok(match literal {
            Literal::Rational(value) => Value::Rational(value.clone()),
            Literal::Boolean(value) => Value::Boolean(*value),
            Literal::String(value) => Value::String(value.clone()),
        }),
        Expression::Set(elements, _) => evaluate_set(elements, ctx),
        Expression::Name(path, _) => evaluate_name(path, ctx),
        Expression::Attribute(base, name, _) => {
            let base = evaluate(base, ctx)?;
            attribute_of(&base, name)
        }
        Expression::Unary(operator, operand, _) => {
            let operand = evaluate(operand, ctx)?;
            value::apply_unary(*operator, &operand).map_err(EvalError::invalid_operand)
        }
        Expression::Binary(operator, lhs, rhs, _) => {
            let lhs = evaluate(lhs, ctx)?;
            let rhs = evaluate(rhs, ctx)?;
            value::apply_binary(*operator, &lhs, &rhs).map_err(EvalError::invalid_operand)
        }
    }
}

fn evaluate_set(
    elements: &[Expression],
    ctx: &mut dyn EvalContext,
) -> Result<Value, EvalError> {
    let mut scalars = Vec::with_capacity(elements.len());
    for element in elements {
        let value = evaluate(element, ctx)?;
        let scalar = match value {
            Value::Rational(v) => ScalarValue::Rational(v),
            Value::Boolean(v) => ScalarValue::Boolean(v),
            Value::String(v) => ScalarValue::String(v),
            other => {
                return Err(EvalError::invalid_operand(format!(
                    "set elements must be rational, boolean, or string values, found {}",
                    other.kind_name()
                )));
            }
        };
        scalars.push(scalar);
    }
    ValueSet::new(scalars)
        .map(Value::Set)
        .map_err(EvalError::invalid_operand)
}

/// Resolves a dotted name.
///
/// A versioned path is always a composite reference. An unversioned
/// single segment is tried as a local identifier, then as a primitive
/// type name, then as a composite in the referencing namespace. For an
/// unversioned dotted path the first segment may be a local constant
/// (remaining segments become attribute accesses); otherwise the whole
/// path is a composite reference resolved to its newest version.
fn evaluate_name(path: &NamePath, ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    let joined = path.joined();

    if path.version.is_some() {
        return match ctx.resolve_composite(&joined, path.version)? {
            Some(ty) => Ok(Value::Type(ty)),
            None => Err(undefined_type(&joined, path.version)),
        };
    }

    if let Some(value) = ctx.lookup_identifier(&path.segments[0])? {
        return fold_attributes(value, &path.segments[1..]);
    }

    if let Some(kind) = primitive_kind_of(&path.segments[0]) {
        let ty = primitive_resolved_type(kind);
        return fold_attributes(Value::Type(ty), &path.segments[1..]);
    }

    match ctx.resolve_composite(&joined, None)? {
        Some(ty) => Ok(Value::Type(ty)),
        None => Err(undefined_type(&joined, None)),
    }
}

fn undefined_type(name: &str, version: Option<Version>) -> EvalError {
    let message = match version {
        Some(version) => format!("type '{name}' version {version} could not be resolved"),
        None => format!("'{name}' is neither a known attribute nor a resolvable type"),
    };
    EvalError::Invalid {
        kind: ErrorKind::UndefinedType,
        message,
    }
}

fn fold_attributes(mut value: Value, names: &[smol_str::SmolStr]) -> Result<Value, EvalError> {
    for name in names {
        value = attribute_of(&value, name)?;
    }
    Ok(value)
}

/// Default rendering of a bare primitive type name in an expression.
fn primitive_resolved_type(kind: PrimitiveKind) -> ResolvedType {
    match kind {
        PrimitiveKind::Bool => ResolvedType::Boolean,
        PrimitiveKind::Byte => ResolvedType::Byte,
        PrimitiveKind::Utf8 => ResolvedType::Utf8,
        PrimitiveKind::Void(bits) => ResolvedType::Void(bits),
        PrimitiveKind::UnsignedInt(bits) => ResolvedType::UnsignedInt {
            bits,
            cast_mode: CastMode::Saturated,
        },
        PrimitiveKind::SignedInt(bits) => ResolvedType::SignedInt {
            bits,
            cast_mode: CastMode::Saturated,
        },
        PrimitiveKind::Float(bits) => ResolvedType::Float {
            bits,
            cast_mode: CastMode::Saturated,
        },
    }
}

/// Attribute access dispatching on the value variant.
fn attribute_of(value: &Value, name: &str) -> Result<Value, EvalError> {
    match value {
        Value::Set(set) => set_attribute(set, name),
        Value::Type(ResolvedType::Composite(composite)) => {
            match composite.constant_value(name) {
                Some(value) => Ok(value.clone()),
                None => Err(EvalError::undefined_attribute(format!(
                    "type '{}' has no constant named '{name}'",
                    composite
                ))),
            }
        }
        other => Err(EvalError::undefined_attribute(format!(
            "{} values have no attribute '{name}'",
            other.kind_name()
        ))),
    }
}

fn set_attribute(set: &ValueSet, name: &str) -> Result<Value, EvalError> {
    match name {
        "min" => set.min().cloned().map(scalar_to_value).ok_or_else(|| {
            EvalError::invalid_operand("an empty set has no minimum")
        }),
        "max" => set.max().cloned().map(scalar_to_value).ok_or_else(|| {
            EvalError::invalid_operand("an empty set has no maximum")
        }),
        "count" => Ok(Value::Rational(BigRational::from_integer(
            set.len().into(),
        ))),
        _ => Err(EvalError::undefined_attribute(format!(
            "sets have no attribute '{name}'; available: min, max, count"
        ))),
    }
}

fn scalar_to_value(scalar: ScalarValue) -> Value {
    match scalar {
        ScalarValue::Rational(v) => Value::Rational(v),
        ScalarValue::Boolean(v) => Value::Boolean(v),
        ScalarValue::String(v) => Value::String(v),
    }
}
