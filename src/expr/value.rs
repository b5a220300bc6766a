//! The constant-expression value domain and its operator algebra.
//!
//! Values span five variants: exact rationals, booleans, strings, finite
//! homogeneous sets, and serializable types (types are first-class terms
//! in the expression language). The algebra implemented here is pure;
//! anything requiring name resolution lives in the evaluator.

use crate::types::ResolvedType;
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::fmt;

/// A set element. The ordering is total across variants so elements can
/// live in a `BTreeSet`, but sets are homogeneous: mixing kinds is
/// rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScalarValue {
    Boolean(bool),
    Rational(BigRational),
    String(SmolStr),
}

impl ScalarValue {
    fn kind(&self) -> ElementKind {
        match self {
            ScalarValue::Boolean(_) => ElementKind::Boolean,
            ScalarValue::Rational(_) => ElementKind::Rational,
            ScalarValue::String(_) => ElementKind::String,
        }
    }
}

/// The element kind of a homogeneous set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Boolean,
    Rational,
    String,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Boolean => write!(f, "boolean"),
            ElementKind::Rational => write!(f, "rational"),
            ElementKind::String => write!(f, "string"),
        }
    }
}

/// A finite homogeneous set of scalar values.
///
/// Set literals are never empty, but intersections can be; an empty set
/// retains the element kind of its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSet {
    kind: ElementKind,
    elements: BTreeSet<ScalarValue>,
}

impl ValueSet {
    /// Builds a set from elements, checking homogeneity.
    pub fn new(elements: impl IntoIterator<Item = ScalarValue>) -> Result<Self, OpError> {
        let mut set = BTreeSet::new();
        let mut kind = None;
        for element in elements {
            match kind {
                None => kind = Some(element.kind()),
                Some(kind) if kind != element.kind() => {
                    return Err(format!(
                        "set elements must all be of one type, found {} and {}",
                        kind,
                        element.kind()
                    ));
                }
                _ => {}
            }
            set.insert(element);
        }
        let kind = kind.ok_or_else(|| "set literals cannot be empty".to_string())?;
        Ok(Self {
            kind,
            elements: set,
        })
    }

    fn with_kind(kind: ElementKind, elements: BTreeSet<ScalarValue>) -> Self {
        Self { kind, elements }
    }

    /// The element kind of this set.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True for the (operator-produced) empty set.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates elements in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &ScalarValue> {
        self.elements.iter()
    }

    /// The smallest element, if the set is non-empty.
    pub fn min(&self) -> Option<&ScalarValue> {
        self.elements.first()
    }

    /// The largest element, if the set is non-empty.
    pub fn max(&self) -> Option<&ScalarValue> {
        self.elements.last()
    }
}

/// A constant-expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An exact arbitrary-precision fraction.
    Rational(BigRational),
    Boolean(bool),
    String(SmolStr),
    Set(ValueSet),
    /// A serializable type used as a value (`vehicle.GeoPoint.1.0`).
    Type(ResolvedType),
}

impl Value {
    /// The kind name used in operator error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Rational(_) => "rational",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Set(_) => "set",
            Value::Type(_) => "type",
        }
    }

    /// The rational payload, when this value is a rational.
    pub fn as_rational(&self) -> Option<&BigRational> {
        match self {
            Value::Rational(value) => Some(value),
            _ => None,
        }
    }

    /// The boolean payload, when this value is a boolean.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// The exact integer payload, when this value is an integral rational.
    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            Value::Rational(value) if value.is_integer() => Some(value.numer()),
            _ => None,
        }
    }

    fn from_scalar(scalar: ScalarValue) -> Self {
        match scalar {
            ScalarValue::Boolean(value) => Value::Boolean(value),
            ScalarValue::Rational(value) => Value::Rational(value),
            ScalarValue::String(value) => Value::String(value),
        }
    }

    fn to_scalar(&self) -> Option<ScalarValue> {
        match self {
            Value::Boolean(value) => Some(ScalarValue::Boolean(*value)),
            Value::Rational(value) => Some(ScalarValue::Rational(value.clone())),
            Value::String(value) => Some(ScalarValue::String(value.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Rational(value) => write!(f, "{}", format_rational(value)),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "'{value}'"),
            Value::Set(set) => {
                write!(f, "{{")?;
                for (index, element) in set.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Value::from_scalar(element.clone()))?;
                }
                write!(f, "}}")
            }
            Value::Type(ty) => write!(f, "{ty}"),
        }
    }
}

fn format_rational(value: &BigRational) -> String {
    if value.is_integer() {
        value.numer().to_string()
    } else {
        format!("{}/{}", value.numer(), value.denom())
    }
}

/// Operator failures carry a message only; the evaluator attaches the
/// `InvalidOperand` classification and the source location.
pub type OpError = String;

use crate::parser::expression::{BinaryOperator, UnaryOperator};

/// Applies a unary operator.
pub fn apply_unary(operator: UnaryOperator, operand: &Value) -> Result<Value, OpError> {
    match (operator, operand) {
        (UnaryOperator::Plus, Value::Rational(value)) => Ok(Value::Rational(value.clone())),
        (UnaryOperator::Minus, Value::Rational(value)) => Ok(Value::Rational(-value.clone())),
        (UnaryOperator::Not, Value::Boolean(value)) => Ok(Value::Boolean(!value)),
        (UnaryOperator::Plus | UnaryOperator::Minus, Value::Set(set))
            if set.kind() == ElementKind::Rational =>
        {
            let elements = set
                .iter()
                .map(|element| match element {
                    ScalarValue::Rational(value) if operator == UnaryOperator::Minus => {
                        ScalarValue::Rational(-value.clone())
                    }
                    other => other.clone(),
                })
                .collect();
            Ok(Value::Set(ValueSet::with_kind(ElementKind::Rational, elements)))
        }
        _ => Err(format!(
            "operator '{}' is not defined for {} values",
            operator.symbol(),
            operand.kind_name()
        )),
    }
}

/// Applies a binary operator with set broadcasting.
///
/// Between two sets, `|` and `&` are union and intersection and the
/// comparisons are set relations; every other operator is applied over
/// the Cartesian product and the result deduplicated. Between a set and
/// a scalar the operator is broadcast element-wise.
pub fn apply_binary(operator: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    if operator.is_comparison() {
        return compare(operator, lhs, rhs);
    }
    match operator {
        BinaryOperator::Or | BinaryOperator::And => {
            let (Value::Boolean(a), Value::Boolean(b)) = (lhs, rhs) else {
                return Err(logic_error(operator, lhs, rhs));
            };
            Ok(Value::Boolean(match operator {
                BinaryOperator::Or => *a || *b,
                _ => *a && *b,
            }))
        }
        _ => match (lhs, rhs) {
            (Value::Set(a), Value::Set(b)) => set_set_binary(operator, a, b),
            (Value::Set(a), _) => {
                let scalar = rhs
                    .to_scalar()
                    .ok_or_else(|| logic_error(operator, lhs, rhs))?;
                broadcast(a, |element| {
                    scalar_binary(
                        operator,
                        &Value::from_scalar(element.clone()),
                        &Value::from_scalar(scalar.clone()),
                    )
                })
            }
            (_, Value::Set(b)) => {
                let scalar = lhs
                    .to_scalar()
                    .ok_or_else(|| logic_error(operator, lhs, rhs))?;
                broadcast(b, |element| {
                    scalar_binary(
                        operator,
                        &Value::from_scalar(scalar.clone()),
                        &Value::from_scalar(element.clone()),
                    )
                })
            }
            _ => scalar_binary(operator, lhs, rhs),
        },
    }
}

fn logic_error(operator: BinaryOperator, lhs: &Value, rhs: &Value) -> OpError {
    format!(
        "operator '{}' is not defined for {} and {} operands",
        operator.symbol(),
        lhs.kind_name(),
        rhs.kind_name()
    )
}

fn set_set_binary(operator: BinaryOperator, a: &ValueSet, b: &ValueSet) -> Result<Value, OpError> {
    match operator {
        BinaryOperator::BitOr | BinaryOperator::BitAnd => {
            if a.kind() != b.kind() {
                return Err(format!(
                    "cannot combine sets of {} and {} elements",
                    a.kind(),
                    b.kind()
                ));
            }
            let elements: BTreeSet<ScalarValue> = match operator {
                BinaryOperator::BitOr => a.elements.union(&b.elements).cloned().collect(),
                _ => a.elements.intersection(&b.elements).cloned().collect(),
            };
            Ok(Value::Set(ValueSet::with_kind(a.kind(), elements)))
        }
        _ => {
            // Cartesian application of the element-wise operator.
            let mut result = BTreeSet::new();
            let mut kind = None;
            for x in a.iter() {
                for y in b.iter() {
                    let value = scalar_binary(
                        operator,
                        &Value::from_scalar(x.clone()),
                        &Value::from_scalar(y.clone()),
                    )?;
                    let scalar = value
                        .to_scalar()
                        .ok_or_else(|| "element-wise operator produced a non-scalar".to_string())?;
                    kind = Some(scalar.kind());
                    result.insert(scalar);
                }
            }
            let kind = kind.ok_or_else(|| "element-wise operation over an empty set".to_string())?;
            Ok(Value::Set(ValueSet::with_kind(kind, result)))
        }
    }
}

fn broadcast(
    set: &ValueSet,
    mut apply: impl FnMut(&ScalarValue) -> Result<Value, OpError>,
) -> Result<Value, OpError> {
    let mut result = BTreeSet::new();
    let mut kind = None;
    for element in set.iter() {
        let value = apply(element)?;
        let scalar = value
            .to_scalar()
            .ok_or_else(|| "element-wise operator produced a non-scalar".to_string())?;
        kind = Some(scalar.kind());
        result.insert(scalar);
    }
    let kind = kind.ok_or_else(|| "element-wise operation over an empty set".to_string())?;
    Ok(Value::Set(ValueSet::with_kind(kind, result)))
}

fn compare(operator: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    use BinaryOperator as Op;
    let result = match (lhs, rhs) {
        (Value::Rational(a), Value::Rational(b)) => ordering_outcome(operator, a.cmp(b)),
        // Strings are compared by code point; the natural string ordering
        // of UTF-8 text coincides with it.
        (Value::String(a), Value::String(b)) => ordering_outcome(operator, a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => match operator {
            Op::Equal => a == b,
            Op::NotEqual => a != b,
            _ => return Err(logic_error(operator, lhs, rhs)),
        },
        (Value::Type(a), Value::Type(b)) => match operator {
            Op::Equal => a == b,
            Op::NotEqual => a != b,
            _ => return Err(logic_error(operator, lhs, rhs)),
        },
        (Value::Set(a), Value::Set(b)) => {
            if a.kind() != b.kind() {
                return Err(format!(
                    "cannot compare sets of {} and {} elements",
                    a.kind(),
                    b.kind()
                ));
            }
            match operator {
                Op::Equal => a.elements == b.elements,
                Op::NotEqual => a.elements != b.elements,
                Op::Less => a.elements.is_subset(&b.elements) && a.elements != b.elements,
                Op::LessOrEqual => a.elements.is_subset(&b.elements),
                Op::Greater => b.elements.is_subset(&a.elements) && a.elements != b.elements,
                Op::GreaterOrEqual => b.elements.is_subset(&a.elements),
                _ => unreachable!("compare() only receives comparison operators"),
            }
        }
        _ => return Err(logic_error(operator, lhs, rhs)),
    };
    Ok(Value::Boolean(result))
}

fn ordering_outcome(operator: BinaryOperator, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering;
    match operator {
        BinaryOperator::Equal => ordering == Ordering::Equal,
        BinaryOperator::NotEqual => ordering != Ordering::Equal,
        BinaryOperator::Less => ordering == Ordering::Less,
        BinaryOperator::LessOrEqual => ordering != Ordering::Greater,
        BinaryOperator::Greater => ordering == Ordering::Greater,
        BinaryOperator::GreaterOrEqual => ordering != Ordering::Less,
        _ => unreachable!("ordering_outcome() only receives comparison operators"),
    }
}

fn scalar_binary(operator: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    use BinaryOperator as Op;
    match operator {
        Op::Add => match (lhs, rhs) {
            (Value::Rational(a), Value::Rational(b)) => Ok(Value::Rational(a + b)),
            (Value::String(a), Value::String(b)) => {
                Ok(Value::String(format!("{a}{b}").into()))
            }
            _ => Err(logic_error(operator, lhs, rhs)),
        },
        Op::Subtract | Op::Multiply => {
            let (Value::Rational(a), Value::Rational(b)) = (lhs, rhs) else {
                return Err(logic_error(operator, lhs, rhs));
            };
            Ok(Value::Rational(match operator {
                Op::Subtract => a - b,
                _ => a * b,
            }))
        }
        Op::Divide => {
            let (Value::Rational(a), Value::Rational(b)) = (lhs, rhs) else {
                return Err(logic_error(operator, lhs, rhs));
            };
            if b.is_zero() {
                return Err("division by zero".to_string());
            }
            Ok(Value::Rational(a / b))
        }
        Op::FloorDivide | Op::Modulo => {
            let (Some(a), Some(b)) = (lhs.as_integer(), rhs.as_integer()) else {
                return Err(integer_only_error(operator, lhs, rhs));
            };
            if b.is_zero() {
                return Err("division by zero".to_string());
            }
            let result = match operator {
                // Floor semantics: `-7 // 2 == -4`, `-7 % 2 == 1`.
                Op::FloorDivide => a.div_floor(b),
                _ => a.mod_floor(b),
            };
            Ok(Value::Rational(BigRational::from_integer(result)))
        }
        Op::BitOr | Op::BitXor | Op::BitAnd => {
            let (Some(a), Some(b)) = (lhs.as_integer(), rhs.as_integer()) else {
                return Err(integer_only_error(operator, lhs, rhs));
            };
            let result = match operator {
                Op::BitOr => a | b,
                Op::BitXor => a ^ b,
                _ => a & b,
            };
            Ok(Value::Rational(BigRational::from_integer(result)))
        }
        Op::Power => {
            let (Value::Rational(base), Value::Rational(exponent)) = (lhs, rhs) else {
                return Err(logic_error(operator, lhs, rhs));
            };
            power(base, exponent)
        }
        _ => Err(logic_error(operator, lhs, rhs)),
    }
}

fn integer_only_error(operator: BinaryOperator, lhs: &Value, rhs: &Value) -> OpError {
    format!(
        "operator '{}' requires integer operands, found {} and {}",
        operator.symbol(),
        describe_number(lhs),
        describe_number(rhs)
    )
}

fn describe_number(value: &Value) -> String {
    match value {
        Value::Rational(v) if !v.is_integer() => format!("non-integer {}", format_rational(v)),
        other => other.kind_name().to_string(),
    }
}

/// Exact exponentiation.
///
/// Integer exponents always succeed (except `0 ** negative`). A
/// fractional exponent `p/q` succeeds only when the exact q-th root of
/// the base exists in the rationals.
fn power(base: &BigRational, exponent: &BigRational) -> Result<Value, OpError> {
    let rooted = if exponent.is_integer() {
        base.clone()
    } else {
        exact_root(base, exponent.denom())?
    };
    let p = exponent.numer();
    let p_mag = p
        .abs()
        .to_u32()
        .ok_or_else(|| "exponent magnitude is too large".to_string())?;

    let powered = BigRational::new(rooted.numer().pow(p_mag), rooted.denom().pow(p_mag));
    if p.is_negative() {
        if powered.is_zero() {
            return Err("zero cannot be raised to a negative power".to_string());
        }
        Ok(Value::Rational(powered.recip()))
    } else {
        Ok(Value::Rational(powered))
    }
}

/// The exact `degree`-th root of `value`, or an error when none exists.
fn exact_root(value: &BigRational, degree: &BigInt) -> Result<BigRational, OpError> {
    let degree = degree
        .to_u32()
        .filter(|d| *d >= 2)
        .ok_or_else(|| "root degree is too large".to_string())?;
    if value.is_negative() && degree % 2 == 0 {
        return Err(format!(
            "the result of '**' is not a rational number (even root of {})",
            format_rational(value)
        ));
    }

    let root_of = |n: &BigInt| -> Result<BigInt, OpError> {
        let root = n.nth_root(degree);
        if root.pow(degree) == *n {
            Ok(root)
        } else {
            Err(format!(
                "the result of '**' is not a rational number ({n} has no exact root)"
            ))
        }
    };
    Ok(BigRational::new(
        root_of(value.numer())?,
        root_of(value.denom())?,
    ))
}

/// Builds a set value from rational elements; used for `_offset_`.
pub fn rational_set(values: impl IntoIterator<Item = BigRational>) -> Value {
    let elements: BTreeSet<ScalarValue> =
        values.into_iter().map(ScalarValue::Rational).collect();
    Value::Set(ValueSet::with_kind(ElementKind::Rational, elements))
}

/// Convenience constructor for integral rationals.
pub fn integer_value(value: impl Into<BigInt>) -> Value {
    Value::Rational(BigRational::from_integer(value.into()))
}
