//! The serializable type model.
//!
//! Everything a definition can describe lives here: primitives, arrays,
//! composites (structures and unions), and services. A composite is
//! created by the builder, sealed when its definition ends, and shared
//! immutably through [`Arc`] handles afterwards; the reference graph is
//! a DAG.

use crate::bit_length_set::BitLengthSet;
use crate::expr::Value;
use num_bigint::BigInt;
use num_rational::BigRational;
use smol_str::SmolStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A `major.minor` version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Behavior when a value exceeds the representable range of a numeric
/// type: `saturated` clamps, `truncated` wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastMode {
    Saturated,
    Truncated,
}

impl fmt::Display for CastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastMode::Saturated => write!(f, "saturated"),
            CastMode::Truncated => write!(f, "truncated"),
        }
    }
}

/// Array arity: fixed, or variable with an inclusive/exclusive bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// Exactly `N` elements, no length tag.
    Fixed(u64),
    /// Zero to `N` elements behind an implicit length tag.
    VariableInclusive(u64),
    /// Zero to `N - 1` elements behind an implicit length tag.
    VariableExclusive(u64),
}

/// An array over a scalar element type.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub element: Box<ResolvedType>,
    pub kind: ArrayKind,
}

impl ArrayType {
    /// The maximum number of elements.
    pub fn max_count(&self) -> u64 {
        match self.kind {
            ArrayKind::Fixed(n) | ArrayKind::VariableInclusive(n) => n,
            ArrayKind::VariableExclusive(n) => n - 1,
        }
    }

    /// Width of the implicit length tag; zero for fixed arrays.
    ///
    /// The tag must index every count in `[0, max_count]`.
    pub fn length_tag_bits(&self) -> u8 {
        match self.kind {
            ArrayKind::Fixed(_) => 0,
            _ => bits_to_represent(self.max_count()),
        }
    }

    /// The set of possible serialized lengths of the whole array.
    pub fn bit_length_set(&self) -> BitLengthSet {
        let element = self.element.bit_length_set();
        match self.kind {
            ArrayKind::Fixed(n) => element.repeat(n),
            _ => BitLengthSet::singleton(self.length_tag_bits() as u64)
                .concatenate(&element.repeat_up_to(self.max_count())),
        }
    }
}

/// The number of bits needed to represent every integer in `[0, n]`.
pub fn bits_to_represent(n: u64) -> u8 {
    let bits = 64 - n.leading_zeros() as u8;
    bits.max(1)
}

/// A fully resolved serializable type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedType {
    /// Padding of 1..=64 bits; never named, never a value.
    Void(u8),
    /// Single-bit boolean.
    Boolean,
    /// An opaque octet, 8 bits.
    Byte,
    /// One UTF-8 code unit, 8 bits.
    Utf8,
    /// Unsigned integer of 1..=64 bits.
    UnsignedInt { bits: u8, cast_mode: CastMode },
    /// Two's-complement signed integer of 2..=64 bits.
    SignedInt { bits: u8, cast_mode: CastMode },
    /// IEEE 754 binary16/32/64.
    Float { bits: u8, cast_mode: CastMode },
    Array(ArrayType),
    Composite(Arc<CompositeType>),
}

impl ResolvedType {
    /// The set of serialized lengths this type contributes as a member
    /// of an enclosing definition.
    ///
    /// A sealed composite contributes its own set; a delimited one is
    /// wrapped in a 32-bit delimiter header followed by a byte-padded
    /// envelope bounded by its extent.
    pub fn bit_length_set(&self) -> BitLengthSet {
        match self {
            ResolvedType::Void(bits) => BitLengthSet::singleton(*bits as u64),
            ResolvedType::Boolean => BitLengthSet::singleton(1),
            ResolvedType::Byte | ResolvedType::Utf8 => BitLengthSet::singleton(8),
            ResolvedType::UnsignedInt { bits, .. }
            | ResolvedType::SignedInt { bits, .. }
            | ResolvedType::Float { bits, .. } => BitLengthSet::singleton(*bits as u64),
            ResolvedType::Array(array) => array.bit_length_set(),
            ResolvedType::Composite(composite) => match composite.sealing() {
                Sealing::Sealed => composite.bit_length_set().clone(),
                Sealing::Delimited { extent } => BitLengthSet::singleton(32).concatenate(
                    &BitLengthSet::from_lengths((0..=extent / 8).map(|k| k * 8)),
                ),
            },
        }
    }

    /// True for void padding types.
    pub fn is_void(&self) -> bool {
        matches!(self, ResolvedType::Void(_))
    }

    /// True when this type (or, for arrays, its element) is a composite.
    pub fn references_composite(&self) -> Option<&Arc<CompositeType>> {
        match self {
            ResolvedType::Composite(composite) => Some(composite),
            ResolvedType::Array(array) => array.element.references_composite(),
            _ => None,
        }
    }

    /// The inclusive integer range of an integer-valued primitive, or
    /// `None` for non-integer types.
    pub fn integer_range(&self) -> Option<(BigInt, BigInt)> {
        match self {
            ResolvedType::Byte | ResolvedType::Utf8 => {
                Some((BigInt::from(0), BigInt::from(255)))
            }
            ResolvedType::UnsignedInt { bits, .. } => {
                Some((BigInt::from(0), (BigInt::from(1) << u32::from(*bits)) - 1))
            }
            ResolvedType::SignedInt { bits, .. } => {
                let half = BigInt::from(1) << u32::from(*bits - 1);
                Some((-half.clone(), half - 1))
            }
            _ => None,
        }
    }

    /// The largest finite magnitude of a float type.
    pub fn float_max_magnitude(&self) -> Option<BigRational> {
        let ResolvedType::Float { bits, .. } = self else {
            return None;
        };
        // (2^(m+1) - 1) * 2^(e_max - m) for m explicit mantissa bits.
        let (mantissa_bits, max_exponent) = match bits {
            16 => (10u32, 15i32),
            32 => (23, 127),
            64 => (52, 1023),
            _ => return None,
        };
        let mantissa = (BigInt::from(1) << (mantissa_bits + 1)) - BigInt::from(1);
        let scale = BigInt::from(1) << (max_exponent as u32 - mantissa_bits);
        Some(BigRational::from_integer(mantissa * scale))
    }
}

impl fmt::Display for ResolvedType {
    /// Canonical source form. The rendered text is itself a valid type
    /// reference that resolves back to an equal type.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedType::Void(bits) => write!(f, "void{bits}"),
            ResolvedType::Boolean => write!(f, "bool"),
            ResolvedType::Byte => write!(f, "byte"),
            ResolvedType::Utf8 => write!(f, "utf8"),
            ResolvedType::UnsignedInt { bits, cast_mode } => {
                write!(f, "{cast_mode} uint{bits}")
            }
            ResolvedType::SignedInt { bits, cast_mode } => write!(f, "{cast_mode} int{bits}"),
            ResolvedType::Float { bits, cast_mode } => write!(f, "{cast_mode} float{bits}"),
            ResolvedType::Array(array) => {
                write!(f, "{}", array.element)?;
                match array.kind {
                    ArrayKind::Fixed(n) => write!(f, "[{n}]"),
                    ArrayKind::VariableInclusive(n) => write!(f, "[<={n}]"),
                    ArrayKind::VariableExclusive(n) => write!(f, "[<{n}]"),
                }
            }
            ResolvedType::Composite(composite) => {
                write!(f, "{}.{}", composite.full_name(), composite.version())
            }
        }
    }
}

/// Structure or tagged union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    /// Fields serialized in declaration order.
    Structure,
    /// Exactly one field present at a time, selected by an implicit tag.
    Union,
}

/// Whether a composite is closed to extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sealing {
    /// Non-extensible; the layout is final.
    Sealed,
    /// Extensible behind a delimiter header, up to `extent` bits.
    Delimited { extent: u64 },
}

/// One attribute of a composite, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// A named field contributing to the serialized layout.
    Field { ty: ResolvedType, name: SmolStr },
    /// Unnamed void padding of 1..=64 bits.
    Padding { bits: u8 },
    /// A named compile-time constant; contributes nothing to the layout.
    Constant {
        ty: ResolvedType,
        name: SmolStr,
        value: Value,
    },
}

impl Attribute {
    /// The attribute's name; padding fields have none.
    pub fn name(&self) -> Option<&SmolStr> {
        match self {
            Attribute::Field { name, .. } | Attribute::Constant { name, .. } => Some(name),
            Attribute::Padding { .. } => None,
        }
    }
}

/// A named, versioned, sealed-on-completion composite type.
#[derive(Debug)]
pub struct CompositeType {
    full_name: String,
    version: Version,
    kind: CompositeKind,
    attributes: Vec<Attribute>,
    deprecated: bool,
    fixed_port_id: Option<u16>,
    sealing: Sealing,
    bit_length_set: BitLengthSet,
    source_path: PathBuf,
}

impl CompositeType {
    /// Assembles a sealed composite. Only the builder calls this; all
    /// invariants have been checked by the time it runs.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        full_name: String,
        version: Version,
        kind: CompositeKind,
        attributes: Vec<Attribute>,
        deprecated: bool,
        fixed_port_id: Option<u16>,
        sealing: Sealing,
        bit_length_set: BitLengthSet,
        source_path: PathBuf,
    ) -> Self {
        Self {
            full_name,
            version,
            kind,
            attributes,
            deprecated,
            fixed_port_id,
            sealing,
            bit_length_set,
            source_path,
        }
    }

    /// The dot-separated full name, e.g. `vehicle.GeoPoint`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The last name component.
    pub fn short_name(&self) -> &str {
        self.full_name
            .rsplit('.')
            .next()
            .expect("full name is never empty")
    }

    /// The namespace part of the full name (everything but the last
    /// component), empty for single-component names.
    pub fn namespace(&self) -> &str {
        match self.full_name.rfind('.') {
            Some(index) => &self.full_name[..index],
            None => "",
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn kind(&self) -> CompositeKind {
        self.kind
    }

    /// All attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The field attributes (padding excluded) in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&ResolvedType, &SmolStr)> {
        self.attributes.iter().filter_map(|attr| match attr {
            Attribute::Field { ty, name } => Some((ty, name)),
            _ => None,
        })
    }

    /// The constant attributes in declaration order.
    pub fn constants(&self) -> impl Iterator<Item = (&ResolvedType, &SmolStr, &Value)> {
        self.attributes.iter().filter_map(|attr| match attr {
            Attribute::Constant { ty, name, value } => Some((ty, name, value)),
            _ => None,
        })
    }

    /// Looks up a constant by name.
    pub fn constant_value(&self, name: &str) -> Option<&Value> {
        self.constants()
            .find(|(_, n, _)| n.as_str() == name)
            .map(|(_, _, value)| value)
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn fixed_port_id(&self) -> Option<u16> {
        self.fixed_port_id
    }

    pub fn sealing(&self) -> Sealing {
        self.sealing
    }

    /// True when the layout is final and not delimited.
    pub fn is_sealed(&self) -> bool {
        matches!(self.sealing, Sealing::Sealed)
    }

    /// The extent: the declared envelope for delimited types, or the
    /// maximum serialized length for sealed ones.
    pub fn extent(&self) -> u64 {
        match self.sealing {
            Sealing::Sealed => self.bit_length_set.max(),
            Sealing::Delimited { extent } => extent,
        }
    }

    /// The exact set of possible serialized lengths of this composite.
    pub fn bit_length_set(&self) -> &BitLengthSet {
        &self.bit_length_set
    }

    /// The definition file this composite was built from.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

impl PartialEq for CompositeType {
    /// Identity comparison: `(full_name, version)` is globally unique.
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name && self.version == other.version
    }
}

impl fmt::Display for CompositeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.full_name, self.version)
    }
}

/// A service: a request/response pair of composites under one name.
///
/// The service itself is not serializable and cannot be referenced as a
/// field type. The two sides are owned exclusively and named
/// `<full_name>.Request` and `<full_name>.Response`.
#[derive(Debug)]
pub struct ServiceType {
    full_name: String,
    version: Version,
    deprecated: bool,
    fixed_port_id: Option<u16>,
    request: Arc<CompositeType>,
    response: Arc<CompositeType>,
    source_path: PathBuf,
}

impl ServiceType {
    pub(crate) fn new(
        full_name: String,
        version: Version,
        deprecated: bool,
        fixed_port_id: Option<u16>,
        request: Arc<CompositeType>,
        response: Arc<CompositeType>,
        source_path: PathBuf,
    ) -> Self {
        Self {
            full_name,
            version,
            deprecated,
            fixed_port_id,
            request,
            response,
            source_path,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn fixed_port_id(&self) -> Option<u16> {
        self.fixed_port_id
    }

    pub fn request(&self) -> &Arc<CompositeType> {
        &self.request
    }

    pub fn response(&self) -> &Arc<CompositeType> {
        &self.response
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.full_name, self.version)
    }
}

/// A top-level definition produced by reading a namespace.
#[derive(Debug, Clone)]
pub enum TypeDefinition {
    Message(Arc<CompositeType>),
    Service(Arc<ServiceType>),
}

impl TypeDefinition {
    pub fn full_name(&self) -> &str {
        match self {
            TypeDefinition::Message(composite) => composite.full_name(),
            TypeDefinition::Service(service) => service.full_name(),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            TypeDefinition::Message(composite) => composite.version(),
            TypeDefinition::Service(service) => service.version(),
        }
    }

    pub fn is_deprecated(&self) -> bool {
        match self {
            TypeDefinition::Message(composite) => composite.is_deprecated(),
            TypeDefinition::Service(service) => service.is_deprecated(),
        }
    }

    pub fn fixed_port_id(&self) -> Option<u16> {
        match self {
            TypeDefinition::Message(composite) => composite.fixed_port_id(),
            TypeDefinition::Service(service) => service.fixed_port_id(),
        }
    }

    pub fn source_path(&self) -> &Path {
        match self {
            TypeDefinition::Message(composite) => composite.source_path(),
            TypeDefinition::Service(service) => service.source_path(),
        }
    }

    /// The message composite, when this definition is a message.
    pub fn as_message(&self) -> Option<&Arc<CompositeType>> {
        match self {
            TypeDefinition::Message(composite) => Some(composite),
            TypeDefinition::Service(_) => None,
        }
    }

    /// The service, when this definition is a service.
    pub fn as_service(&self) -> Option<&Arc<ServiceType>> {
        match self {
            TypeDefinition::Service(service) => Some(service),
            TypeDefinition::Message(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u8_type() -> ResolvedType {
        ResolvedType::UnsignedInt {
            bits: 8,
            cast_mode: CastMode::Saturated,
        }
    }

    #[test]
    fn bits_to_represent_counts() {
        assert_eq!(bits_to_represent(0), 1);
        assert_eq!(bits_to_represent(1), 1);
        assert_eq!(bits_to_represent(2), 2);
        assert_eq!(bits_to_represent(3), 2);
        assert_eq!(bits_to_represent(4), 3);
        assert_eq!(bits_to_represent(255), 8);
        assert_eq!(bits_to_represent(256), 9);
    }

    #[test]
    fn variable_inclusive_array_lengths() {
        let array = ArrayType {
            element: Box::new(u8_type()),
            kind: ArrayKind::VariableInclusive(3),
        };
        assert_eq!(array.max_count(), 3);
        assert_eq!(array.length_tag_bits(), 2);
        assert_eq!(
            array.bit_length_set(),
            BitLengthSet::from_lengths([2, 10, 18, 26])
        );
    }

    #[test]
    fn variable_exclusive_array_lengths() {
        let array = ArrayType {
            element: Box::new(u8_type()),
            kind: ArrayKind::VariableExclusive(3),
        };
        assert_eq!(array.max_count(), 2);
        assert_eq!(array.length_tag_bits(), 2);
        assert_eq!(
            array.bit_length_set(),
            BitLengthSet::from_lengths([2, 10, 18])
        );
    }

    #[test]
    fn fixed_array_lengths() {
        let array = ArrayType {
            element: Box::new(u8_type()),
            kind: ArrayKind::Fixed(4),
        };
        assert_eq!(array.length_tag_bits(), 0);
        assert_eq!(array.bit_length_set(), BitLengthSet::singleton(32));
    }

    #[test]
    fn primitive_display_forms() {
        assert_eq!(u8_type().to_string(), "saturated uint8");
        assert_eq!(
            ResolvedType::Float {
                bits: 32,
                cast_mode: CastMode::Truncated
            }
            .to_string(),
            "truncated float32"
        );
        assert_eq!(ResolvedType::Void(13).to_string(), "void13");
        assert_eq!(ResolvedType::Boolean.to_string(), "bool");
        let array = ResolvedType::Array(ArrayType {
            element: Box::new(u8_type()),
            kind: ArrayKind::VariableInclusive(3),
        });
        assert_eq!(array.to_string(), "saturated uint8[<=3]");
    }

    #[test]
    fn integer_ranges() {
        let (lo, hi) = u8_type().integer_range().unwrap();
        assert_eq!(lo, BigInt::from(0));
        assert_eq!(hi, BigInt::from(255));

        let (lo, hi) = ResolvedType::SignedInt {
            bits: 8,
            cast_mode: CastMode::Saturated,
        }
        .integer_range()
        .unwrap();
        assert_eq!(lo, BigInt::from(-128));
        assert_eq!(hi, BigInt::from(127));

        assert!(ResolvedType::Boolean.integer_range().is_none());
    }

    #[test]
    fn float16_max_magnitude() {
        let max = ResolvedType::Float {
            bits: 16,
            cast_mode: CastMode::Saturated,
        }
        .float_max_magnitude()
        .unwrap();
        assert_eq!(max, BigRational::from_integer(BigInt::from(65504)));
    }
}
