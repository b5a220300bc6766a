//! Interpretation of lowered definition lines into sealed types.
//!
//! The builder walks the [`Line`](crate::parser::Line) records of one
//! definition in order, dispatching directives, resolving type
//! expressions, evaluating constant initialisers in the attribute scope
//! accumulated so far, and enforcing the seal-time invariants. Service
//! definitions are split at the `---` marker and each side is built as
//! its own composite.

use crate::bit_length_set::BitLengthSet;
use crate::error::{ErrorKind, FrontendError, Result};
use crate::expr::{self, EvalContext, EvalError, Value};
use crate::parser::expression::Expression;
use crate::parser::types::{ArraySuffixKind, PrimitiveKind, ScalarTypeExpr, TypeExpr};
use crate::parser::{Line, Statement};
use crate::types::{
    ArrayKind, ArrayType, Attribute, CastMode, CompositeKind, CompositeType, ResolvedType,
    Sealing, ServiceType, TypeDefinition, Version, bits_to_represent,
};
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// The largest subject identifier expressible on the transport.
pub const MAX_SUBJECT_ID: u16 = 8191;
/// The largest service identifier expressible on the transport.
pub const MAX_SERVICE_ID: u16 = 511;
/// Fixed subject identifiers reserved for regulated definitions.
pub const REGULATED_SUBJECT_IDS: std::ops::RangeInclusive<u16> = 6144..=8191;
/// Fixed service identifiers reserved for regulated definitions.
pub const REGULATED_SERVICE_IDS: std::ops::RangeInclusive<u16> = 256..=511;

/// Services the builder obtains from the namespace resolver.
pub trait BuildServices {
    /// Resolves a composite by full name, building it on demand.
    ///
    /// `version = None` selects the newest available version. `Ok(None)`
    /// means the name is unknown.
    fn resolve_composite(
        &mut self,
        full_name: &str,
        version: Option<Version>,
    ) -> Result<Option<Arc<CompositeType>>>;

    /// Emits `@print` output or a diagnostic through the user callback.
    fn emit_print(&mut self, text: &str, path: &Path, line: usize);

    /// Whether fixed port identifiers outside the regulated ranges are
    /// accepted.
    fn allow_unregulated_fixed_port_id(&self) -> bool;

    /// Whether deprecation warnings abort the build.
    fn elevate_deprecation_warnings(&self) -> bool;
}

/// Builds one definition from its lowered lines.
///
/// `fixed_port_id` is the raw value parsed from the file name; its range
/// is validated here because validity depends on whether the definition
/// turns out to be a service.
pub fn build_definition(
    lines: &[Line],
    full_name: &str,
    version: Version,
    fixed_port_id: Option<u64>,
    path: &Path,
    services: &mut dyn BuildServices,
) -> Result<TypeDefinition> {
    debug!(definition = full_name, %version, "building definition");

    let sections = split_sections(lines, path)?;
    let is_service = sections.len() == 2;

    let fixed_port_id = match fixed_port_id {
        Some(raw) => Some(validate_fixed_port_id(raw, is_service, path, services)?),
        None => None,
    };

    let mut deprecated = false;
    let mut composites = Vec::with_capacity(sections.len());
    for (index, section) in sections.iter().enumerate() {
        let section_name = match (is_service, index) {
            (false, _) => full_name.to_string(),
            (true, 0) => format!("{full_name}.Request"),
            _ => format!("{full_name}.Response"),
        };
        let mut builder = SectionBuilder::new(
            section_name,
            short_name_of(full_name),
            namespace_of(full_name).to_string(),
            version,
            // Port identifiers attach to the definition; the service
            // sides carry none of their own.
            if is_service { None } else { fixed_port_id },
            path,
            index == 0,
            deprecated,
        );
        for line in *section {
            builder.process(line, services)?;
        }
        let (composite, section_deprecated) = builder.seal()?;
        deprecated |= section_deprecated;
        composites.push(Arc::new(composite));
    }

    if is_service {
        let response = composites.pop().expect("two sections were built");
        let request = composites.pop().expect("two sections were built");
        Ok(TypeDefinition::Service(Arc::new(ServiceType::new(
            full_name.to_string(),
            version,
            deprecated,
            fixed_port_id.map(|id| id as u16),
            request,
            response,
            path.to_path_buf(),
        ))))
    } else {
        let composite = composites.pop().expect("one section was built");
        Ok(TypeDefinition::Message(composite))
    }
}

fn short_name_of(full_name: &str) -> &str {
    full_name.rsplit('.').next().expect("name is never empty")
}

/// Splits the lines at the `---` marker. At most one marker is allowed.
fn split_sections<'a>(lines: &'a [Line], path: &Path) -> Result<Vec<&'a [Line]>> {
    let mut markers = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.statement == Statement::ServiceMarker);
    match (markers.next(), markers.next()) {
        (None, _) => Ok(vec![lines]),
        (Some((index, _)), None) => Ok(vec![&lines[..index], &lines[index + 1..]]),
        (Some(_), Some((_, extra))) => Err(FrontendError::new(
            ErrorKind::Semantic,
            "a definition can contain at most one service response marker",
        )
        .with_path(path)
        .with_line(extra.line_number)),
    }
}

fn validate_fixed_port_id(
    raw: u64,
    is_service: bool,
    path: &Path,
    services: &mut dyn BuildServices,
) -> Result<u64> {
    let (max, regulated, kind_name) = if is_service {
        (MAX_SERVICE_ID, REGULATED_SERVICE_IDS, "service")
    } else {
        (MAX_SUBJECT_ID, REGULATED_SUBJECT_IDS, "subject")
    };
    if raw > max as u64 {
        return Err(FrontendError::new(
            ErrorKind::PortId,
            format!("fixed {kind_name} identifier {raw} exceeds the maximum of {max}"),
        )
        .with_path(path));
    }
    if !regulated.contains(&(raw as u16)) && !services.allow_unregulated_fixed_port_id() {
        return Err(FrontendError::new(
            ErrorKind::PortId,
            format!(
                "fixed {kind_name} identifier {raw} is outside the regulated range \
                 {}..={}; pass allow_unregulated_fixed_port_id to accept it",
                regulated.start(),
                regulated.end()
            ),
        )
        .with_path(path));
    }
    Ok(raw)
}

/// Accumulated state for one composite (a message, or one service side).
struct SectionBuilder<'a> {
    full_name: String,
    definition_short_name: &'a str,
    /// Namespace against which single-component references resolve; the
    /// namespace of the definition, shared by both service sections.
    referencing_namespace: String,
    version: Version,
    fixed_port_id: Option<u64>,
    path: &'a Path,
    is_first_section: bool,

    kind: CompositeKind,
    attributes: Vec<Attribute>,
    constants: HashMap<SmolStr, Value>,
    /// Running offset of a structure; meaningless once `kind` is Union.
    offset: BitLengthSet,
    /// Bit-length sets of union alternatives.
    alternative_sets: Vec<BitLengthSet>,
    sealing: Option<Sealing>,
    /// Line of the `@extent`/`@sealed` directive, for seal-time errors.
    sealing_line: usize,
    deprecated: bool,
}

impl<'a> SectionBuilder<'a> {
    fn new(
        full_name: String,
        definition_short_name: &'a str,
        referencing_namespace: String,
        version: Version,
        fixed_port_id: Option<u64>,
        path: &'a Path,
        is_first_section: bool,
        deprecated: bool,
    ) -> Self {
        Self {
            full_name,
            definition_short_name,
            referencing_namespace,
            version,
            fixed_port_id,
            path,
            is_first_section,
            kind: CompositeKind::Structure,
            attributes: Vec::new(),
            constants: HashMap::new(),
            offset: BitLengthSet::zero(),
            alternative_sets: Vec::new(),
            sealing: None,
            sealing_line: 0,
            deprecated,
        }
    }

    fn process(&mut self, line: &Line, services: &mut dyn BuildServices) -> Result<()> {
        match &line.statement {
            Statement::Empty | Statement::ServiceMarker => Ok(()),
            Statement::Directive {
                name, expression, ..
            } => self.process_directive(name, expression.as_ref(), line.line_number, services),
            Statement::Field { ty, name, .. } => {
                self.process_field(ty, name, line.line_number, services)
            }
            Statement::Padding { ty } => self.process_padding(ty, line.line_number, services),
            Statement::Constant {
                ty,
                name,
                expression,
                ..
            } => self.process_constant(ty, name, expression, line.line_number, services),
        }
    }

    fn located(&self, kind: ErrorKind, message: impl Into<String>, line: usize) -> FrontendError {
        FrontendError::new(kind, message)
            .with_path(self.path)
            .with_line(line)
    }

    fn eval_failure(&self, error: EvalError, line: usize) -> FrontendError {
        match error {
            EvalError::Invalid { kind, message } => self.located(kind, message, line),
            // Keep the original location of an error raised while
            // building a referenced definition.
            EvalError::Propagated(error) => error,
        }
    }

    fn evaluate(
        &mut self,
        expression: &Expression,
        line: usize,
        services: &mut dyn BuildServices,
    ) -> Result<Value> {
        let namespace = self.referencing_namespace.clone();
        let offset = match self.kind {
            CompositeKind::Structure => Some(self.offset.clone()),
            CompositeKind::Union => None,
        };
        let mut ctx = SectionEvalContext {
            constants: &self.constants,
            offset,
            namespace,
            services,
        };
        expr::evaluate(expression, &mut ctx).map_err(|error| self.eval_failure(error, line))
    }

    // ------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------

    fn process_directive(
        &mut self,
        name: &str,
        expression: Option<&Expression>,
        line: usize,
        services: &mut dyn BuildServices,
    ) -> Result<()> {
        match name {
            "deprecated" => {
                self.expect_no_argument(name, expression, line)?;
                if !self.is_first_section {
                    return Err(self.located(
                        ErrorKind::Semantic,
                        "@deprecated applies to the whole definition and must \
                         appear in the request section",
                        line,
                    ));
                }
                if !self.attributes.is_empty() {
                    return Err(self.located(
                        ErrorKind::Semantic,
                        "@deprecated must precede the first attribute",
                        line,
                    ));
                }
                self.deprecated = true;
                Ok(())
            }
            "union" => {
                self.expect_no_argument(name, expression, line)?;
                if self.kind == CompositeKind::Union {
                    return Err(self.located(
                        ErrorKind::Semantic,
                        "@union is specified more than once",
                        line,
                    ));
                }
                if !self.attributes.is_empty() {
                    return Err(self.located(
                        ErrorKind::Semantic,
                        "@union must precede the first attribute",
                        line,
                    ));
                }
                self.kind = CompositeKind::Union;
                Ok(())
            }
            "sealed" => {
                self.expect_no_argument(name, expression, line)?;
                self.set_sealing(Sealing::Sealed, line)
            }
            "extent" => {
                let Some(expression) = expression else {
                    return Err(self.located(
                        ErrorKind::Semantic,
                        "@extent requires an expression specifying the extent in bits",
                        line,
                    ));
                };
                let value = self.evaluate(expression, line, services)?;
                let Some(bits) = value.as_integer().and_then(|v| v.to_u64()) else {
                    return Err(self.located(
                        ErrorKind::InvalidOperand,
                        format!("the extent must be a non-negative integer, got {value}"),
                        line,
                    ));
                };
                if bits % 8 != 0 {
                    return Err(self.located(
                        ErrorKind::Semantic,
                        format!("the extent must be a multiple of 8 bits, got {bits}"),
                        line,
                    ));
                }
                self.set_sealing(Sealing::Delimited { extent: bits }, line)
            }
            "print" => {
                let text = match expression {
                    Some(expression) => {
                        self.evaluate(expression, line, services)?.to_string()
                    }
                    None => String::new(),
                };
                services.emit_print(&text, self.path, line);
                Ok(())
            }
            "assert" => {
                let Some(expression) = expression else {
                    return Err(self.located(
                        ErrorKind::Semantic,
                        "@assert requires a boolean expression",
                        line,
                    ));
                };
                match self.evaluate(expression, line, services)? {
                    Value::Boolean(true) => Ok(()),
                    Value::Boolean(false) => Err(self.located(
                        ErrorKind::Semantic,
                        "assertion check has failed",
                        line,
                    )),
                    other => Err(self.located(
                        ErrorKind::InvalidOperand,
                        format!(
                            "the assertion check expression must yield a boolean, got {}",
                            other.kind_name()
                        ),
                        line,
                    )),
                }
            }
            _ => Err(self.located(
                ErrorKind::Semantic,
                format!("unknown directive '@{name}'"),
                line,
            )),
        }
    }

    fn expect_no_argument(
        &self,
        name: &str,
        expression: Option<&Expression>,
        line: usize,
    ) -> Result<()> {
        if expression.is_some() {
            return Err(self.located(
                ErrorKind::Semantic,
                format!("@{name} does not take an expression"),
                line,
            ));
        }
        Ok(())
    }

    fn set_sealing(&mut self, sealing: Sealing, line: usize) -> Result<()> {
        if self.sealing.is_some() {
            return Err(self.located(
                ErrorKind::Semantic,
                "the sealing policy is specified more than once \
                 (@sealed and @extent are mutually exclusive)",
                line,
            ));
        }
        self.sealing = Some(sealing);
        self.sealing_line = line;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    fn process_field(
        &mut self,
        ty: &TypeExpr,
        name: &SmolStr,
        line: usize,
        services: &mut dyn BuildServices,
    ) -> Result<()> {
        let resolved = self.resolve_type(ty, line, services)?;
        if resolved.is_void() {
            return Err(self.located(
                ErrorKind::Semantic,
                "void types are padding and cannot be named; remove the name",
                line,
            ));
        }
        self.check_attribute_name(name, line)?;
        self.check_deprecation(&resolved, line, services)?;
        self.check_composite_alignment(&resolved, line)?;

        let contribution = resolved.bit_length_set();
        match self.kind {
            CompositeKind::Structure => {
                self.offset = self.offset.concatenate(&contribution);
            }
            CompositeKind::Union => self.alternative_sets.push(contribution),
        }
        self.attributes.push(Attribute::Field {
            ty: resolved,
            name: name.clone(),
        });
        Ok(())
    }

    fn process_padding(
        &mut self,
        ty: &TypeExpr,
        line: usize,
        services: &mut dyn BuildServices,
    ) -> Result<()> {
        let resolved = self.resolve_type(ty, line, services)?;
        let ResolvedType::Void(bits) = resolved else {
            return Err(self.located(
                ErrorKind::Parse,
                "a field of non-void type must have a name",
                line,
            ));
        };
        if self.kind == CompositeKind::Union {
            return Err(self.located(
                ErrorKind::Semantic,
                "unions cannot contain padding fields",
                line,
            ));
        }
        self.offset = self
            .offset
            .concatenate(&BitLengthSet::singleton(bits as u64));
        self.attributes.push(Attribute::Padding { bits });
        Ok(())
    }

    fn process_constant(
        &mut self,
        ty: &TypeExpr,
        name: &SmolStr,
        expression: &Expression,
        line: usize,
        services: &mut dyn BuildServices,
    ) -> Result<()> {
        if ty.array.is_some() {
            return Err(self.located(
                ErrorKind::Semantic,
                "constants cannot have array types",
                line,
            ));
        }
        let resolved = self.resolve_type(ty, line, services)?;
        if !constant_capable(&resolved) {
            return Err(self.located(
                ErrorKind::Semantic,
                format!("the type of a constant must be a scalar primitive, got '{resolved}'"),
                line,
            ));
        }
        if ty.cast_mode == Some(CastMode::Truncated) {
            return Err(self.located(
                ErrorKind::Semantic,
                "constants cannot use the truncated cast mode",
                line,
            ));
        }
        self.check_attribute_name(name, line)?;

        let value = self.evaluate(expression, line, services)?;
        let value = coerce_constant(&resolved, value)
            .map_err(|message| self.located(ErrorKind::InvalidOperand, message, line))?;

        self.constants.insert(name.clone(), value.clone());
        self.attributes.push(Attribute::Constant {
            ty: resolved,
            name: name.clone(),
            value,
        });
        Ok(())
    }

    fn resolve_type(
        &mut self,
        ty: &TypeExpr,
        line: usize,
        services: &mut dyn BuildServices,
    ) -> Result<ResolvedType> {
        let cast_mode = ty.cast_mode.unwrap_or(CastMode::Saturated);
        let scalar = match &ty.scalar {
            ScalarTypeExpr::Primitive(kind) => primitive_type(*kind, cast_mode),
            ScalarTypeExpr::Versioned(path) => {
                let full_name = self.qualify(&path.joined());
                let composite = services
                    .resolve_composite(&full_name, path.version)
                    // Location-less failures (e.g. a service used as a
                    // field type) point at the referencing line; errors
                    // from the referenced definition keep their own.
                    .map_err(|error| {
                        if error.path().is_some() {
                            error
                        } else {
                            error.with_path(self.path).with_line(line)
                        }
                    })?
                    .ok_or_else(|| {
                        self.located(
                            ErrorKind::UndefinedType,
                            match path.version {
                                Some(version) => format!(
                                    "type '{full_name}' version {version} could not be found"
                                ),
                                None => format!("type '{full_name}' could not be found"),
                            },
                            line,
                        )
                    })?;
                ResolvedType::Composite(composite)
            }
        };

        let Some(array) = &ty.array else {
            return Ok(scalar);
        };
        if scalar.is_void() {
            return Err(self.located(
                ErrorKind::Semantic,
                "arrays of void types are not allowed",
                line,
            ));
        }

        let capacity_value = self.evaluate(&array.capacity, line, services)?;
        let Some(capacity) = capacity_value.as_integer().and_then(|v| v.to_u64()) else {
            return Err(self.located(
                ErrorKind::InvalidOperand,
                format!(
                    "the array capacity must be a positive integer, got {capacity_value}"
                ),
                line,
            ));
        };
        let (kind, minimum) = match array.kind {
            ArraySuffixKind::Fixed => (ArrayKind::Fixed(capacity), 1),
            ArraySuffixKind::Inclusive => (ArrayKind::VariableInclusive(capacity), 1),
            // `[<N]` allows up to N-1 elements, so N must exceed one.
            ArraySuffixKind::Exclusive => (ArrayKind::VariableExclusive(capacity), 2),
        };
        if capacity < minimum {
            return Err(self.located(
                ErrorKind::InvalidOperand,
                format!("the array capacity is too small: {capacity} < {minimum}"),
                line,
            ));
        }
        Ok(ResolvedType::Array(ArrayType {
            element: Box::new(scalar),
            kind,
        }))
    }

    /// Qualifies a relative type name: single-component references live
    /// in the namespace of the referencing definition.
    fn qualify(&self, name: &str) -> String {
        if name.contains('.') || self.referencing_namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.referencing_namespace)
        }
    }

    fn check_attribute_name(&self, name: &SmolStr, line: usize) -> Result<()> {
        if self
            .attributes
            .iter()
            .any(|attr| attr.name().is_some_and(|n| n == name))
        {
            return Err(self.located(
                ErrorKind::Naming,
                format!("the attribute name '{name}' is used more than once"),
                line,
            ));
        }
        if is_reserved_name(name, self.definition_short_name) {
            return Err(self.located(
                ErrorKind::Naming,
                format!("the name '{name}' is reserved and cannot be used"),
                line,
            ));
        }
        if name.starts_with('_') || name.ends_with('_') || name.contains("__") {
            return Err(self.located(
                ErrorKind::Naming,
                format!("the name '{name}' uses a reserved underscore pattern"),
                line,
            ));
        }
        Ok(())
    }

    fn check_deprecation(
        &self,
        resolved: &ResolvedType,
        line: usize,
        services: &mut dyn BuildServices,
    ) -> Result<()> {
        let Some(composite) = resolved.references_composite() else {
            return Ok(());
        };
        if !composite.is_deprecated() || self.deprecated {
            return Ok(());
        }
        let message = format!(
            "{}.{} references the deprecated type {}",
            self.full_name, self.version, composite
        );
        if services.elevate_deprecation_warnings() {
            return Err(self.located(ErrorKind::DeprecationWarningElevated, message, line));
        }
        let warning = format!("warning: {message}");
        services.emit_print(&warning, self.path, line);
        Ok(())
    }

    /// Composite references are byte-aligned on the wire, so a composite
    /// field may only start at a byte-aligned offset, and array elements
    /// of composite type must keep their successors aligned.
    fn check_composite_alignment(&self, resolved: &ResolvedType, line: usize) -> Result<()> {
        if self.kind != CompositeKind::Structure {
            return Ok(());
        }
        if resolved.references_composite().is_none() {
            return Ok(());
        }
        if !self.offset.is_aligned_at_byte() {
            return Err(self.located(
                ErrorKind::Semantic,
                format!(
                    "composite-typed fields must be byte-aligned, but the offset here is {}",
                    self.offset
                ),
                line,
            ));
        }
        if let ResolvedType::Array(array) = resolved {
            if !array.element.bit_length_set().is_aligned_at_byte() {
                return Err(self.located(
                    ErrorKind::Semantic,
                    "the element of an array of composites must have byte-aligned \
                     serialized lengths",
                    line,
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sealing
    // ------------------------------------------------------------------

    fn seal(self) -> Result<(CompositeType, bool)> {
        let bit_length_set = match self.kind {
            CompositeKind::Structure => self.offset.clone(),
            CompositeKind::Union => {
                let alternatives = self.alternative_sets.len();
                if alternatives < 2 {
                    return Err(FrontendError::new(
                        ErrorKind::Semantic,
                        format!("a union must have at least two fields, got {alternatives}"),
                    )
                    .with_path(self.path));
                }
                let tag_bits = bits_to_represent(alternatives as u64 - 1);
                BitLengthSet::singleton(tag_bits as u64)
                    .concatenate(&BitLengthSet::unify_over(self.alternative_sets.clone()))
            }
        };

        let Some(sealing) = self.sealing else {
            return Err(FrontendError::new(
                ErrorKind::Semantic,
                "the definition must specify either @sealed or @extent",
            )
            .with_path(self.path));
        };
        if let Sealing::Delimited { extent } = sealing {
            if extent < bit_length_set.max() {
                return Err(FrontendError::new(
                    ErrorKind::Semantic,
                    format!(
                        "the specified extent of {extent} bits is less than the \
                         maximum serialized length {}",
                        bit_length_set.max()
                    ),
                )
                .with_path(self.path)
                .with_line(self.sealing_line));
            }
        }

        debug!(
            composite = %self.full_name,
            lengths = %bit_length_set,
            "sealed composite"
        );
        let deprecated = self.deprecated;
        Ok((
            CompositeType::new(
                self.full_name,
                self.version,
                self.kind,
                self.attributes,
                deprecated,
                self.fixed_port_id.map(|id| id as u16),
                sealing,
                bit_length_set,
                self.path.to_path_buf(),
            ),
            deprecated,
        ))
    }
}

/// The namespace part of a dotted name (empty when there is none).
fn namespace_of(full_name: &str) -> &str {
    match full_name.rfind('.') {
        Some(index) => &full_name[..index],
        None => "",
    }
}

fn primitive_type(kind: PrimitiveKind, cast_mode: CastMode) -> ResolvedType {
    match kind {
        PrimitiveKind::Bool => ResolvedType::Boolean,
        PrimitiveKind::Byte => ResolvedType::Byte,
        PrimitiveKind::Utf8 => ResolvedType::Utf8,
        PrimitiveKind::Void(bits) => ResolvedType::Void(bits),
        PrimitiveKind::UnsignedInt(bits) => ResolvedType::UnsignedInt { bits, cast_mode },
        PrimitiveKind::SignedInt(bits) => ResolvedType::SignedInt { bits, cast_mode },
        PrimitiveKind::Float(bits) => ResolvedType::Float { bits, cast_mode },
    }
}

/// Constant types are scalar primitives; void and composites are not
/// value-capable.
fn constant_capable(ty: &ResolvedType) -> bool {
    matches!(
        ty,
        ResolvedType::Boolean
            | ResolvedType::Byte
            | ResolvedType::Utf8
            | ResolvedType::UnsignedInt { .. }
            | ResolvedType::SignedInt { .. }
            | ResolvedType::Float { .. }
    )
}

/// Validates that `value` is assignable to a constant of type `ty`.
fn coerce_constant(ty: &ResolvedType, value: Value) -> std::result::Result<Value, String> {
    match ty {
        ResolvedType::Boolean => match value {
            Value::Boolean(_) => Ok(value),
            other => Err(format!(
                "a boolean constant requires a boolean value, got {}",
                other.kind_name()
            )),
        },
        ResolvedType::UnsignedInt { .. }
        | ResolvedType::SignedInt { .. }
        | ResolvedType::Byte
        | ResolvedType::Utf8 => {
            let (lo, hi) = ty.integer_range().expect("integer types have a range");
            let Some(integer) = value.as_integer() else {
                return Err(format!(
                    "an integer constant requires an integer value, got {value}"
                ));
            };
            if *integer < lo || *integer > hi {
                return Err(format!(
                    "the value {integer} is out of range for '{ty}': [{lo}, {hi}]"
                ));
            }
            Ok(value)
        }
        ResolvedType::Float { .. } => {
            let Value::Rational(rational) = &value else {
                return Err(format!(
                    "a float constant requires a rational value, got {}",
                    value.kind_name()
                ));
            };
            let max = ty
                .float_max_magnitude()
                .expect("float types have a max magnitude");
            if rational.abs() > max {
                return Err(format!("the value is out of range for '{ty}'"));
            }
            Ok(value)
        }
        _ => Err(format!("'{ty}' cannot be the type of a constant")),
    }
}

/// Reserved attribute names: keywords, primitive patterns, the offset
/// variable, and the short name of the enclosing definition. The check
/// is case-insensitive so near-collisions are rejected too.
fn is_reserved_name(name: &str, definition_short_name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if matches!(lower.as_str(), "saturated" | "truncated" | "true" | "false") {
        return true;
    }
    if lower == "_offset_" {
        return true;
    }
    if lower == definition_short_name.to_ascii_lowercase() {
        return true;
    }
    for prefix in ["uint", "int", "float", "void", "bool", "byte", "utf8"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            if rest.bytes().all(|b| b.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

/// Evaluation environment of one section at one point in the build.
struct SectionEvalContext<'a> {
    constants: &'a HashMap<SmolStr, Value>,
    /// `None` inside unions, where sequential offsets are undefined.
    offset: Option<BitLengthSet>,
    namespace: String,
    services: &'a mut dyn BuildServices,
}

impl EvalContext for SectionEvalContext<'_> {
    fn lookup_identifier(&self, name: &str) -> std::result::Result<Option<Value>, EvalError> {
        if name == "_offset_" {
            return match &self.offset {
                Some(offset) => Ok(Some(expr::rational_set(
                    offset.iter().map(|n| BigRational::from_integer(n.into())),
                ))),
                None => Err(EvalError::Invalid {
                    kind: ErrorKind::Semantic,
                    message: "_offset_ is not defined inside tagged unions".to_string(),
                }),
            };
        }
        Ok(self.constants.get(name).cloned())
    }

    fn resolve_composite(
        &mut self,
        name: &str,
        version: Option<Version>,
    ) -> std::result::Result<Option<ResolvedType>, EvalError> {
        let full_name = if name.contains('.') || self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.namespace)
        };
        match self.services.resolve_composite(&full_name, version) {
            Ok(Some(composite)) => Ok(Some(ResolvedType::Composite(composite))),
            Ok(None) => Ok(None),
            Err(error) => Err(EvalError::Propagated(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_definition;
    use std::path::PathBuf;

    /// Stand-in resolver with no peer types and default options.
    #[derive(Default)]
    struct StubServices {
        printed: Vec<(String, usize)>,
        allow_unregulated: bool,
        elevate: bool,
        peers: HashMap<(String, Version), Arc<CompositeType>>,
    }

    impl BuildServices for StubServices {
        fn resolve_composite(
            &mut self,
            full_name: &str,
            version: Option<Version>,
        ) -> Result<Option<Arc<CompositeType>>> {
            match version {
                Some(version) => Ok(self
                    .peers
                    .get(&(full_name.to_string(), version))
                    .cloned()),
                None => Ok(self
                    .peers
                    .iter()
                    .filter(|((name, _), _)| name == full_name)
                    .max_by_key(|((_, version), _)| *version)
                    .map(|(_, composite)| composite.clone())),
            }
        }

        fn emit_print(&mut self, text: &str, _path: &Path, line: usize) {
            self.printed.push((text.to_string(), line));
        }

        fn allow_unregulated_fixed_port_id(&self) -> bool {
            self.allow_unregulated
        }

        fn elevate_deprecation_warnings(&self) -> bool {
            self.elevate
        }
    }

    fn build(source: &str) -> Result<TypeDefinition> {
        build_with(source, &mut StubServices::default())
    }

    fn build_with(source: &str, services: &mut StubServices) -> Result<TypeDefinition> {
        let lines = parse_definition(source).expect("parse failed");
        build_definition(
            &lines,
            "ns.Example",
            Version { major: 1, minor: 0 },
            None,
            &PathBuf::from("/nonexistent/ns/Example.1.0.dsdl"),
            services,
        )
    }

    fn message(source: &str) -> Arc<CompositeType> {
        build(source)
            .expect("build failed")
            .as_message()
            .expect("expected a message")
            .clone()
    }

    #[test]
    fn two_field_structure_lengths() {
        let composite = message("saturated uint8 a\nsaturated uint16 b\n@sealed\n");
        assert_eq!(*composite.bit_length_set(), BitLengthSet::singleton(24));
        assert_eq!(composite.extent(), 24);
        assert!(composite.is_sealed());
    }

    #[test]
    fn variable_array_lengths() {
        let composite = message("saturated uint8[<=3] data\n@sealed\n");
        assert_eq!(
            *composite.bit_length_set(),
            BitLengthSet::from_lengths([2, 10, 18, 26])
        );
    }

    #[test]
    fn constant_folding_and_range() {
        let composite = message("saturated uint8 X = 1 + 2 * 3\n@sealed\n");
        let value = composite.constant_value("X").expect("constant exists");
        assert_eq!(*value, expr::integer_value(7));

        let err = build("saturated uint8 X = 256\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperand);
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn scoping_is_strictly_ordered() {
        // Forward references are rejected.
        let err = build("saturated uint8 A = B\nsaturated uint8 B = 1\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedType);

        // Earlier constants are visible to later ones.
        let composite =
            message("saturated uint8 A = 3\nsaturated uint8 B = A * 2\n@sealed\n");
        assert_eq!(
            *composite.constant_value("B").unwrap(),
            expr::integer_value(6)
        );
    }

    #[test]
    fn union_layout() {
        let composite = message(
            "@union\nsaturated uint8 a\nsaturated uint16 b\nsaturated uint32 c\n@sealed\n",
        );
        assert_eq!(composite.kind(), CompositeKind::Union);
        // Tag of ceil(log2(3)) == 2 bits plus each alternative.
        assert_eq!(
            *composite.bit_length_set(),
            BitLengthSet::from_lengths([10, 18, 34])
        );
    }

    #[test]
    fn union_of_two_has_one_tag_bit() {
        let composite = message("@union\nbool a\nbool b\n@sealed\n");
        assert_eq!(*composite.bit_length_set(), BitLengthSet::singleton(2));
    }

    #[test]
    fn union_requires_two_fields() {
        let err = build("@union\nsaturated uint8 a\n@sealed\n").unwrap_err();
        assert!(err.message().contains("at least two"));
    }

    #[test]
    fn union_rejects_padding() {
        let err = build("@union\nvoid3\nsaturated uint8 a\nbool b\n@sealed\n").unwrap_err();
        assert!(err.message().contains("padding"));
    }

    #[test]
    fn union_after_attribute_rejected() {
        let err = build("saturated uint8 a\n@union\nbool b\n@sealed\n").unwrap_err();
        assert!(err.message().contains("precede"));
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn sealing_required_and_exclusive() {
        let err = build("saturated uint8 a\n").unwrap_err();
        assert!(err.message().contains("@sealed or @extent"));

        let err = build("saturated uint8 a\n@sealed\n@extent 64\n").unwrap_err();
        assert!(err.message().contains("more than once"));
    }

    #[test]
    fn extent_rules() {
        let composite = message("saturated uint8 a\n@extent 64\n");
        assert!(!composite.is_sealed());
        assert_eq!(composite.extent(), 64);

        let err = build("saturated uint32 a\n@extent 16\n").unwrap_err();
        assert!(err.message().contains("less than"));

        let err = build("saturated uint8 a\n@extent 12\n").unwrap_err();
        assert!(err.message().contains("multiple of 8"));
    }

    #[test]
    fn print_reaches_the_callback() {
        let mut services = StubServices::default();
        build_with("@print 3 + 4\n@sealed\n", &mut services).unwrap();
        assert_eq!(services.printed, vec![("7".to_string(), 1)]);
    }

    #[test]
    fn assert_directive() {
        assert!(build("@assert 2 + 2 == 4\n@sealed\n").is_ok());
        let err = build("@assert 2 + 2 == 5\n@sealed\n").unwrap_err();
        assert!(err.message().contains("assertion check has failed"));
        let err = build("@assert 1 + 1\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperand);
    }

    #[test]
    fn offset_tracks_preceding_fields() {
        let source = "saturated uint8 a\nsaturated uint16 b\n\
                      @assert _offset_ == {24}\n@assert _offset_.max % 8 == 0\n@sealed\n";
        assert!(build(source).is_ok());
    }

    #[test]
    fn offset_rejected_in_unions() {
        let err =
            build("@union\nbool a\nbool b\n@assert _offset_.max > 0\n@sealed\n").unwrap_err();
        assert!(err.message().contains("_offset_"));
    }

    #[test]
    fn unknown_directive_is_fatal() {
        let err = build("@gibberish\n@sealed\n").unwrap_err();
        assert!(err.message().contains("unknown directive"));
    }

    #[test]
    fn duplicate_and_reserved_names() {
        let err = build("bool a\nbool a\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Naming);

        let err = build("bool uint8\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Naming);

        let err = build("bool Example\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Naming);

        let err = build("bool bad__name\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Naming);
    }

    #[test]
    fn named_void_rejected() {
        let err = build("void3 pad\n@sealed\n").unwrap_err();
        assert!(err.message().contains("cannot be named"));
    }

    #[test]
    fn service_builds_two_composites() {
        let definition = build("saturated uint8 q\n@sealed\n---\nbool ok\n@sealed\n").unwrap();
        let service = definition.as_service().expect("expected a service");
        assert_eq!(service.request().full_name(), "ns.Example.Request");
        assert_eq!(service.response().full_name(), "ns.Example.Response");
        assert_eq!(*service.request().bit_length_set(), BitLengthSet::singleton(8));
        assert_eq!(*service.response().bit_length_set(), BitLengthSet::singleton(1));
    }

    #[test]
    fn double_service_marker_rejected() {
        let err = build("bool a\n@sealed\n---\nbool b\n@sealed\n---\nbool c\n").unwrap_err();
        assert!(err.message().contains("at most one"));
    }

    #[test]
    fn empty_structure_is_zero_bits() {
        let composite = message("@sealed\n");
        assert_eq!(*composite.bit_length_set(), BitLengthSet::singleton(0));
    }

    #[test]
    fn constant_type_restrictions() {
        let err = build("saturated uint8[4] X = 5\n@sealed\n").unwrap_err();
        assert!(err.message().contains("array"));

        let err = build("truncated uint8 X = 5\n@sealed\n").unwrap_err();
        assert!(err.message().contains("truncated"));

        let err = build("bool X = 7\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperand);
    }

    #[test]
    fn float_constant_range() {
        assert!(build("float16 F = 65504\n@sealed\n").is_ok());
        let err = build("float16 F = 65505\n@sealed\n").unwrap_err();
        assert!(err.message().contains("out of range"));
    }

    #[test]
    fn non_integer_constant_for_integer_type_rejected() {
        let err = build("saturated uint8 X = 1 / 3\n@sealed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperand);
    }
}
