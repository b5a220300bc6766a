//! Pure-Rust front-end for the DSDL data-type definition language.
//!
//! Given a root namespace directory (and optional lookup directories
//! supplying cross-referenced definitions), the front-end parses every
//! definition file, evaluates constant expressions with exact rational
//! arithmetic, resolves type references, computes the exact set of
//! possible serialized bit lengths for every composite, and enforces
//! the semantic rules of the language. The result is either the full
//! list of composite types or a single error pinpointing the first
//! offending construct as `<path>:<line>: <message>`.
//!
//! # Read a namespace
//!
//! ```no_run
//! use dsdl_parser::read_namespace;
//!
//! let types = read_namespace("vendor_types/vehicle".as_ref(), &[])?;
//! for definition in &types {
//!     println!("{} v{}", definition.full_name(), definition.version());
//! }
//! # Ok::<(), dsdl_parser::FrontendError>(())
//! ```
//!
//! # Capture `@print` output and diagnostics
//!
//! ```no_run
//! use dsdl_parser::{ReadOptions, read_namespace_with_options};
//!
//! let mut handler = |event: dsdl_parser::PrintEvent<'_>| {
//!     eprintln!("{}:{}: {}", event.path.display(), event.line, event.text);
//! };
//! let options = ReadOptions {
//!     allow_unregulated_fixed_port_id: false,
//!     elevate_deprecation_warnings: false,
//!     print_handler: Some(&mut handler),
//! };
//! let types = read_namespace_with_options("vendor_types/vehicle".as_ref(), &[], options)?;
//! # let _ = types;
//! # Ok::<(), dsdl_parser::FrontendError>(())
//! ```

pub mod bit_length_set;
pub mod builder;
pub mod diag;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod types;

use std::path::{Path, PathBuf};

// Re-export the primary data model.
pub use bit_length_set::BitLengthSet;
pub use types::{
    ArrayKind, ArrayType, Attribute, CastMode, CompositeKind, CompositeType, ResolvedType,
    Sealing, ServiceType, TypeDefinition, Version,
};

// Re-export the value domain.
pub use expr::{ElementKind, ScalarValue, Value, ValueSet};

// Re-export the error model.
pub use error::{ErrorKind, FrontendError};

// Re-export the entry-point configuration.
pub use resolver::{DSDL_FILE_EXTENSIONS, PrintEvent, ReadOptions};

// Port identifier ranges, re-exported for downstream validation.
pub use builder::{
    MAX_SERVICE_ID, MAX_SUBJECT_ID, REGULATED_SERVICE_IDS, REGULATED_SUBJECT_IDS,
};

/// Reads a root namespace with default options.
///
/// This is the recommended entry point. Definitions from lookup
/// directories are built when referenced but are not returned; the
/// output covers the target root only, sorted by full name and version.
pub fn read_namespace(
    root_namespace_directory: &Path,
    lookup_directories: &[PathBuf],
) -> Result<Vec<TypeDefinition>, FrontendError> {
    resolver::read_namespace_with_options(
        root_namespace_directory,
        lookup_directories,
        ReadOptions::default(),
    )
}

/// Reads a root namespace with explicit [`ReadOptions`].
pub fn read_namespace_with_options(
    root_namespace_directory: &Path,
    lookup_directories: &[PathBuf],
    options: ReadOptions<'_>,
) -> Result<Vec<TypeDefinition>, FrontendError> {
    resolver::read_namespace_with_options(root_namespace_directory, lookup_directories, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_namespace_directory_is_an_io_error() {
        let error = read_namespace(Path::new("/nonexistent/vehicle"), &[]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("vehicle"));
    }

    #[test]
    fn invalid_root_namespace_name_is_rejected() {
        let error = read_namespace(Path::new("/nonexistent/not-a-name"), &[]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Naming);
    }

    #[test]
    fn port_id_range_constants_are_consistent() {
        assert!(REGULATED_SUBJECT_IDS.end() <= &MAX_SUBJECT_ID);
        assert!(REGULATED_SERVICE_IDS.end() <= &MAX_SERVICE_ID);
    }
}
