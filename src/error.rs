//! Error taxonomy for the DSDL front-end.
//!
//! Every failure mode of the front-end is reported as a single
//! [`FrontendError`] carrying an [`ErrorKind`], a human-readable message,
//! and the best-known source location. Processing of a definition stops
//! at the first error; errors raised while building a referenced type
//! propagate upward with their original location intact.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Classification of a front-end failure.
///
/// The taxonomy distinguishes faults in the input (everything except
/// [`ErrorKind::Internal`] and [`ErrorKind::Io`]) from faults in the
/// front-end itself or its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An invariant of the front-end itself was violated.
    Internal,
    /// A definition file could not be read.
    Io,
    /// The definition text does not match the grammar.
    Parse,
    /// The definition violates a semantic rule of the language.
    Semantic,
    /// A type reference does not resolve to any known definition.
    UndefinedType,
    /// An attribute access names a constant that does not exist.
    UndefinedAttribute,
    /// An expression applied an operator to unsupported operands
    /// (wrong domain, division by zero, out-of-range assignment).
    InvalidOperand,
    /// The dependency graph of definitions contains a cycle.
    CyclicDependency,
    /// Two versions sharing a major version are not bit-compatible.
    BitCompatibility,
    /// A name is malformed, reserved, or collides with another name.
    Naming,
    /// A version number is malformed or versions are inconsistent.
    Version,
    /// A fixed port identifier is out of range or conflicting.
    PortId,
    /// A deprecation warning was promoted to an error by configuration.
    DeprecationWarningElevated,
}

/// A front-end failure with its classification and source location.
///
/// Renders as the single-line form `<path>:<line>: <message>`; the line
/// number is omitted when unknown, and the path is omitted when the
/// failure is not attributable to a particular file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.path, .line, .message))]
pub struct FrontendError {
    kind: ErrorKind,
    message: String,
    path: Option<PathBuf>,
    line: Option<usize>,
}

fn render(path: &Option<PathBuf>, line: &Option<usize>, message: &String) -> String {
    match (path, line) {
        (Some(path), Some(line)) => format!("{}:{}: {}", path.display(), line, message),
        (Some(path), None) => format!("{}: {}", path.display(), message),
        _ => message.clone(),
    }
}

impl FrontendError {
    /// Creates an error of the given kind with no location attached.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            line: None,
        }
    }

    /// Creates an internal invariant-violation error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attaches a file path, preferring the absolute form when available.
    ///
    /// An already-attached path is kept: the first location recorded is
    /// the closest to the offending construct.
    pub fn with_path(mut self, path: &Path) -> Self {
        if self.path.is_none() {
            self.path = Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        }
        self
    }

    /// Attaches a 1-based line number unless one is already present.
    pub fn with_line(mut self, line: usize) -> Self {
        if self.line.is_none() && line > 0 {
            self.line = Some(line);
        }
        self
    }

    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message without the location prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the path of the offending file, if known.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the 1-based line number of the offending construct, if known.
    pub fn line(&self) -> Option<usize> {
        self.line
    }
}

/// Convenience result alias used throughout the front-end.
pub type Result<T> = std::result::Result<T, FrontendError>;
