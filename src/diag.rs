//! Span-based diagnostic model for the lexing and parsing phases.
//!
//! Inside a single definition file the lexer and parser describe problems
//! with byte spans. At the file boundary a [`Diag`] is converted either to
//! a [`FrontendError`](crate::error::FrontendError) with a 1-based line
//! number, or to a miette [`Report`] for rich terminal rendering.

use crate::error::{ErrorKind, FrontendError};
use miette::{Diagnostic, LabeledSpan, Report, Severity};
use std::fmt;
use std::ops::Range;
use std::path::Path;

/// A byte range within one definition file.
pub type Span = Range<usize>;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagSeverity {
    /// A fatal error that aborts processing of the definition.
    Error,
    /// A warning routed through the user callback.
    Warning,
}

impl fmt::Display for DiagSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagSeverity::Error => write!(f, "error"),
            DiagSeverity::Warning => write!(f, "warning"),
        }
    }
}

/// A labeled span within a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagLabel {
    /// The span this label refers to.
    pub span: Span,
    /// The label text explaining this span's relevance.
    pub message: String,
}

/// A structured diagnostic produced by the lexer or parser.
///
/// Captures everything needed both for the single-line `path:line:` error
/// form and for rendering a rich report with source context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diag {
    /// The severity level of this diagnostic.
    pub severity: DiagSeverity,
    /// The main diagnostic message.
    pub message: String,
    /// Labeled spans showing relevant source locations.
    pub labels: Vec<DiagLabel>,
    /// Optional help text suggesting how to fix the issue.
    pub help: Option<String>,
    /// The error classification used when converting to a `FrontendError`.
    pub kind: ErrorKind,
}

impl Diag {
    /// Creates a new error diagnostic classified as a parse failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: DiagSeverity::Error,
            message: message.into(),
            labels: Vec::new(),
            help: None,
            kind: ErrorKind::Parse,
        }
    }

    /// Adds a labeled span to this diagnostic.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            span,
            message: message.into(),
        });
        self
    }

    /// Sets the help text for this diagnostic.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Overrides the error classification.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the span of the first label, if any.
    pub fn primary_span(&self) -> Option<Span> {
        self.labels.first().map(|label| label.span.clone())
    }

    /// Converts this diagnostic to a located [`FrontendError`].
    ///
    /// The line number is derived from the first labeled span; a
    /// diagnostic without labels yields an error without a line.
    pub fn into_frontend_error(self, source: &SourceFile, path: &Path) -> FrontendError {
        let span = self.primary_span();
        let mut err = FrontendError::new(self.kind, self.message).with_path(path);
        if let Some(span) = span {
            err = err.with_line(source.line_of(span.start));
        }
        err
    }
}

/// A wrapper around the text of one definition file.
///
/// Provides span validation for diagnostic rendering and the byte-offset
/// to line-number mapping used by the `path:line:` error form.
#[derive(Debug, Clone)]
pub struct SourceFile {
    content: String,
    name: Option<String>,
}

impl SourceFile {
    /// Creates a new source file from the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: None,
        }
    }

    /// Creates a new source file carrying a display name.
    pub fn with_name(content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: Some(name.into()),
        }
    }

    /// Returns the source content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the 1-based line number containing the given byte offset.
    ///
    /// Offsets past the end of the source map to the last line.
    pub fn line_of(&self, offset: usize) -> usize {
        let offset = offset.min(self.content.len());
        1 + self.content[..offset].bytes().filter(|b| *b == b'\n').count()
    }

    /// Clamps a span to valid bounds within this source.
    pub fn clamp_span(&self, span: &Span) -> Span {
        let len = self.content.len();
        let start = span.start.min(len);
        let end = span.end.min(len).max(start);
        start..end
    }
}

/// Converts a diagnostic to a miette [`Report`] with source context.
pub fn convert_diag_to_report(diag: &Diag, source: &SourceFile) -> Report {
    let labels = diag
        .labels
        .iter()
        .map(|label| {
            let clamped = source.clamp_span(&label.span);
            LabeledSpan::new_primary_with_span(
                Some(label.message.clone()),
                (clamped.start, clamped.end - clamped.start),
            )
        })
        .collect();

    let diagnostic = BuiltDiagnostic {
        message: diag.message.clone(),
        severity: match diag.severity {
            DiagSeverity::Error => Severity::Error,
            DiagSeverity::Warning => Severity::Warning,
        },
        help: diag.help.clone(),
        labels,
    };

    let report = Report::new(diagnostic);
    match &source.name {
        Some(name) => {
            report.with_source_code(miette::NamedSource::new(name, source.content.clone()))
        }
        None => report.with_source_code(source.content.clone()),
    }
}

/// The rendered diagnostic type implementing miette's `Diagnostic` trait.
#[derive(Debug)]
struct BuiltDiagnostic {
    message: String,
    severity: Severity,
    help: Option<String>,
    labels: Vec<LabeledSpan>,
}

impl fmt::Display for BuiltDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BuiltDiagnostic {}

impl Diagnostic for BuiltDiagnostic {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.labels.is_empty() {
            None
        } else {
            Some(Box::new(self.labels.clone().into_iter()))
        }
    }
}
