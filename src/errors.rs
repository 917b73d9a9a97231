//! stackweave error handling.
//!
//! Every failure in the pipeline is a [`CompileError`]: an [`ErrorKind`] saying
//! what went wrong, an optional origin saying where (unit path, token index,
//! byte span and the source text for snippets), and diagnostic extras (help
//! text, secondary labels). `CompileError` implements [`miette::Diagnostic`]
//! so the CLI can render it with source context.
//!
//! None of these errors are recoverable: the first one aborts the compilation.

use std::{fmt, path::PathBuf, sync::Arc};

use miette::{Diagnostic, LabeledSpan, NamedSource, Report, SourceCode};
use serde::Serialize;
use thiserror::Error;

use crate::symbols::DefinitionKind;
use crate::syntax::token::{Span, Token};

pub type SourceArc = Arc<NamedSource<String>>;

// ============================================================================
// ERROR KINDS
// ============================================================================

/// Everything that can abort a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // Source table
    #[error("cannot find include `{path}`")]
    IncludeNotFound { path: String },
    #[error("include cycle: {}", .chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    // Registry
    #[error("{kind} `{name}` is already defined at {first}")]
    DuplicateDefinition {
        kind: DefinitionKind,
        name: String,
        first: String,
    },
    #[error("undefined symbol `{name}`")]
    UndefinedSymbol { name: String },
    #[error("`{name}` is reserved by the language and cannot be redefined")]
    ReservedName { name: String },

    // Expansion
    #[error("`{callee}` expects {expected} stack value(s) but {actual} are available")]
    ArityMismatch {
        callee: String,
        expected: usize,
        actual: usize,
    },
    #[error("macro `{name}` expands recursively: {}", .chain.join(" -> "))]
    MacroRecursionLimitExceeded { name: String, chain: Vec<String> },
    #[error("inline function `{name}` expands recursively: {}", .chain.join(" -> "))]
    InlineRecursionLimitExceeded { name: String, chain: Vec<String> },
    #[error("`{name}` is not a macro, function, or declared foreign symbol")]
    UnknownForeignSymbol { name: String },

    // Front end
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("integer literal `{literal}` does not fit in 64 bits")]
    IntegerOutOfRange { literal: String },
    #[error("unclosed `{block}` block")]
    UnclosedBlock { block: String },
    #[error("malformed function signature `{text}`")]
    MalformedSignature { text: String },

    // Environment
    #[error("cannot read `{path}`: {reason}")]
    Io { path: String, reason: String },
    #[error("unknown target platform `{name}`")]
    UnknownTarget { name: String },
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ErrorKind {
    /// Stable diagnostic code suffix, e.g. `expand::arity`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::IncludeNotFound { .. } => "source::include_not_found",
            ErrorKind::IncludeCycle { .. } => "source::include_cycle",
            ErrorKind::DuplicateDefinition { .. } => "symbols::duplicate",
            ErrorKind::UndefinedSymbol { .. } => "symbols::undefined",
            ErrorKind::ReservedName { .. } => "symbols::reserved",
            ErrorKind::ArityMismatch { .. } => "expand::arity",
            ErrorKind::MacroRecursionLimitExceeded { .. } => "expand::macro_recursion",
            ErrorKind::InlineRecursionLimitExceeded { .. } => "expand::inline_recursion",
            ErrorKind::UnknownForeignSymbol { .. } => "lower::unknown_foreign",
            ErrorKind::UnexpectedToken { .. } => "syntax::unexpected",
            ErrorKind::IntegerOutOfRange { .. } => "syntax::integer_range",
            ErrorKind::UnclosedBlock { .. } => "syntax::unclosed",
            ErrorKind::MalformedSignature { .. } => "syntax::signature",
            ErrorKind::Io { .. } => "io",
            ErrorKind::UnknownTarget { .. } => "config::target",
            ErrorKind::InvalidConfig { .. } => "config::invalid",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ErrorKind::IncludeNotFound { .. } => "included here",
            ErrorKind::IncludeCycle { .. } => "cycle closes here",
            ErrorKind::DuplicateDefinition { .. } => "redefined here",
            ErrorKind::UndefinedSymbol { .. } => "not defined",
            ErrorKind::ReservedName { .. } => "reserved name",
            ErrorKind::ArityMismatch { .. } => "called here",
            ErrorKind::MacroRecursionLimitExceeded { .. }
            | ErrorKind::InlineRecursionLimitExceeded { .. } => "recursive expansion",
            ErrorKind::UnknownForeignSymbol { .. } => "unknown symbol",
            ErrorKind::UnexpectedToken { .. } => "unexpected",
            ErrorKind::IntegerOutOfRange { .. } => "out of range",
            ErrorKind::UnclosedBlock { .. } => "opened here",
            ErrorKind::MalformedSignature { .. } => "bad signature",
            ErrorKind::Io { .. } | ErrorKind::UnknownTarget { .. } | ErrorKind::InvalidConfig { .. } => {
                "here"
            }
        }
    }
}

// ============================================================================
// SOURCE INFORMATION
// ============================================================================

/// Where an error originated: unit path plus token position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    /// Index of the token inside its unit.
    pub token: usize,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
    }
}

#[derive(Debug, Clone)]
struct Origin {
    location: SourceLocation,
    source: SourceArc,
}

/// A secondary label pointing into the same source as the primary one.
#[derive(Debug, Clone)]
struct RelatedLabel {
    span: Span,
    label: String,
}

// ============================================================================
// COMPILE ERROR
// ============================================================================

/// The single error type of the crate.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct CompileError {
    kind: ErrorKind,
    origin: Option<Origin>,
    help: Option<String>,
    related: Vec<RelatedLabel>,
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

impl CompileError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            origin: None,
            help: None,
            related: Vec::new(),
        }
    }

    /// Attaches the location of `token` as the primary label.
    pub fn at(mut self, token: &Token) -> Self {
        self.origin = Some(Origin {
            location: token.location(),
            source: token.file.named_source(),
        });
        self
    }

    pub fn with_help(mut self, help: impl fmt::Display) -> Self {
        self.help = Some(help.to_string());
        self
    }

    /// Adds a secondary label when `token` lives in the same file as the
    /// primary location. Labels into other files are dropped; the message
    /// already names their location.
    pub fn with_related(mut self, token: &Token, label: impl Into<String>) -> Self {
        let same_file = self
            .origin
            .as_ref()
            .is_some_and(|o| o.location.path == token.file.path());
        if same_file {
            self.related.push(RelatedLabel {
                span: token.span,
                label: label.into(),
            });
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.origin.as_ref().map(|o| &o.location)
    }
}

impl From<ErrorKind> for CompileError {
    fn from(kind: ErrorKind) -> Self {
        CompileError::new(kind)
    }
}

impl Diagnostic for CompileError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("stackweave::{}", self.kind.code())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.origin
            .as_ref()
            .map(|o| o.source.as_ref() as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let origin = self.origin.as_ref()?;
        let mut labels = vec![LabeledSpan::new(
            Some(self.kind.label().to_string()),
            origin.location.span.start,
            origin.location.span.len().max(1),
        )];
        for rel in &self.related {
            labels.push(LabeledSpan::new(
                Some(rel.label.clone()),
                rel.span.start,
                rel.span.len().max(1),
            ));
        }
        Some(Box::new(labels.into_iter()))
    }
}

/// Renders an error with miette's fancy reporter on stderr.
pub fn print_error(error: CompileError) {
    let report = Report::new(error);
    eprintln!("{report:?}");
}
