//! Diagnostic reporting infrastructure.
//!
//! This module provides error reporting with source locations,
//! suggestions, and pretty-printed output.
//!
//! # Error Codes
//!
//! Lowering error codes are organized by category:
//!
//! - **E0500-E0599**: Type errors (incompatible operands, bad literals)
//! - **E0600-E0699**: Structure errors (malformed nodes, bad indices, undeclared names)
//! - **E0700-E0799**: Target version errors
//! - **E0800-E0899**: Internal compiler errors

use std::io;

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::span::Span;

/// Compiler error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // ============================================================
    // Type errors (E0500-E0599)
    // ============================================================
    /// Operand types are incompatible.
    TypeMismatch = 501,
    /// A literal cannot be represented.
    InvalidLiteral = 502,

    // ============================================================
    // Structure errors (E0600-E0699)
    // ============================================================
    /// Malformed node shape.
    Structure = 601,
    /// Literal list index outside the list.
    ArrayIndex = 602,
    /// Name not found in the environment.
    Undeclared = 603,

    // ============================================================
    // Target version errors (E0700-E0799)
    // ============================================================
    /// Construct requires a newer VM ruleset.
    EvmVersion = 701,

    // ============================================================
    // Internal errors (E0800-E0899)
    // ============================================================
    /// A compiler invariant was violated.
    CompilerPanic = 801,
    /// No handler produced IR for a node.
    NoIr = 802,
}

impl ErrorCode {
    /// Get the formatted error code string (e.g., "E0501").
    pub fn as_str(&self) -> String {
        format!("E{:04}", *self as u16)
    }

    /// Get a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::TypeMismatch => "type mismatch",
            ErrorCode::InvalidLiteral => "invalid literal",
            ErrorCode::Structure => "malformed expression",
            ErrorCode::ArrayIndex => "array index out of bounds",
            ErrorCode::Undeclared => "undeclared name",
            ErrorCode::EvmVersion => "unsupported by the target VM version",
            ErrorCode::CompilerPanic => "internal compiler error",
            ErrorCode::NoIr => "expression could not be lowered",
        }
    }

    /// Get a help message suggesting how to fix the error.
    pub fn help(&self) -> Option<&'static str> {
        match self {
            ErrorCode::TypeMismatch => Some("implicit conversions are not allowed; convert explicitly"),
            ErrorCode::EvmVersion => Some("select a newer VM version with `--evm-version`"),
            ErrorCode::CompilerPanic => Some("this is a compiler bug; please report it"),
            _ => None,
        }
    }
}

/// The kind of diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// An error that prevents lowering.
    Error,
}

impl DiagnosticKind {
    fn to_report_kind(self) -> ReportKind<'static> {
        match self {
            DiagnosticKind::Error => ReportKind::Error,
        }
    }

    fn color(self) -> Color {
        match self {
            DiagnosticKind::Error => Color::Red,
        }
    }
}

/// A compiler diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The kind of diagnostic.
    pub kind: DiagnosticKind,
    /// The error code (e.g., "E0501").
    pub code: Option<String>,
    /// The main error message.
    pub message: String,
    /// The primary span where the error occurred.
    pub span: Span,
    /// Additional labels pointing to relevant code.
    pub labels: Vec<DiagnosticLabel>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code: None,
            message: message.into(),
            span,
            labels: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Set the error code from an ErrorCode enum.
    /// Automatically adds the help message if available.
    pub fn with_error_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code.as_str());
        if let Some(help) = code.help() {
            self.suggestions.push(help.to_string());
        }
        self
    }

    /// Add a note to help explain the error.
    pub fn with_note(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(DiagnosticLabel::secondary(span, message));
        self
    }

    /// Add a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Render without source context, e.g. `error[E0501]: message (at 1:4)`.
    pub fn render_plain(&self) -> String {
        let kind = match self.kind {
            DiagnosticKind::Error => "error",
        };
        let mut out = match &self.code {
            Some(code) => format!("{kind}[{code}]: {}", self.message),
            None => format!("{kind}: {}", self.message),
        };
        if self.span.start_line > 0 {
            out.push_str(&format!(" (at {})", self.span));
        }
        for label in &self.labels {
            out.push_str(&format!("\n  note: {}", label.message));
        }
        for suggestion in &self.suggestions {
            out.push_str(&format!("\n  help: {suggestion}"));
        }
        out
    }
}

/// A secondary label in a diagnostic.
#[derive(Debug, Clone)]
pub struct DiagnosticLabel {
    /// The span this label points to.
    pub span: Span,
    /// The label message.
    pub message: String,
    /// Whether this is the primary label.
    pub primary: bool,
}

impl DiagnosticLabel {
    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: false,
        }
    }
}

/// Diagnostic emitter that prints diagnostics to stderr.
pub struct DiagnosticEmitter<'a> {
    filename: &'a str,
    source: &'a str,
}

impl<'a> DiagnosticEmitter<'a> {
    pub fn new(filename: &'a str, source: &'a str) -> Self {
        Self { filename, source }
    }

    /// Emit a diagnostic to stderr.
    pub fn emit(&self, diagnostic: &Diagnostic) -> io::Result<()> {
        let mut builder = Report::build(
            diagnostic.kind.to_report_kind(),
            self.filename,
            diagnostic.span.start,
        );

        let message = if let Some(code) = &diagnostic.code {
            format!("[{}] {}", code, diagnostic.message)
        } else {
            diagnostic.message.clone()
        };
        builder = builder.with_message(&message);

        builder = builder.with_label(
            Label::new((self.filename, diagnostic.span.start..diagnostic.span.end))
                .with_color(diagnostic.kind.color())
                .with_message(&diagnostic.message),
        );

        for label in &diagnostic.labels {
            let color = if label.primary {
                diagnostic.kind.color()
            } else {
                Color::Blue
            };
            builder = builder.with_label(
                Label::new((self.filename, label.span.start..label.span.end))
                    .with_color(color)
                    .with_message(&label.message),
            );
        }

        if !diagnostic.suggestions.is_empty() {
            let help = diagnostic.suggestions.join("\n");
            builder = builder.with_help(help);
        }

        builder
            .finish()
            .eprint((self.filename, Source::from(self.source)))
    }
}
