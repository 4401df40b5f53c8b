//! Diagnostics
//!
//! The parser never stops at the first problem. Everything it finds is
//! reported into a [`DiagnosticSink`] and parsing continues.

use crate::error::{Error, Result};
use crate::span::Span;
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single problem found in the source
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{line}:{column}: {severity}: {message}")]
pub struct Diagnostic {
    /// 1-based line
    pub line: usize,
    /// 0-based column
    pub column: usize,
    pub message: String,
    pub severity: Severity,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, span, message)
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, span, message)
    }

    fn new(severity: Severity, span: Span, message: impl Into<String>) -> Self {
        Self {
            line: span.start.line,
            column: span.start.column,
            message: message.into(),
            severity,
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render the diagnostic against its source as a plain-text report.
    pub fn render(&self, name: &str, source: &str) -> Result<String> {
        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };
        let range = self.span.range();

        let mut out = Vec::new();
        Report::build(kind, (name, range.clone()))
            .with_config(Config::default().with_color(false).with_index_type(IndexType::Byte))
            .with_message(&self.message)
            .with_label(Label::new((name, range)).with_message(&self.message))
            .finish()
            .write((name, Source::from(source)), &mut out)?;

        String::from_utf8(out).map_err(|e| Error::Render(e.to_string()))
    }
}

/// Render every diagnostic in order, separated by blank lines.
pub fn render_all(diagnostics: &[Diagnostic], name: &str, source: &str) -> Result<String> {
    let mut rendered = Vec::with_capacity(diagnostics.len());
    for diagnostic in diagnostics {
        rendered.push(diagnostic.render(name, source)?);
    }
    Ok(rendered.join("\n"))
}

/// Receiver for diagnostics produced while parsing
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}
