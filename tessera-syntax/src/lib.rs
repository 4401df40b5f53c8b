//! Tessera Syntax
//!
//! Lexer, parser and AST for Tessera application descriptions: collections
//! (data models), pages and the annotations attached to both.
//!
//! Parsing never stops at the first error. Every problem becomes a
//! [`Diagnostic`] and the parser always hands back a complete [`SourceFile`].
//!
//! # Example
//!
//! ```rust
//! use tessera_syntax::{parse, FieldSpec};
//!
//! let source = "#Article\n  title: str\n  body: longtext\n";
//! let output = parse(source);
//!
//! assert!(output.diagnostics.is_empty());
//! let article = output.file.collection("Article").unwrap();
//! assert_eq!(article.field("body").unwrap().spec(), Some(&FieldSpec::LongText));
//! ```

pub mod adapter;
pub mod parser;

pub use adapter::JsonAdapter;
pub use parser::ast::*;
pub use parser::{parse_with, tokenize, tokenize_with, ParseError, Token, TokenKind};

use tessera_core::{Diagnostic, ParserOptions};
use thiserror::Error;

/// A parsed file together with everything wrong with it
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub file: SourceFile,
    /// Sorted by source position
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Parse a source string with default options
pub fn parse(source: &str) -> ParseOutput {
    parse_with_options(source, &ParserOptions::default())
}

/// Parse a source string, collecting diagnostics
pub fn parse_with_options(source: &str, options: &ParserOptions) -> ParseOutput {
    let mut diagnostics = Vec::new();
    let file = parse_with(source, options, &mut diagnostics);
    // Stable: diagnostics at the same offset keep report order
    diagnostics.sort_by_key(|d| d.span.start.offset);
    ParseOutput { file, diagnostics }
}

/// Every diagnostic from a failed strict parse
#[derive(Debug, Clone, Error)]
#[error("{} syntax error(s)", .diagnostics.len())]
pub struct SyntaxErrors {
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a source string, failing if anything was reported
pub fn parse_strict(source: &str) -> Result<SourceFile, SyntaxErrors> {
    let output = parse(source);
    if output.diagnostics.is_empty() {
        Ok(output.file)
    } else {
        Err(SyntaxErrors {
            diagnostics: output.diagnostics,
        })
    }
}
