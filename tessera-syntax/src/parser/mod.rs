//! Parser module for Tessera source files
//!
//! This module provides the lexer, AST, and parser for the Tessera language.

pub mod ast;
pub mod lexer;
pub mod parser;

mod annotations;

pub use ast::*;
pub use lexer::{tokenize, tokenize_with, Token, TokenKind, TokenText};
pub use parser::{parse_with, ParseError, ParseResult, Parser};
