//! JSON export adapter
//!
//! Out-of-process generators read the AST as JSON. Enums are externally
//! tagged with snake_case names, spans carry line, column and offset.

use crate::parser::ast::SourceFile;
use tessera_core::{Error, Result};

/// JSON export adapter
pub struct JsonAdapter;

impl JsonAdapter {
    /// Serialize a parsed file to compact JSON
    pub fn to_json(file: &SourceFile) -> Result<String> {
        serde_json::to_string(file).map_err(|e| Error::Serialize(e.to_string()))
    }

    /// Serialize a parsed file to indented JSON
    pub fn to_json_pretty(file: &SourceFile) -> Result<String> {
        serde_json::to_string_pretty(file).map_err(|e| Error::Serialize(e.to_string()))
    }

    pub fn to_value(file: &SourceFile) -> Result<serde_json::Value> {
        serde_json::to_value(file).map_err(|e| Error::Serialize(e.to_string()))
    }
}
