//! AST export adapters

mod json;

pub use json::JsonAdapter;
