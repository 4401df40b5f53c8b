//! Parser configuration

mod loader;
mod types;

pub use loader::OptionsLoader;
pub use types::ParserOptions;
