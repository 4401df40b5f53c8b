//! Configuration type definitions

use serde::{Deserialize, Serialize};

/// Options that tune a parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Columns a tab advances when measuring code block indentation
    #[serde(default = "default_tab_width")]
    pub tab_width: usize,

    /// Diagnostics forwarded to the sink before the rest are dropped
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,

    /// Deepest nesting of recursive constructs (menus, view overrides)
    #[serde(default = "default_max_nesting")]
    pub max_nesting: usize,
}

fn default_tab_width() -> usize {
    4
}

fn default_max_diagnostics() -> usize {
    100
}

fn default_max_nesting() -> usize {
    32
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            tab_width: default_tab_width(),
            max_diagnostics: default_max_diagnostics(),
            max_nesting: default_max_nesting(),
        }
    }
}
