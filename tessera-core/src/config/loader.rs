//! Options loader

use crate::config::ParserOptions;
use crate::error::{Error, Result};
use std::path::Path;

/// Loads [`ParserOptions`] from JSON or TOML
pub struct OptionsLoader;

impl OptionsLoader {
    /// Load options from a file, picking the format by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ParserOptions> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "json" => Self::from_json(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(Error::Options(format!("Unknown options format: {}", ext))),
        }
    }

    /// Parse JSON options
    pub fn from_json(content: &str) -> Result<ParserOptions> {
        let options: ParserOptions = serde_json::from_str(content)
            .map_err(|e| Error::Options(format!("Invalid JSON: {}", e)))?;
        Self::validate(options)
    }

    /// Parse TOML options
    pub fn from_toml(content: &str) -> Result<ParserOptions> {
        let options: ParserOptions = toml::from_str(content)
            .map_err(|e| Error::Options(format!("Invalid TOML: {}", e)))?;
        Self::validate(options)
    }

    fn validate(options: ParserOptions) -> Result<ParserOptions> {
        if options.tab_width == 0 {
            return Err(Error::Options("tab_width must be at least 1".to_string()));
        }
        if options.max_nesting == 0 {
            return Err(Error::Options("max_nesting must be at least 1".to_string()));
        }
        tracing::debug!(?options, "loaded parser options");
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_loading() {
        let options = OptionsLoader::from_toml("tab_width = 8\n").unwrap();
        assert_eq!(options.tab_width, 8);
        assert_eq!(options.max_diagnostics, 100);
        assert_eq!(options.max_nesting, 32);
    }

    #[test]
    fn test_json_loading() {
        let options = OptionsLoader::from_json(r#"{"max_diagnostics": 5}"#).unwrap();
        assert_eq!(options.max_diagnostics, 5);
        assert_eq!(options.tab_width, 4);
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(OptionsLoader::from_toml("").unwrap(), ParserOptions::default());
    }

    #[test]
    fn test_rejects_zero_tab_width() {
        let err = OptionsLoader::from_toml("tab_width = 0").unwrap_err();
        assert!(err.to_string().contains("tab_width"));
    }

    #[test]
    fn test_unknown_extension() {
        let path = std::env::temp_dir().join("tessera-options-test.yaml");
        std::fs::write(&path, "tab_width: 2").unwrap();
        let err = OptionsLoader::load(&path).unwrap_err();
        assert!(matches!(err, Error::Options(_)));
        let _ = std::fs::remove_file(&path);
    }
}
