//! Syntax validation for file-writing tools.
//!
//! Content is parsed according to the target extension before anything is
//! written; invalid content fails the operation and leaves the file
//! untouched. Extensions without a parser skip validation.

use std::path::Path;

use crate::error::{CascadeError, Result};

/// Validate `content` against the format implied by `path`'s extension.
pub fn validate_syntax(path: &Path, content: &str) -> Result<()> {
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        return Ok(());
    };

    match extension.to_ascii_lowercase().as_str() {
        "json" => serde_json::from_str::<serde_json::Value>(content)
            .map(|_| ())
            .map_err(|e| CascadeError::Validation(format!("JSON syntax error: {e}"))),
        "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(content)
            .map(|_| ())
            .map_err(|e| CascadeError::Validation(format!("YAML syntax error: {e}"))),
        "toml" => content
            .parse::<toml::Table>()
            .map(|_| ())
            .map_err(|e| CascadeError::Validation(format!("TOML syntax error: {e}"))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn valid_json_passes() {
        assert!(validate_syntax(&PathBuf::from("a.json"), r#"{"ok": true}"#).is_ok());
    }

    #[test]
    fn invalid_json_fails() {
        let err = validate_syntax(&PathBuf::from("a.json"), "{bad json").unwrap_err();
        assert!(matches!(err, CascadeError::Validation(_)));
    }

    #[test]
    fn invalid_yaml_fails() {
        let err = validate_syntax(&PathBuf::from("a.yaml"), "key: [unterminated").unwrap_err();
        assert!(matches!(err, CascadeError::Validation(_)));
    }

    #[test]
    fn invalid_toml_fails() {
        let err = validate_syntax(&PathBuf::from("a.toml"), "key = ").unwrap_err();
        assert!(matches!(err, CascadeError::Validation(_)));
    }

    #[test]
    fn unknown_extension_skips_validation() {
        assert!(validate_syntax(&PathBuf::from("a.txt"), "{not json at all").is_ok());
        assert!(validate_syntax(&PathBuf::from("no_extension"), "anything").is_ok());
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let err = validate_syntax(&PathBuf::from("a.JSON"), "{bad").unwrap_err();
        assert!(matches!(err, CascadeError::Validation(_)));
    }
}
