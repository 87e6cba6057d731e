//! Configuration formats and pre-deploy validation.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ValidationError;

/// Top-level options a node configuration normally sets. Missing ones only
/// produce warnings.
pub const RECOMMENDED_FIELDS: &[&str] = &["data-path", "genesis-file", "rpc-http-enabled"];

/// Supported configuration encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    /// JSON.
    Structured,
    /// TOML.
    Markup,
}

impl ConfigFormat {
    /// Format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Structured),
            "toml" => Some(Self::Markup),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Structured => "json",
            Self::Markup => "toml",
        }
    }

    /// Parse `content` and return its top-level keys, or `None` when the
    /// document parses but its top level is not a key/value table.
    pub fn top_level_keys(&self, content: &str) -> Result<Option<Vec<String>>, ValidationError> {
        match self {
            Self::Structured => {
                let value: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| ValidationError::Syntax {
                        format: *self,
                        line: e.line(),
                        column: e.column(),
                        message: e.to_string(),
                    })?;
                match value {
                    serde_json::Value::Object(map) => Ok(Some(map.keys().cloned().collect())),
                    _ => Ok(None),
                }
            }
            Self::Markup => {
                let table: toml::Table = toml::from_str(content).map_err(|e| {
                    let offset = e.span().map(|s| s.start).unwrap_or(0);
                    let (line, column) = line_column(content, offset);
                    ValidationError::Syntax {
                        format: *self,
                        line,
                        column,
                        message: e.message().to_string(),
                    }
                })?;
                Ok(Some(table.keys().cloned().collect()))
            }
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Structured => "JSON",
            Self::Markup => "TOML",
        })
    }
}

/// 1-based line and column of a byte offset.
fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = &content.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    (line, offset - line_start + 1)
}

/// A configuration file that parsed and may be deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub path: PathBuf,
    pub format: ConfigFormat,
    pub contents: String,
    /// Advisory findings; never block a deploy.
    pub warnings: Vec<String>,
}

/// Check that `path` exists and parses; collect advisory warnings.
pub async fn validate(path: &Path) -> Result<ValidatedConfig, ValidationError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| {
        ValidationError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "<none>".to_string()),
        )
    })?;

    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ValidationError::NotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ValidationError::Unreadable {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
    };

    let keys = format.top_level_keys(&contents)?;
    let mut warnings = Vec::new();
    if keys.is_none() {
        warnings.push(format!(
            "Top level of the {format} document is not a table of options"
        ));
    }
    let keys = keys.unwrap_or_default();
    warnings.extend(
        RECOMMENDED_FIELDS
            .iter()
            .filter(|field| !keys.iter().any(|k| k == *field))
            .map(|field| format!("Recommended field '{field}' is not set")),
    );

    for warning in &warnings {
        warn!(path = %path.display(), "{}", warning);
    }
    debug!(path = %path.display(), %format, keys = keys.len(), "Configuration validated");

    Ok(ValidatedConfig {
        path: path.to_path_buf(),
        format,
        contents,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("node.JSON")),
            Some(ConfigFormat::Structured)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("node.toml")),
            Some(ConfigFormat::Markup)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("node.yaml")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("node")), None);
    }

    #[test]
    fn test_line_column() {
        let content = "a = 1\nb = \nc = 3";
        assert_eq!(line_column(content, 0), (1, 1));
        assert_eq!(line_column(content, 10), (2, 5));
        assert_eq!(line_column(content, 999), (3, 5));
    }

    #[tokio::test]
    async fn test_valid_toml_with_warnings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("besu.toml");
        std::fs::write(&path, "data-path = \"/data\"\nrpc-http-enabled = true\n").unwrap();

        let config = validate(&path).await.unwrap();
        assert_eq!(config.format, ConfigFormat::Markup);
        assert_eq!(
            config.warnings,
            vec!["Recommended field 'genesis-file' is not set"]
        );
    }

    #[tokio::test]
    async fn test_invalid_json_reports_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("besu.json");
        std::fs::write(&path, "{\n  \"data-path\": \"/data\",\n  oops\n}").unwrap();

        let err = validate(&path).await.unwrap_err();
        match err {
            ValidationError::Syntax { format, line, .. } => {
                assert_eq!(format, ConfigFormat::Structured);
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_toml_reports_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("besu.toml");
        std::fs::write(&path, "data-path = \"/data\"\ngenesis-file = \n").unwrap();

        let err = validate(&path).await.unwrap_err();
        assert!(matches!(err, ValidationError::Syntax { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_missing_and_unsupported() {
        let dir = tempdir().unwrap();
        let err = validate(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, ValidationError::NotFound(_)));

        let err = validate(&dir.path().join("besu.yaml")).await.unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat("yaml".to_string()));
    }

    #[tokio::test]
    async fn test_json_array_validates_with_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("besu.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let config = validate(&path).await.unwrap();
        assert_eq!(config.format, ConfigFormat::Structured);
        assert_eq!(config.contents, "[1, 2]");
        assert_eq!(
            config.warnings[0],
            "Top level of the JSON document is not a table of options"
        );
        assert_eq!(config.warnings.len(), 1 + RECOMMENDED_FIELDS.len());
    }
}
