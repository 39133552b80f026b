//! Generator configuration.
//!
//! Reads `erpforge.toml`. Command-line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "erpforge.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleSettings {
    /// Bundles treated as unavailable.
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Directory generated files are written under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "erpforge_codegen_lib=debug".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default)]
    pub bundles: BundleSettings,
}

impl GeneratorConfig {
    /// Load config from disk, or return default if the file doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: GeneratorConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeneratorConfig::load(&dir.path().join(DEFAULT_CONFIG)).unwrap();
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn parses_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG);
        std::fs::write(
            &path,
            r#"
output_dir = "generated"
log_level = "debug"

[bundles]
disabled = ["audit", "location"]
"#,
        )
        .unwrap();
        let config = GeneratorConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("generated")));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.bundles.disabled, vec!["audit", "location"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG);
        std::fs::write(&path, "output_dir = [").unwrap();
        assert!(GeneratorConfig::load(&path).is_err());
    }
}
