//! `weave.toml` settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use wv_expand::ExpandConfig;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "weave.toml";

/// Driver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Expansion settings
    pub expand: ExpandConfig,

    /// Log filter used when `RUST_LOG` is unset
    pub log: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            expand: ExpandConfig::default(),
            log: "warn".to_owned(),
        }
    }
}

impl Settings {
    /// Load settings from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads `explicit`, or `weave.toml` when present, or the defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "log = \"debug\"\n\n[expand]\nmax_depth = 12\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.log, "debug");
        assert_eq!(settings.expand.max_depth, 12);
        assert_eq!(settings.expand.splice_forms, wv_expand::SpliceForms::default());
    }

    #[test]
    fn test_bad_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "expand = 3\n").unwrap();

        let err = Settings::from_file(&path).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }
}
