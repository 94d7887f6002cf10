// File: src/config.rs
// Purpose: Configuration parsing from rusty-forms.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Form configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormConfig {
    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Where the external lookup service lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_categories_path")]
    pub categories_path: String,

    #[serde(default = "default_search_path")]
    pub search_path: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Bounds used by the claim schema (all inclusive)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub amount_min: f64,

    #[serde(default = "default_amount_max")]
    pub amount_max: f64,

    #[serde(default)]
    pub allocation_min: f64,

    #[serde(default = "default_amount_max")]
    pub allocation_max: f64,

    #[serde(default = "default_witnesses_min")]
    pub witnesses_min: usize,

    #[serde(default = "default_witnesses_max")]
    pub witnesses_max: usize,
}

// Default values
fn default_base_url() -> String {
    "https://dummyjson.com".to_string()
}

fn default_categories_path() -> String {
    "/products/categories".to_string()
}

fn default_search_path() -> String {
    "/users/search".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_amount_max() -> f64 {
    300.0
}

fn default_witnesses_min() -> usize {
    1
}

fn default_witnesses_max() -> usize {
    5
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            categories_path: default_categories_path(),
            search_path: default_search_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            amount_min: 0.0,
            amount_max: default_amount_max(),
            allocation_min: 0.0,
            allocation_max: default_amount_max(),
            witnesses_min: default_witnesses_min(),
            witnesses_max: default_witnesses_max(),
        }
    }
}

impl FormConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // If file doesn't exist, use defaults
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: FormConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Load configuration from default path (./rusty-forms.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("rusty-forms.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FormConfig::default();
        assert_eq!(config.lookup.base_url, "https://dummyjson.com");
        assert_eq!(config.lookup.search_path, "/users/search");
        assert_eq!(config.schema.amount_max, 300.0);
        assert_eq!(config.schema.witnesses_min, 1);
        assert_eq!(config.schema.witnesses_max, 5);
    }

    #[test]
    fn test_empty_config() {
        let config = toml::from_str::<FormConfig>("").unwrap_or_default();
        assert_eq!(config.lookup.timeout_secs, 10);
        assert_eq!(config.schema.allocation_max, 300.0);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [lookup]
            base_url = "http://localhost:8080"

            [schema]
            witnesses_max = 3
        "#;
        let config: FormConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.lookup.base_url, "http://localhost:8080");
        assert_eq!(config.lookup.categories_path, "/products/categories");
        assert_eq!(config.schema.witnesses_max, 3);
        assert_eq!(config.schema.witnesses_min, 1);
    }

    #[test]
    fn test_load_missing_and_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FormConfig::load(dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing.schema.amount_max, 300.0);

        let path = dir.path().join("rusty-forms.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[schema]\namount_max = 500.0").unwrap();

        let loaded = FormConfig::load(&path).unwrap();
        assert_eq!(loaded.schema.amount_max, 500.0);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rusty-forms.toml");
        fs::write(&path, "[schema\n").unwrap();
        assert!(FormConfig::load(&path).is_err());
    }
}
