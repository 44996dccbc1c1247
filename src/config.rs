use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::RecordFilter;
use crate::filemeta::{SkipList, DEFAULT_SKIP_EXTENSIONS};
use crate::reconcile::{
    ReconcileOptions, DEFAULT_AUTOMATION_TAGS, DEFAULT_CATEGORIES, DEFAULT_KEYWORD_DELIMITER,
    DEFAULT_PROGRESS_INTERVAL,
};

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "ELEMSYNC_CONFIG";

/// File name of the thumbnail cache kept beside the catalog.
const THUMBNAIL_CACHE_FILE: &str = "thumb.5.cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Defaults to the cache file in the catalog's directory.
    #[serde(default)]
    pub thumbnail_cache_path: Option<PathBuf>,

    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: PathBuf,

    /// Prepended to every stored media path, e.g. "C:".
    #[serde(default)]
    pub path_prefix: String,

    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Top-level tags whose paths become file keywords.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Tag paths containing any of these are left out of the keywords.
    #[serde(default = "default_automation_tags")]
    pub automation_tags: Vec<String>,

    #[serde(default = "default_keyword_delimiter")]
    pub keyword_delimiter: String,

    /// Extensions treated as unreadable without opening the file.
    #[serde(default = "default_skip_extensions")]
    pub skip_extensions: Vec<String>,
}

fn default_catalog_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Adobe")
        .join("Photoshop Elements")
        .join("Catalogs")
        .join("My Catalog")
        .join("catalog.psedb")
}

fn default_audit_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("elemsync")
        .join("logfile.csv")
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_categories() -> Vec<String> {
    to_strings(DEFAULT_CATEGORIES)
}

fn default_automation_tags() -> Vec<String> {
    to_strings(DEFAULT_AUTOMATION_TAGS)
}

fn default_keyword_delimiter() -> String {
    DEFAULT_KEYWORD_DELIMITER.to_string()
}

fn default_skip_extensions() -> Vec<String> {
    to_strings(DEFAULT_SKIP_EXTENSIONS)
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            automation_tags: default_automation_tags(),
            keyword_delimiter: default_keyword_delimiter(),
            skip_extensions: default_skip_extensions(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            thumbnail_cache_path: None,
            audit_log_path: default_audit_log_path(),
            path_prefix: String::new(),
            progress_interval: default_progress_interval(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, writing a default config there first if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("elemsync")
            .join("config.toml")
    }

    pub fn thumbnail_cache_path(&self) -> PathBuf {
        match &self.thumbnail_cache_path {
            Some(path) => path.clone(),
            None => self
                .catalog_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(THUMBNAIL_CACHE_FILE),
        }
    }

    pub fn reconcile_options(&self, update: bool, filter: RecordFilter) -> ReconcileOptions {
        ReconcileOptions {
            update,
            path_prefix: self.path_prefix.clone(),
            categories: self.reconcile.categories.clone(),
            automation_tags: self.reconcile.automation_tags.clone(),
            delimiter: self.reconcile.keyword_delimiter.clone(),
            skip_list: SkipList::new(&self.reconcile.skip_extensions),
            progress_interval: self.progress_interval,
            filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            catalog_path = "/data/catalog.psedb"
            path_prefix = "C:"

            [reconcile]
            skip_extensions = ["psd"]
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog_path, PathBuf::from("/data/catalog.psedb"));
        assert_eq!(config.path_prefix, "C:");
        assert_eq!(config.progress_interval, 1000);
        assert_eq!(config.reconcile.keyword_delimiter, "|");
        assert_eq!(config.reconcile.categories, vec!["People", "Places", "Events", "Other"]);
        assert_eq!(config.reconcile.skip_extensions, vec!["psd"]);
        assert_eq!(
            config.thumbnail_cache_path(),
            PathBuf::from("/data").join("thumb.5.cache")
        );
    }

    #[test]
    fn test_load_from_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.catalog_path, created.catalog_path);
        assert_eq!(reloaded.reconcile.automation_tags, vec!["Auto Face Tagging"]);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "progress_interval = \"often\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_reconcile_options() {
        let mut config = Config::default();
        config.path_prefix = "E:".to_string();
        config.reconcile.skip_extensions = vec!["PSD".to_string()];

        let options = config.reconcile_options(true, RecordFilter::default());
        assert!(options.update);
        assert_eq!(options.path_prefix, "E:");
        assert!(options.skip_list.is_skipped(Path::new("a.psd")));
        assert!(!options.skip_list.is_skipped(Path::new("a.cr2")));
    }
}
