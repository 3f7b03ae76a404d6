//! Configuration types
//!
//! Every section has serde defaults, so a partial (or empty) TOML file is a
//! valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.cluster.validate()
    }
}

/// Range descriptor cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Byte budget of the cache; least recently used entries are evicted past it
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// Serialize concurrent provider lookups for the same meta key
    #[serde(default = "default_coalesce_lookups")]
    pub coalesce_lookups: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            coalesce_lookups: default_coalesce_lookups(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(Error::Configuration("cache.max_bytes must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Shape of the in-memory range hierarchy used by the CLI
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// User keys at which user ranges are split
    #[serde(default)]
    pub splits: Vec<String>,
    /// User keys whose meta2 record key splits the meta2 ranges
    #[serde(default)]
    pub meta_splits: Vec<String>,
    /// Descriptors returned per provider lookup
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            splits: Vec::new(),
            meta_splits: Vec::new(),
            lookup_batch_size: default_lookup_batch_size(),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookup_batch_size == 0 {
            return Err(Error::Configuration(
                "cluster.lookup_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_bytes() -> usize {
    2 * 1024 * 1024 // 2 MiB
}

const fn default_coalesce_lookups() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_lookup_batch_size() -> usize {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.max_bytes, 2 * 1024 * 1024);
        assert!(config.cache.coalesce_lookups);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.cluster.lookup_batch_size, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            max_bytes = 4096

            [cluster]
            splits = ["a", "b"]
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.max_bytes, 4096);
        assert!(config.cache.coalesce_lookups);
        assert_eq!(config.cluster.splits, vec!["a", "b"]);
        assert_eq!(config.cluster.lookup_batch_size, 3);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let err = Config::from_toml_str("[cache]\nmax_bytes = 0\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_zero_batch_rejected() {
        assert!(Config::from_toml_str("[cluster]\nlookup_batch_size = 0\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
