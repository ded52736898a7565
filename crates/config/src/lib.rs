//! Configuration loading and validation for burrow.
//!
//! Configuration comes from a TOML file merged with `BURROW_`-prefixed
//! environment variables (environment wins). The storage section decides
//! which backend driver gets constructed, and with it which scanner
//! strategy, since that choice is made once at construction time.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Which storage driver to reconcile.
///
/// The variant decides the scanner strategy: local disks are
/// listing-capable, object stores are listing-avoidant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem rooted at an absolute directory.
    Local { name: String, root: PathBuf },
    /// S3-compatible object store.
    S3 {
        name: String,
        bucket: String,
        region: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
}

impl StorageConfig {
    /// The backend name; doubles as the storage id cache records are filed
    /// under.
    pub fn name(&self) -> &str {
        match self {
            Self::Local { name, .. } | Self::S3 { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheConfig {
    /// Location of the filecache SQLite database.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self { database_path: default_database_path() }
    }
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "burrow")
        .map(|dirs| dirs.data_dir().join("filecache.db"))
        .unwrap_or_else(|| PathBuf::from("filecache.db"))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScanConfig {
    /// Treat the backend as read-only: writes are dropped by the backend
    /// wrapper and cache entries carry read-only permissions.
    #[serde(default)]
    pub readonly: bool,
}

impl Config {
    /// Load configuration from a TOML file merged with `BURROW_`-prefixed
    /// environment variables; `__` separates nesting levels, e.g.
    /// `BURROW_SCAN__READONLY=true`.
    pub fn load(file: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(file.as_ref()))
            .merge(Env::prefixed("BURROW_").split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(file = %file.as_ref().display(), storage = config.storage.name(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.name().is_empty() {
            exn::bail!(ErrorKind::Invalid("storage name must not be empty"));
        }
        if let StorageConfig::Local { root, .. } = &self.storage
            && !root.is_absolute()
        {
            exn::bail!(ErrorKind::Invalid("local storage root must be an absolute path"));
        }
        Ok(())
    }
}
