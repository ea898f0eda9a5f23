use serde::Deserialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_COLLECTION, DEFAULT_CONFIG_PATH, DEFAULT_OUTPUT_DIR,
    DEFAULT_TARGET_TABLE, ENV_CHUNK_SIZE, ENV_COUNTRY,
};
use crate::domain::Country;
use crate::error::{MigrationError, Result};
use crate::pipeline::processing::normalize::NormalizationRules;

/// Raw configuration as read from `service_sync.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Partition key attached to every row; no default on purpose
    pub country: Option<String>,
    pub chunk_size: usize,
    pub collection: String,
    pub target_table: String,
    pub output_dir: PathBuf,
    pub source_dir: PathBuf,
    pub target_db: PathBuf,
    pub skip_unidentifiable: bool,
    pub chunk_timeout_secs: Option<u64>,
    pub log_dir: PathBuf,
    pub rules: NormalizationRules,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            country: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            collection: DEFAULT_COLLECTION.to_string(),
            target_table: DEFAULT_TARGET_TABLE.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            source_dir: PathBuf::from("data/source"),
            target_db: PathBuf::from("data/target.db"),
            skip_unidentifiable: true,
            chunk_timeout_secs: None,
            log_dir: PathBuf::from("logs"),
            rules: NormalizationRules::default(),
        }
    }
}

impl MigrationConfig {
    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file just yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !path.exists() {
            if explicit {
                return Err(MigrationError::config(
                    format!("config file '{}' not found", path.display()),
                    "pass an existing file to --config",
                ));
            }
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            MigrationError::config(
                format!("failed to read config file '{}': {}", path.display(), e),
                "check file permissions",
            )
        })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `SERVICE_SYNC_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var(ENV_COUNTRY).ok(),
            std::env::var(ENV_CHUNK_SIZE).ok(),
        )
    }

    fn apply_overrides(&mut self, country: Option<String>, chunk_size: Option<String>) -> Result<()> {
        if let Some(country) = country.filter(|c| !c.trim().is_empty()) {
            self.country = Some(country.trim().to_string());
        }
        if let Some(raw) = chunk_size {
            self.chunk_size = raw.trim().parse().map_err(|_| {
                MigrationError::config(
                    format!("{}={:?} is not a positive integer", ENV_CHUNK_SIZE, raw),
                    "set a positive chunk size, e.g. 100",
                )
            })?;
        }
        Ok(())
    }

    /// Validate into the settings a run uses. Fails before any store I/O.
    pub fn resolve(&self) -> Result<RunSettings> {
        let country = match self.country.as_deref() {
            Some(raw) => Country::parse(raw)?,
            None => {
                return Err(MigrationError::config(
                    "partition key (country) is not defined",
                    format!("define the partition key: set country in the config or {}", ENV_COUNTRY),
                ))
            }
        };
        let chunk_size = NonZeroUsize::new(self.chunk_size).ok_or_else(|| {
            MigrationError::config("chunk_size must be positive", "set chunk_size to e.g. 100")
        })?;
        if self.collection.trim().is_empty() || self.target_table.trim().is_empty() {
            return Err(MigrationError::config(
                "collection and target_table must be non-empty",
                "name the source collection and target table",
            ));
        }

        Ok(RunSettings {
            country,
            chunk_size,
            collection: self.collection.clone(),
            target_table: self.target_table.clone(),
            output_dir: self.output_dir.clone(),
            skip_unidentifiable: self.skip_unidentifiable,
            chunk_timeout: self.chunk_timeout_secs.map(Duration::from_secs),
            dry_run: false,
        })
    }
}

/// Validated settings handed to the pipeline.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub country: Country,
    pub chunk_size: NonZeroUsize,
    pub collection: String,
    pub target_table: String,
    pub output_dir: PathBuf,
    pub skip_unidentifiable: bool,
    pub chunk_timeout: Option<Duration>,
    pub dry_run: bool,
}

impl RunSettings {
    /// Settings with defaults for everything but the partition key.
    pub fn for_country(country: Country) -> Self {
        Self {
            country,
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            collection: DEFAULT_COLLECTION.to_string(),
            target_table: DEFAULT_TARGET_TABLE.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            skip_unidentifiable: true,
            chunk_timeout: None,
            dry_run: false,
        }
    }
}
