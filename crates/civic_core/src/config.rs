use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::DispatchOptions;
use crate::error::ScrapeError;
use crate::fixture::FixtureScraper;
use crate::jurisdiction::Jurisdiction;

#[derive(Debug, Clone, Deserialize)]
pub struct CivicConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub dispatch: DispatchOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub jurisdictions: Vec<JurisdictionConfig>,
    /// Directory relative paths resolve against; the config file's directory.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct JurisdictionConfig {
    pub id: String,
    pub name: String,
    /// Scraper kind -> roster document URI or path.
    #[serde(default)]
    pub scrapers: BTreeMap<String, String>,
}

impl CivicConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CivicConfig = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.storage.database)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn jurisdiction(&self, id: &str) -> Option<&JurisdictionConfig> {
        self.jurisdictions.iter().find(|j| j.id == id)
    }

    /// Registers a [`FixtureScraper`] per configured scraper kind.
    pub fn build_jurisdictions(&self) -> Result<Vec<Jurisdiction>, ScrapeError> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(self.jurisdictions.len());
        for entry in &self.jurisdictions {
            if !seen.insert(entry.id.as_str()) {
                return Err(ScrapeError::configuration(format!(
                    "jurisdiction {} configured twice",
                    entry.id
                )));
            }
            let mut jurisdiction = Jurisdiction::new(&entry.id, &entry.name)?;
            for (kind, uri) in &entry.scrapers {
                jurisdiction.register(kind, FixtureScraper::new(uri))?;
            }
            out.push(jurisdiction);
        }
        Ok(out)
    }
}
