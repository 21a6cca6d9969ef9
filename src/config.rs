use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::price::PriceHistoryMode;
use crate::product::DeletePolicy;
use crate::storage::CatalogStore;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Database file, relative to the directory holding the config
    pub database: Option<String>,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
    pub price_history: PriceHistoryMode,
    pub delete_policy: DeletePolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            price_history: PriceHistoryMode::default(),
            delete_policy: DeletePolicy::default(),
        }
    }
}

impl CatalogConfig {
    /// The configured database path resolved against `base`, or the default location
    pub fn database_path(&self, base: &Path) -> PathBuf {
        match &self.database {
            Some(db) => base.join(db),
            None => default_database_path_in(base),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("pricebook.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".pricebook").join("pricebook.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<CatalogConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CatalogConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CatalogConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Open the catalog a config describes, creating the database directory if needed
pub fn open_store(base: &Path, config: &CatalogConfig) -> anyhow::Result<CatalogStore> {
    let db_path = config.database_path(base);
    ensure_db_dir(&db_path)?;
    let store = CatalogStore::open_with(&db_path, config)?;
    Ok(store)
}
