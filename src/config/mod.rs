use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::{
    errors::{LedgerError, Result},
    utils::paths::{ensure_dir, PathResolver},
};

const TMP_SUFFIX: &str = "tmp";
const DEFAULT_PADDING_DAYS: i64 = 1;

/// Tunables for statement reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Days added on both sides of the imported date span when reading
    /// existing entries.
    #[serde(default = "ImportSettings::default_padding_days")]
    pub padding_days: i64,
}

impl ImportSettings {
    fn default_padding_days() -> i64 {
        DEFAULT_PADDING_DAYS
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            padding_days: DEFAULT_PADDING_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub import: ImportSettings,
    /// `tracing` filter directive used by [`crate::init`] when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.import.padding_days < 0 {
            return Err(LedgerError::ConfigError(format!(
                "import.padding_days must not be negative (got {})",
                self.import.padding_days
            )));
        }
        Ok(())
    }
}

/// Loads and stores [`Config`] as a JSON file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::with_base_dir(PathResolver::base_dir())
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self> {
        ensure_dir(&base)?;
        let config_root = PathResolver::config_dir_in(&base);
        ensure_dir(&config_root)?;
        Ok(Self {
            path: PathResolver::config_file_in(&base),
        })
    }

    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let data = fs::read_to_string(&self.path)?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|err| LedgerError::ConfigError(format!("{}: {err}", self.path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = tmp_path(&self.path);
        write_atomic(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

pub(crate) fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}
