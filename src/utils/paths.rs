use dirs::home_dir;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::errors::Result;

const DEFAULT_DIR_NAME: &str = ".ledger_core";
const HOME_ENV: &str = "LEDGER_CORE_HOME";
const LEDGER_DIR: &str = "ledgers";
const BACKUP_DIR: &str = "backups";
const CONFIG_DIR: &str = "config";
const CONFIG_FILE: &str = "config.json";

/// Resolves the on-disk layout below the application data directory.
pub struct PathResolver;

impl PathResolver {
    /// `$LEDGER_CORE_HOME`, falling back to `~/.ledger_core`.
    pub fn base_dir() -> PathBuf {
        if let Some(custom) = env::var_os(HOME_ENV) {
            return PathBuf::from(custom);
        }
        home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DIR_NAME)
    }

    pub fn resolve_base(custom: Option<PathBuf>) -> PathBuf {
        custom.unwrap_or_else(Self::base_dir)
    }

    pub fn ledger_dir_in(base: &Path) -> PathBuf {
        base.join(LEDGER_DIR)
    }

    pub fn backup_dir_in(base: &Path) -> PathBuf {
        base.join(BACKUP_DIR)
    }

    pub fn config_dir_in(base: &Path) -> PathBuf {
        base.join(CONFIG_DIR)
    }

    pub fn config_file_in(base: &Path) -> PathBuf {
        Self::config_dir_in(base).join(CONFIG_FILE)
    }
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
