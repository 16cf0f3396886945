use chrono::Utc;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::{tmp_path, write_atomic},
    errors::{LedgerError, Result},
    ledger::Ledger,
    utils::paths::{ensure_dir, PathResolver},
};

use super::{BackupInfo, StorageBackend};

const LEDGER_EXTENSION: &str = "json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%6f";
const DEFAULT_RETENTION: usize = 5;

/// Stores each account's ledger as one JSON document and keeps rotating
/// backups of the previous versions.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    ledgers_dir: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
}

impl JsonStorage {
    pub fn new(root: Option<PathBuf>, retention: Option<usize>) -> Result<Self> {
        let app_root = PathResolver::resolve_base(root);
        ensure_dir(&app_root)?;
        let ledgers_dir = PathResolver::ledger_dir_in(&app_root);
        let backups_dir = PathResolver::backup_dir_in(&app_root);
        ensure_dir(&ledgers_dir)?;
        ensure_dir(&backups_dir)?;
        Ok(Self {
            ledgers_dir,
            backups_dir,
            retention: retention.unwrap_or(DEFAULT_RETENTION).max(1),
        })
    }

    pub fn new_default() -> Result<Self> {
        Self::new(None, None)
    }

    pub fn ledger_path(&self, account_id: Uuid) -> PathBuf {
        self.ledgers_dir
            .join(format!("{}.{}", account_id, LEDGER_EXTENSION))
    }

    fn backup_dir(&self, account_id: Uuid) -> PathBuf {
        self.backups_dir.join(account_id.to_string())
    }

    fn backup_existing_file(&self, account_id: Uuid, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let dir = self.backup_dir(account_id);
        ensure_dir(&dir)?;
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT);
        let backup = dir.join(format!("{}_{}.{}", account_id, timestamp, LEDGER_EXTENSION));
        fs::copy(path, &backup)?;
        self.prune_backups(account_id)
    }

    fn prune_backups(&self, account_id: Uuid) -> Result<()> {
        let backups = self.list_backups(account_id)?;
        for stale in backups.iter().skip(self.retention) {
            fs::remove_file(&stale.path)?;
            debug!(account = %account_id, backup = %stale.id, "pruned ledger backup");
        }
        Ok(())
    }
}

impl StorageBackend for JsonStorage {
    fn save(&self, ledger: &Ledger) -> Result<()> {
        let account_id = ledger.account_id();
        let path = self.ledger_path(account_id);
        self.backup_existing_file(account_id, &path)?;
        save_ledger_to_path(ledger, &path)
    }

    fn load(&self, account_id: Uuid) -> Result<Ledger> {
        let path = self.ledger_path(account_id);
        if !path.exists() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        load_ledger_from_path(&path)
    }

    fn list_accounts(&self) -> Result<Vec<Uuid>> {
        let mut accounts = Vec::new();
        for entry in fs::read_dir(&self.ledgers_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LEDGER_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            {
                accounts.push(id);
            }
        }
        accounts.sort();
        Ok(accounts)
    }

    fn delete(&self, account_id: Uuid) -> Result<bool> {
        let path = self.ledger_path(account_id);
        if !path.exists() {
            return Ok(false);
        }
        self.backup_existing_file(account_id, &path)?;
        fs::remove_file(path)?;
        Ok(true)
    }

    /// Newest backup first.
    fn list_backups(&self, account_id: Uuid) -> Result<Vec<BackupInfo>> {
        let dir = self.backup_dir(account_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LEDGER_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                backups.push(BackupInfo {
                    account_id,
                    id: name.to_string(),
                    path: path.clone(),
                });
            }
        }
        // Timestamps are fixed-width, so name order is chronological.
        backups.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(backups)
    }

    fn restore_backup(&self, backup: &BackupInfo) -> Result<Ledger> {
        let ledger = load_ledger_from_path(&backup.path)?;
        if ledger.account_id() != backup.account_id {
            return Err(LedgerError::StorageError(format!(
                "backup `{}` belongs to account {}",
                backup.id,
                ledger.account_id()
            )));
        }
        self.save(&ledger)?;
        Ok(ledger)
    }
}

/// Writes a ledger atomically by staging to a temporary file.
pub fn save_ledger_to_path(ledger: &Ledger, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(ledger)?;
    let tmp = tmp_path(path);
    write_atomic(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads a ledger snapshot; snapshots that break the balance invariants are
/// rejected.
pub fn load_ledger_from_path(path: &Path) -> Result<Ledger> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
