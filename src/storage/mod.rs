pub mod json_backend;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    errors::Result,
    ledger::{Entry, EntryId, EntryPatch, Ledger, NewEntry, SubKey},
};

pub use json_backend::JsonStorage;

/// Reference point for neighbour lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Date(DateTime<Utc>),
    Entry(EntryId),
}

/// Entry-level access to the ledgers of many accounts.
///
/// Every mutating call is one critical section for its account: balances are
/// recalculated and persisted before the call returns, and a failure leaves
/// the account as it was.
pub trait EntryRepository: Send + Sync {
    /// Assigns the next free id and inserts the entry.
    fn add(&self, account_id: Uuid, entry: NewEntry) -> Result<EntryId>;
    /// Returns `false` when the entry does not exist.
    fn update(&self, account_id: Uuid, patch: EntryPatch) -> Result<bool>;
    /// Returns `false` when the entry does not exist.
    fn delete(&self, account_id: Uuid, entry_id: EntryId) -> Result<bool>;
    /// Removes every entry of the account; `false` if it had none.
    fn delete_all(&self, account_id: Uuid) -> Result<bool>;

    fn get_range(
        &self,
        account_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Entry>>;
    fn get(&self, account_id: Uuid, entry_id: EntryId) -> Result<Option<Entry>>;
    fn oldest(&self, account_id: Uuid) -> Result<Option<Entry>>;
    fn youngest(&self, account_id: Uuid) -> Result<Option<Entry>>;
    fn next_older(&self, account_id: Uuid, cursor: Cursor) -> Result<Option<Entry>>;
    fn next_younger(&self, account_id: Uuid, cursor: Cursor) -> Result<Option<Entry>>;
    fn next_older_per_key(
        &self,
        account_id: Uuid,
        cursor: Cursor,
    ) -> Result<BTreeMap<SubKey, Entry>>;
    fn next_younger_per_key(
        &self,
        account_id: Uuid,
        cursor: Cursor,
    ) -> Result<BTreeMap<SubKey, Entry>>;

    /// Recalculates the partition of `from` starting at that entry and
    /// returns how many entries were visited.
    fn recalculate_values(&self, account_id: Uuid, from: EntryId) -> Result<usize>;
}

/// Describes a persisted backup of one account's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub account_id: Uuid,
    pub id: String,
    pub path: PathBuf,
}

/// Durable snapshot storage for whole ledgers.
pub trait StorageBackend: Send + Sync {
    fn save(&self, ledger: &Ledger) -> Result<()>;
    fn load(&self, account_id: Uuid) -> Result<Ledger>;
    fn list_accounts(&self) -> Result<Vec<Uuid>>;
    /// Returns `false` if nothing was stored for the account.
    fn delete(&self, account_id: Uuid) -> Result<bool>;
    fn list_backups(&self, account_id: Uuid) -> Result<Vec<BackupInfo>>;
    fn restore_backup(&self, backup: &BackupInfo) -> Result<Ledger>;
}
