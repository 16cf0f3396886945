use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::{Config, ImportSettings},
    errors::{LedgerError, Result},
    import::{
        ImportOutcome, ImportRow, Reconciler, ResolutionApplier, ResolutionReport,
        ResolvedConflict,
    },
    ledger::{AccountKind, Entry, EntryId, EntryPatch, Ledger, NewEntry, Recalculate, SubKey},
    storage::{Cursor, EntryRepository, JsonStorage, StorageBackend},
};

type AccountHandle = Arc<RwLock<Ledger>>;

/// Registry of account ledgers that serializes writes per account.
///
/// Each account sits behind its own lock. A write works on a copy of the
/// ledger, recalculates, verifies, persists (when a backend is attached), and
/// only then publishes the copy, so readers never see a half-applied change
/// and a failed write leaves the account untouched.
pub struct LedgerManager {
    accounts: RwLock<HashMap<Uuid, AccountHandle>>,
    storage: Option<Box<dyn StorageBackend>>,
    reconciler: Reconciler,
}

impl Default for LedgerManager {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LedgerManager {
    pub fn in_memory() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            storage: None,
            reconciler: Reconciler::default(),
        }
    }

    pub fn new(storage: Box<dyn StorageBackend>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::in_memory()
        }
    }

    /// Builds a manager backed by [`JsonStorage`] under the configured data
    /// directory and loads every stored account.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let storage = JsonStorage::new(config.data_dir.clone(), None)?;
        let manager = Self::new(Box::new(storage)).with_import_settings(config.import.clone());
        manager.open_all()?;
        Ok(manager)
    }

    pub fn with_import_settings(mut self, settings: ImportSettings) -> Self {
        self.reconciler = Reconciler::new(settings);
        self
    }

    pub fn storage(&self) -> Option<&dyn StorageBackend> {
        self.storage.as_deref()
    }

    /// Loads every account known to the backend that is not loaded yet.
    pub fn open_all(&self) -> Result<usize> {
        let Some(storage) = self.storage.as_deref() else {
            return Ok(0);
        };
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let mut loaded = 0;
        for account_id in storage.list_accounts()? {
            if accounts.contains_key(&account_id) {
                continue;
            }
            let ledger = storage.load(account_id)?;
            accounts.insert(account_id, Arc::new(RwLock::new(ledger)));
            loaded += 1;
        }
        info!(loaded, "ledgers opened");
        Ok(loaded)
    }

    pub fn create_account(&self, name: impl Into<String>, kind: AccountKind) -> Result<Uuid> {
        let account_id = Uuid::new_v4();
        self.register(Ledger::new(account_id, name, kind))?;
        Ok(account_id)
    }

    /// Adds an existing ledger to the registry.
    pub fn register(&self, mut ledger: Ledger) -> Result<()> {
        let account_id = ledger.account_id();
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if accounts.contains_key(&account_id) {
            return Err(LedgerError::AccountExists(account_id));
        }
        ledger.flush_recalculation();
        ledger.verify()?;
        if let Some(storage) = self.storage.as_deref() {
            storage.save(&ledger)?;
        }
        accounts.insert(account_id, Arc::new(RwLock::new(ledger)));
        debug!(account = %account_id, "account registered");
        Ok(())
    }

    /// Drops an account and its stored ledger.
    pub fn remove_account(&self, account_id: Uuid) -> Result<bool> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let removed = accounts.remove(&account_id).is_some();
        let deleted = match self.storage.as_deref() {
            Some(storage) => storage.delete(account_id)?,
            None => false,
        };
        Ok(removed || deleted)
    }

    pub fn accounts(&self) -> Vec<Uuid> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<Uuid> = accounts.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Copy of the account's current ledger.
    pub fn snapshot(&self, account_id: Uuid) -> Result<Ledger> {
        self.with_account(account_id, Ledger::clone)
    }

    /// Runs a read-only closure under the account's read lock.
    pub fn with_account<T>(&self, account_id: Uuid, read: impl FnOnce(&Ledger) -> T) -> Result<T> {
        let handle = self.handle(account_id)?;
        let ledger = handle.read().unwrap_or_else(PoisonError::into_inner);
        Ok(read(&ledger))
    }

    /// Runs a mutation as one critical section for the account.
    ///
    /// The mutation runs on a clone that is verified in full before it is
    /// published, so every write costs O(n) in the size of the ledger on top
    /// of its recalculation. Batch work belongs in a single call.
    pub fn with_account_mut<T>(
        &self,
        account_id: Uuid,
        mutate: impl FnOnce(&mut Ledger) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(account_id)?;
        // Published state is only ever replaced after a complete commit.
        let mut published = handle.write().unwrap_or_else(PoisonError::into_inner);
        let mut working = published.clone();

        let value = mutate(&mut working)?;
        working.flush_recalculation();
        working.verify()?;
        if let Some(storage) = self.storage.as_deref() {
            storage.save(&working).map_err(|err| {
                LedgerError::Recalculation(format!("account {account_id} not persisted: {err}"))
            })?;
        }

        *published = working;
        Ok(value)
    }

    /// Reconciles a statement batch against the account.
    ///
    /// The whole import is one critical section: if the result cannot be
    /// persisted, nothing from the batch is kept.
    pub fn import(&self, account_id: Uuid, rows: &[ImportRow]) -> Result<ImportOutcome> {
        self.with_account_mut(account_id, |ledger| {
            Ok(self.reconciler.reconcile(ledger, rows))
        })
    }

    /// Applies manually resolved conflicts for the account.
    pub fn resolve(
        &self,
        account_id: Uuid,
        resolved: Vec<ResolvedConflict>,
    ) -> Result<ResolutionReport> {
        self.with_account_mut(account_id, |ledger| {
            Ok(ResolutionApplier::apply(ledger, resolved))
        })
    }

    fn handle(&self, account_id: Uuid) -> Result<AccountHandle> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        accounts
            .get(&account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(account_id))
    }
}

fn older(ledger: &Ledger, cursor: Cursor) -> Option<Entry> {
    match cursor {
        Cursor::Date(date) => ledger.next_older(date),
        Cursor::Entry(entry_id) => ledger.entry_before(entry_id),
    }
    .cloned()
}

fn younger(ledger: &Ledger, cursor: Cursor) -> Option<Entry> {
    match cursor {
        Cursor::Date(date) => ledger.next_younger(date),
        Cursor::Entry(entry_id) => ledger.entry_after(entry_id),
    }
    .cloned()
}

fn owned(found: BTreeMap<SubKey, &Entry>) -> BTreeMap<SubKey, Entry> {
    found
        .into_iter()
        .map(|(sub_key, entry)| (sub_key, entry.clone()))
        .collect()
}

impl EntryRepository for LedgerManager {
    fn add(&self, account_id: Uuid, entry: NewEntry) -> Result<EntryId> {
        self.with_account_mut(account_id, |ledger| ledger.insert(entry, Recalculate::Now))
    }

    fn update(&self, account_id: Uuid, patch: EntryPatch) -> Result<bool> {
        self.with_account_mut(account_id, |ledger| {
            Ok(ledger.update(patch, Recalculate::Now)?.is_some())
        })
    }

    fn delete(&self, account_id: Uuid, entry_id: EntryId) -> Result<bool> {
        self.with_account_mut(account_id, |ledger| Ok(ledger.remove(entry_id)?.is_some()))
    }

    fn delete_all(&self, account_id: Uuid) -> Result<bool> {
        self.with_account_mut(account_id, |ledger| Ok(ledger.remove_all() > 0))
    }

    fn get_range(
        &self,
        account_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Entry>> {
        self.with_account(account_id, |ledger| {
            ledger.range(start, end).into_iter().cloned().collect()
        })
    }

    fn get(&self, account_id: Uuid, entry_id: EntryId) -> Result<Option<Entry>> {
        self.with_account(account_id, |ledger| ledger.get(entry_id).cloned())
    }

    fn oldest(&self, account_id: Uuid) -> Result<Option<Entry>> {
        self.with_account(account_id, |ledger| ledger.oldest().cloned())
    }

    fn youngest(&self, account_id: Uuid) -> Result<Option<Entry>> {
        self.with_account(account_id, |ledger| ledger.youngest().cloned())
    }

    fn next_older(&self, account_id: Uuid, cursor: Cursor) -> Result<Option<Entry>> {
        self.with_account(account_id, |ledger| older(ledger, cursor))
    }

    fn next_younger(&self, account_id: Uuid, cursor: Cursor) -> Result<Option<Entry>> {
        self.with_account(account_id, |ledger| younger(ledger, cursor))
    }

    fn next_older_per_key(
        &self,
        account_id: Uuid,
        cursor: Cursor,
    ) -> Result<BTreeMap<SubKey, Entry>> {
        self.with_account(account_id, |ledger| {
            owned(match cursor {
                Cursor::Date(date) => ledger.next_older_per_key(date),
                Cursor::Entry(entry_id) => ledger.entry_before_per_key(entry_id),
            })
        })
    }

    fn next_younger_per_key(
        &self,
        account_id: Uuid,
        cursor: Cursor,
    ) -> Result<BTreeMap<SubKey, Entry>> {
        self.with_account(account_id, |ledger| {
            owned(match cursor {
                Cursor::Date(date) => ledger.next_younger_per_key(date),
                Cursor::Entry(entry_id) => ledger.entry_after_per_key(entry_id),
            })
        })
    }

    fn recalculate_values(&self, account_id: Uuid, from: EntryId) -> Result<usize> {
        self.with_account_mut(account_id, |ledger| {
            Ok(ledger.recalculate_from(from).unwrap_or(0))
        })
    }
}
