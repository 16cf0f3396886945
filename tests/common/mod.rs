#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use ledger_core::{
    import::ImportRow,
    ledger::{AccountKind, Entry, EntryId, Ledger, NewEntry, Recalculate, SubKey},
    storage::JsonStorage,
    LedgerManager,
};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Creates a unique data directory that outlives the calling test.
pub fn temp_base() -> PathBuf {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    base
}

/// Creates a manager persisting to a fresh temporary directory.
pub fn persistent_manager() -> (LedgerManager, PathBuf) {
    let base = temp_base();
    let storage = JsonStorage::new(Some(base.clone()), Some(3)).expect("create json storage");
    (LedgerManager::new(Box::new(storage)), base)
}

/// Noon UTC on the given day of 2024.
pub fn date(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap()
}

pub fn jan(day: u32) -> DateTime<Utc> {
    date(1, day)
}

pub fn bank_ledger() -> Ledger {
    Ledger::new(Uuid::new_v4(), "Checking", AccountKind::Bank)
}

pub fn stock_ledger() -> Ledger {
    Ledger::new(Uuid::new_v4(), "Brokerage", AccountKind::Stock)
}

pub fn add(ledger: &mut Ledger, at: DateTime<Utc>, change: Decimal) -> EntryId {
    ledger
        .insert(NewEntry::new(at, change), Recalculate::Now)
        .expect("insert entry")
}

pub fn add_keyed(ledger: &mut Ledger, at: DateTime<Utc>, ticker: &str, change: Decimal) -> EntryId {
    let entry = NewEntry::new(at, change).with_sub_key(SubKey::keyed(ticker));
    ledger
        .insert(entry, Recalculate::Now)
        .expect("insert keyed entry")
}

pub fn row(at: DateTime<Utc>, change: Decimal) -> ImportRow {
    ImportRow::from(&NewEntry::new(at, change))
}

/// Values of the ledger, newest first.
pub fn values(ledger: &Ledger) -> Vec<Decimal> {
    ledger.iter().map(|entry| entry.value).collect()
}

/// Asserts newest-first ordering by (posting date, entry id).
pub fn assert_sorted(ledger: &Ledger) {
    let entries: Vec<&Entry> = ledger.iter().collect();
    for pair in entries.windows(2) {
        let (newer, older) = (pair[0], pair[1]);
        assert!(
            (newer.posting_date, newer.entry_id) > (older.posting_date, older.entry_id),
            "entries {} and {} out of order",
            newer.entry_id,
            older.entry_id
        );
    }
}
