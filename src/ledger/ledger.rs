use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{LedgerError, Result};

use super::{
    account::AccountKind,
    entry::{Entry, EntryId, EntryPatch, Identity, NewEntry, OrderKey},
    sub_key::SubKey,
};

pub(crate) const CURRENT_SCHEMA_VERSION: u8 = 1;

/// Whether a mutation recalculates balances immediately or leaves that to a
/// later [`Ledger::flush_recalculation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recalculate {
    #[default]
    Now,
    Deferred,
}

/// Ordered entries of one account with their running balances.
///
/// Entries live in an arena keyed by id; `order` is the chronological index
/// (oldest first, ties broken by id). The newest-first view callers see is the
/// reverse of that index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LedgerSnapshot", into = "LedgerSnapshot")]
pub struct Ledger {
    pub(super) account_id: Uuid,
    pub(super) name: String,
    pub(super) kind: AccountKind,
    pub(super) entries: HashMap<EntryId, Entry>,
    pub(super) order: BTreeSet<OrderKey>,
    identities: HashSet<Identity>,
    next_id: EntryId,
    pending: BTreeMap<SubKey, OrderKey>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    schema_version: u8,
}

impl Ledger {
    pub fn new(account_id: Uuid, name: impl Into<String>, kind: AccountKind) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            name: name.into(),
            kind,
            entries: HashMap::new(),
            order: BTreeSet::new(),
            identities: HashSet::new(),
            next_id: 0,
            pending: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id the next inserted entry will receive.
    pub fn next_free_id(&self) -> EntryId {
        self.next_id
    }

    /// True while deferred mutations are waiting for a recalculation.
    pub fn has_pending_recalculation(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn contains_identity(&self, candidate: &NewEntry) -> bool {
        self.identities.contains(&candidate.identity())
    }

    /// Adds a new entry at its chronological position and returns its id.
    ///
    /// Fails without touching the ledger if the sub-key does not fit the
    /// account kind or if an entry with the same posting date, delta, and
    /// sub-key already exists.
    pub fn insert(&mut self, candidate: NewEntry, recalc: Recalculate) -> Result<EntryId> {
        self.ensure_sub_key(&candidate.sub_key)?;
        let identity = candidate.identity();
        if self.identities.contains(&identity) {
            return Err(self.duplicate(identity));
        }

        let entry_id = self.next_id;
        let entry = Entry {
            account_id: self.account_id,
            entry_id,
            posting_date: candidate.posting_date,
            value: candidate.value_change,
            value_change: candidate.value_change,
            sub_key: candidate.sub_key,
            metadata: candidate.metadata,
        };
        let key = entry.order_key();
        let sub_key = entry.sub_key.clone();

        self.next_id += 1;
        self.identities.insert(identity);
        self.order.insert(key);
        self.entries.insert(entry_id, entry);
        self.mark_pending(sub_key, key);
        self.touch();
        debug!(account = %self.account_id, entry_id, "entry inserted");

        if recalc == Recalculate::Now {
            self.flush_recalculation();
        }
        Ok(entry_id)
    }

    /// Applies a patch to an existing entry and moves it to its new position.
    ///
    /// Returns `Ok(None)` when no entry has the patched id; that outcome is a
    /// pass-through, not an error.
    pub fn update(&mut self, patch: EntryPatch, recalc: Recalculate) -> Result<Option<Entry>> {
        let Some(current) = self.entries.get(&patch.entry_id) else {
            debug!(account = %self.account_id, entry_id = patch.entry_id, "update skipped, entry not found");
            return Ok(None);
        };

        let old_key = current.order_key();
        let old_identity = current.identity();
        let new_identity = (patch.posting_date, patch.value_change, current.sub_key.clone());
        if new_identity != old_identity && self.identities.contains(&new_identity) {
            return Err(self.duplicate(new_identity));
        }

        self.order.remove(&old_key);
        self.identities.remove(&old_identity);
        let Some(entry) = self.entries.get_mut(&patch.entry_id) else {
            return Ok(None);
        };
        // Provisional until the partition is recalculated.
        entry.value += patch.value_change - entry.value_change;
        entry.posting_date = patch.posting_date;
        entry.value_change = patch.value_change;
        entry.metadata = patch.metadata;
        let new_key = entry.order_key();
        let sub_key = entry.sub_key.clone();

        self.order.insert(new_key);
        self.identities.insert(new_identity);
        // Entries between the old and new position change their older
        // neighbour, so the walk starts at whichever position is older.
        self.mark_pending(sub_key, old_key.min(new_key));
        self.touch();
        debug!(account = %self.account_id, entry_id = patch.entry_id, "entry updated");

        if recalc == Recalculate::Now {
            self.flush_recalculation();
        }
        Ok(self.entries.get(&patch.entry_id).cloned())
    }

    /// Deletes an entry and recalculates the younger part of its partition.
    ///
    /// Returns `Ok(None)` when the id is unknown.
    pub fn remove(&mut self, entry_id: EntryId) -> Result<Option<Entry>> {
        let Some(entry) = self.entries.remove(&entry_id) else {
            debug!(account = %self.account_id, entry_id, "remove skipped, entry not found");
            return Ok(None);
        };
        let key = entry.order_key();
        self.order.remove(&key);
        self.identities.remove(&entry.identity());
        self.mark_pending(entry.sub_key.clone(), key);
        self.touch();
        self.flush_recalculation();
        debug!(account = %self.account_id, entry_id, "entry removed");
        Ok(Some(entry))
    }

    /// Deletes every entry; the id high-water mark is kept.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.order.clear();
        self.identities.clear();
        self.pending.clear();
        self.touch();
        removed
    }

    /// Runs one recalculation per partition from its oldest pending anchor.
    pub fn flush_recalculation(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|(sub_key, anchor)| self.recalculate_partition(&sub_key, anchor))
            .sum()
    }

    /// Recalculates the partition of `entry_id` from that entry to the newest
    /// entry. Returns the number of entries visited, or `None` if unknown.
    ///
    /// An older pending anchor of the same partition is absorbed, so the walk
    /// starts at whichever of the two is older.
    pub fn recalculate_from(&mut self, entry_id: EntryId) -> Option<usize> {
        let entry = self.entries.get(&entry_id)?;
        let sub_key = entry.sub_key.clone();
        let requested = entry.order_key();
        let anchor = self
            .pending
            .remove(&sub_key)
            .map_or(requested, |pending| pending.min(requested));
        Some(self.recalculate_partition(&sub_key, anchor))
    }

    /// Full recompute of every partition.
    pub fn recalculate_all(&mut self) -> usize {
        self.pending.clear();
        let Some(first) = self.order.first().copied() else {
            return 0;
        };
        let sub_keys: BTreeSet<SubKey> =
            self.entries.values().map(|entry| entry.sub_key.clone()).collect();
        sub_keys
            .iter()
            .map(|sub_key| self.recalculate_partition(sub_key, first))
            .sum()
    }

    /// Checks ordering, running balances, id allocation, and duplicate keys.
    pub fn verify(&self) -> Result<()> {
        if self.has_pending_recalculation() {
            return Err(LedgerError::InvariantViolation(format!(
                "account {} has pending recalculation",
                self.account_id
            )));
        }
        if self.order.len() != self.entries.len() || self.identities.len() != self.entries.len() {
            return Err(LedgerError::InvariantViolation(format!(
                "account {} index out of sync with entries",
                self.account_id
            )));
        }

        let mut running: HashMap<&SubKey, Decimal> = HashMap::new();
        for key in &self.order {
            let entry = self.entries.get(&key.1).ok_or_else(|| {
                LedgerError::InvariantViolation(format!("indexed entry {} missing", key.1))
            })?;
            if entry.order_key() != *key {
                return Err(LedgerError::InvariantViolation(format!(
                    "entry {} indexed at stale position",
                    entry.entry_id
                )));
            }
            if entry.entry_id >= self.next_id {
                return Err(LedgerError::InvariantViolation(format!(
                    "entry {} not below next free id {}",
                    entry.entry_id, self.next_id
                )));
            }
            if !self.identities.contains(&entry.identity()) {
                return Err(LedgerError::InvariantViolation(format!(
                    "entry {} missing from duplicate index",
                    entry.entry_id
                )));
            }
            let previous = running.get(&entry.sub_key).copied().unwrap_or(Decimal::ZERO);
            let expected = previous + entry.value_change;
            if entry.value != expected {
                return Err(LedgerError::InvariantViolation(format!(
                    "entry {} has value {} but expected {}",
                    entry.entry_id, entry.value, expected
                )));
            }
            running.insert(&entry.sub_key, entry.value);
        }
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn recalculate_partition(&mut self, sub_key: &SubKey, anchor: OrderKey) -> usize {
        let mut running = self
            .order
            .range(..anchor)
            .rev()
            .filter_map(|key| self.entries.get(&key.1))
            .find(|entry| &entry.sub_key == sub_key)
            .map(|entry| entry.value)
            .unwrap_or(Decimal::ZERO);

        let mut visited = 0;
        for key in self.order.range(anchor..) {
            let Some(entry) = self.entries.get_mut(&key.1) else {
                continue;
            };
            if &entry.sub_key != sub_key {
                continue;
            }
            running += entry.value_change;
            entry.value = running;
            visited += 1;
        }
        debug!(account = %self.account_id, %sub_key, visited, "partition recalculated");
        visited
    }

    fn mark_pending(&mut self, sub_key: SubKey, anchor: OrderKey) {
        self.pending
            .entry(sub_key)
            .and_modify(|current| *current = (*current).min(anchor))
            .or_insert(anchor);
    }

    fn ensure_sub_key(&self, sub_key: &SubKey) -> Result<()> {
        if self.kind.accepts(sub_key) {
            Ok(())
        } else {
            Err(LedgerError::SubKeyMismatch {
                kind: self.kind,
                sub_key: sub_key.clone(),
            })
        }
    }

    fn duplicate(&self, identity: Identity) -> LedgerError {
        let (posting_date, value_change, sub_key) = identity;
        LedgerError::DuplicateEntry {
            account_id: self.account_id,
            posting_date,
            value_change,
            sub_key,
        }
    }
}

/// Persisted shape of a ledger; entries are stored newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerSnapshot {
    account_id: Uuid,
    name: String,
    kind: AccountKind,
    next_id: EntryId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default = "schema_version_default")]
    schema_version: u8,
    #[serde(default)]
    entries: Vec<Entry>,
}

fn schema_version_default() -> u8 {
    CURRENT_SCHEMA_VERSION
}

impl From<Ledger> for LedgerSnapshot {
    fn from(mut ledger: Ledger) -> Self {
        ledger.flush_recalculation();
        let mut entries = Vec::with_capacity(ledger.entries.len());
        for key in ledger.order.iter().rev() {
            if let Some(entry) = ledger.entries.remove(&key.1) {
                entries.push(entry);
            }
        }
        Self {
            account_id: ledger.account_id,
            name: ledger.name,
            kind: ledger.kind,
            next_id: ledger.next_id,
            created_at: ledger.created_at,
            updated_at: ledger.updated_at,
            schema_version: ledger.schema_version,
            entries,
        }
    }
}

impl TryFrom<LedgerSnapshot> for Ledger {
    type Error = LedgerError;

    fn try_from(snapshot: LedgerSnapshot) -> Result<Self> {
        if snapshot.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(LedgerError::StorageError(format!(
                "ledger {} uses newer schema version {}",
                snapshot.account_id, snapshot.schema_version
            )));
        }
        let mut ledger = Ledger::new(snapshot.account_id, snapshot.name, snapshot.kind);
        ledger.created_at = snapshot.created_at;
        ledger.updated_at = snapshot.updated_at;

        let mut highest = None;
        for entry in snapshot.entries {
            if entry.account_id != ledger.account_id {
                return Err(LedgerError::InvariantViolation(format!(
                    "entry {} belongs to account {}",
                    entry.entry_id, entry.account_id
                )));
            }
            if ledger.entries.contains_key(&entry.entry_id) {
                return Err(LedgerError::InvariantViolation(format!(
                    "entry id {} appears twice",
                    entry.entry_id
                )));
            }
            ledger.ensure_sub_key(&entry.sub_key)?;
            highest = highest.max(Some(entry.entry_id));
            ledger.identities.insert(entry.identity());
            ledger.order.insert(entry.order_key());
            ledger.entries.insert(entry.entry_id, entry);
        }
        let after_highest = match highest {
            Some(id) => id.checked_add(1).ok_or_else(|| {
                LedgerError::InvariantViolation(format!("entry id {id} leaves no free id"))
            })?,
            None => 0,
        };
        ledger.next_id = snapshot.next_id.max(after_highest);
        ledger.verify()?;
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn bank() -> Ledger {
        Ledger::new(Uuid::new_v4(), "Checking", AccountKind::Bank)
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut ledger = bank();
        let first = ledger.insert(NewEntry::new(at(1), dec!(5)), Recalculate::Now).unwrap();
        let second = ledger.insert(NewEntry::new(at(2), dec!(5)), Recalculate::Now).unwrap();
        ledger.remove(second).unwrap();
        let third = ledger.insert(NewEntry::new(at(3), dec!(5)), Recalculate::Now).unwrap();
        assert_eq!((first, second, third), (0, 1, 2));
    }

    #[test]
    fn deferred_inserts_are_fixed_by_flush() {
        let mut ledger = bank();
        ledger.insert(NewEntry::new(at(3), dec!(1)), Recalculate::Deferred).unwrap();
        ledger.insert(NewEntry::new(at(1), dec!(2)), Recalculate::Deferred).unwrap();
        assert!(ledger.verify().is_err());

        ledger.flush_recalculation();
        ledger.verify().unwrap();
        assert_eq!(ledger.balance(&SubKey::NoKey), dec!(3));
    }

    #[test]
    fn update_to_duplicate_identity_is_rejected() {
        let mut ledger = bank();
        ledger.insert(NewEntry::new(at(1), dec!(10)), Recalculate::Now).unwrap();
        let id = ledger.insert(NewEntry::new(at(2), dec!(10)), Recalculate::Now).unwrap();
        let mut patch = EntryPatch::from_entry(ledger.get(id).unwrap());
        patch.posting_date = at(1);

        let err = ledger.update(patch, Recalculate::Now).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateEntry { .. }));
        assert_eq!(ledger.get(id).unwrap().posting_date, at(2));
    }

    #[test]
    fn moving_an_entry_later_recalculates_skipped_entries() {
        let mut ledger = bank();
        let moved = ledger.insert(NewEntry::new(at(1), dec!(100)), Recalculate::Now).unwrap();
        let middle = ledger.insert(NewEntry::new(at(2), dec!(1)), Recalculate::Now).unwrap();
        let mut patch = EntryPatch::from_entry(ledger.get(moved).unwrap());
        patch.posting_date = at(3);

        ledger.update(patch, Recalculate::Now).unwrap();

        assert_eq!(ledger.get(middle).unwrap().value, dec!(1));
        assert_eq!(ledger.get(moved).unwrap().value, dec!(101));
        ledger.verify().unwrap();
    }

    #[test]
    fn snapshot_round_trip_preserves_high_water_mark() {
        let mut ledger = bank();
        ledger.insert(NewEntry::new(at(1), dec!(1)), Recalculate::Now).unwrap();
        let last = ledger.insert(NewEntry::new(at(2), dec!(1)), Recalculate::Now).unwrap();
        ledger.remove(last).unwrap();

        let json = serde_json::to_string(&ledger).unwrap();
        let restored: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.next_free_id(), 2);
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn snapshot_with_broken_balance_is_rejected() {
        let mut ledger = bank();
        ledger.insert(NewEntry::new(at(1), dec!(1)), Recalculate::Now).unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let tampered = json.replacen("\"value\":\"1\"", "\"value\":\"7\"", 1);

        let err = serde_json::from_str::<Ledger>(&tampered).unwrap_err();
        assert!(err.to_string().contains("Invariant violated"));
    }

    #[test]
    fn snapshot_with_exhausted_ids_is_rejected() {
        let mut ledger = bank();
        ledger.insert(NewEntry::new(at(1), dec!(1)), Recalculate::Now).unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let tampered = json.replacen(
            "\"entry_id\":0",
            &format!("\"entry_id\":{}", EntryId::MAX),
            1,
        );
        assert_ne!(tampered, json);

        let err = serde_json::from_str::<Ledger>(&tampered).unwrap_err();
        assert!(err.to_string().contains("leaves no free id"));
    }

    #[test]
    fn recalculate_from_counts_visited_entries() {
        let mut ledger = bank();
        ledger.insert(NewEntry::new(at(1), dec!(1)), Recalculate::Now).unwrap();
        let middle = ledger.insert(NewEntry::new(at(2), dec!(2)), Recalculate::Now).unwrap();
        ledger.insert(NewEntry::new(at(3), dec!(3)), Recalculate::Now).unwrap();

        assert_eq!(ledger.recalculate_from(middle), Some(2));
        assert_eq!(ledger.recalculate_from(99), None);
        assert_eq!(ledger.balance(&SubKey::NoKey), dec!(6));
    }

    #[test]
    fn recalculate_from_absorbs_an_older_pending_anchor() {
        let mut ledger = bank();
        ledger.insert(NewEntry::new(at(1), dec!(10)), Recalculate::Now).unwrap();
        ledger.insert(NewEntry::new(at(2), dec!(5)), Recalculate::Deferred).unwrap();
        let newest = ledger.insert(NewEntry::new(at(5), dec!(1)), Recalculate::Deferred).unwrap();

        assert_eq!(ledger.recalculate_from(newest), Some(2));

        assert!(!ledger.has_pending_recalculation());
        let values: Vec<Decimal> = ledger.iter().map(|entry| entry.value).collect();
        assert_eq!(values, vec![dec!(16), dec!(15), dec!(10)]);
        ledger.verify().unwrap();
    }
}
