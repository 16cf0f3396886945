use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{Entry, NewEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// An imported row and an existing entry share day, delta, and sub-key.
    ExactMatch,
    /// An imported row with no existing counterpart on a contested day.
    ImportOnly,
    /// An existing entry the import does not account for.
    ExistingOnly,
}

/// The rows a conflict is about; at least one side is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictPair {
    ExactMatch { imported: NewEntry, existing: Entry },
    ImportOnly { imported: NewEntry },
    ExistingOnly { existing: Entry },
}

/// A day-scoped mismatch that needs a human decision before it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConflict {
    pub id: Uuid,
    pub account_id: Uuid,
    pub day: NaiveDate,
    pub pair: ConflictPair,
}

impl ImportConflict {
    pub fn new(account_id: Uuid, day: NaiveDate, pair: ConflictPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            day,
            pair,
        }
    }

    pub fn kind(&self) -> ConflictKind {
        match self.pair {
            ConflictPair::ExactMatch { .. } => ConflictKind::ExactMatch,
            ConflictPair::ImportOnly { .. } => ConflictKind::ImportOnly,
            ConflictPair::ExistingOnly { .. } => ConflictKind::ExistingOnly,
        }
    }

    pub fn import_entry(&self) -> Option<&NewEntry> {
        match &self.pair {
            ConflictPair::ExactMatch { imported, .. } | ConflictPair::ImportOnly { imported } => {
                Some(imported)
            }
            ConflictPair::ExistingOnly { .. } => None,
        }
    }

    pub fn existing_entry(&self) -> Option<&Entry> {
        match &self.pair {
            ConflictPair::ExactMatch { existing, .. } | ConflictPair::ExistingOnly { existing } => {
                Some(existing)
            }
            ConflictPair::ImportOnly { .. } => None,
        }
    }

    /// Attaches the user's decision; the conflict is consumed.
    pub fn resolve(self, keep_existing: bool, add_imported: bool) -> ResolvedConflict {
        ResolvedConflict {
            conflict: self,
            keep_existing,
            add_imported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub conflict: ImportConflict,
    pub keep_existing: bool,
    pub add_imported: bool,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub account_id: Uuid,
    pub imported_count: usize,
    pub failed_count: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<ImportConflict>,
}

impl ImportOutcome {
    pub fn new(account_id: Uuid) -> Self {
        Self {
            account_id,
            ..Self::default()
        }
    }

    pub fn conflicts_of(&self, kind: ConflictKind) -> impl Iterator<Item = &ImportConflict> + '_ {
        self.conflicts
            .iter()
            .filter(move |conflict| conflict.kind() == kind)
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.failed_count += 1;
        self.errors.push(message);
    }
}

/// Summary of applying a batch of resolved conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub account_id: Uuid,
    pub removed: usize,
    pub added: usize,
    #[serde(default)]
    pub failures: Vec<String>,
}
