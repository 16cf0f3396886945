//! Day-by-day reconciliation of imported statement rows against a ledger.
//!
//! Imported rows and existing entries are compared per calendar day (UTC),
//! newest day first, grouped by `(day, value_change, sub_key)`. A day that
//! overlaps existing data in any way is held back as a whole for manual
//! resolution; a day with no overlap is committed immediately.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ImportSettings;
use crate::ledger::{Entry, Ledger, NewEntry, Recalculate, SubKey};

use super::conflict::{ConflictKind, ConflictPair, ImportConflict, ImportOutcome};
use super::row::ImportRow;

type GroupKey = (Decimal, SubKey);

/// Classifies imported rows and commits the days that do not collide with
/// existing entries.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    settings: ImportSettings,
}

/// Conflicts found on one day and whether they block its commit.
#[derive(Debug, Default)]
struct DayPlan {
    conflicts: Vec<ImportConflict>,
    blocked: bool,
}

impl Reconciler {
    pub fn new(settings: ImportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Runs one import against `ledger`.
    ///
    /// Rows on clean days are inserted with deferred recalculation; a single
    /// recalculation per touched sub-key runs before returning. Rows that
    /// fail validation or insertion are counted and reported without
    /// aborting the batch.
    pub fn reconcile(&self, ledger: &mut Ledger, rows: &[ImportRow]) -> ImportOutcome {
        let account_id = ledger.account_id();
        let mut outcome = ImportOutcome::new(account_id);

        let mut imports_by_day: BTreeMap<NaiveDate, Vec<NewEntry>> = BTreeMap::new();
        for (index, row) in rows.iter().enumerate() {
            match row.normalize() {
                Ok(candidate) => imports_by_day
                    .entry(candidate.day())
                    .or_default()
                    .push(candidate),
                Err(err) => {
                    warn!(account = %account_id, row = index, error = %err, "import row rejected");
                    outcome.record_failure(format!("row {index}: {err}"));
                }
            }
        }

        let (Some(&first_day), Some(&last_day)) =
            (imports_by_day.keys().next(), imports_by_day.keys().next_back())
        else {
            return outcome;
        };

        let existing_by_day = self.existing_by_day(ledger, first_day, last_day);
        let days: BTreeSet<NaiveDate> = imports_by_day
            .keys()
            .chain(existing_by_day.keys().filter(|day| (first_day..=last_day).contains(*day)))
            .copied()
            .collect();

        for day in days.into_iter().rev() {
            let imports = imports_by_day.remove(&day).unwrap_or_default();
            let existing = existing_by_day.get(&day).map(Vec::as_slice).unwrap_or(&[]);
            let plan = classify_day(account_id, day, imports.clone(), existing);

            if plan.blocked {
                debug!(account = %account_id, %day, conflicts = plan.conflicts.len(), "day deferred");
                outcome.conflicts.extend(plan.conflicts);
                continue;
            }

            for candidate in imports {
                match ledger.insert(candidate, Recalculate::Deferred) {
                    Ok(_) => outcome.imported_count += 1,
                    Err(err) => {
                        warn!(account = %account_id, %day, error = %err, "import row not committed");
                        outcome.record_failure(format!("{day}: {err}"));
                    }
                }
            }
        }

        if outcome.imported_count > 0 {
            let visited = ledger.flush_recalculation();
            debug!(account = %account_id, visited, "import recalculation finished");
        }

        info!(
            account = %account_id,
            imported = outcome.imported_count,
            failed = outcome.failed_count,
            conflicts = outcome.conflicts.len(),
            "import reconciled"
        );
        outcome
    }

    fn existing_by_day(
        &self,
        ledger: &Ledger,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> BTreeMap<NaiveDate, Vec<Entry>> {
        let padding = Duration::days(self.settings.padding_days.max(0));
        let from = first_day.checked_sub_signed(padding).unwrap_or(first_day);
        let to = last_day.checked_add_signed(padding).unwrap_or(last_day);

        let mut by_day: BTreeMap<NaiveDate, Vec<Entry>> = BTreeMap::new();
        for entry in ledger.days(from, to) {
            by_day.entry(entry.day()).or_default().push(entry.clone());
        }
        by_day
    }
}

/// Pairs imports with existing entries of one day.
///
/// Within a group, imports keep their input order and existing entries keep
/// ledger order, so pairing is positional and repeatable.
fn classify_day(
    account_id: Uuid,
    day: NaiveDate,
    imports: Vec<NewEntry>,
    existing: &[Entry],
) -> DayPlan {
    let mut groups: BTreeMap<GroupKey, (Vec<NewEntry>, Vec<Entry>)> = BTreeMap::new();
    for candidate in imports {
        groups
            .entry((candidate.value_change, candidate.sub_key.clone()))
            .or_default()
            .0
            .push(candidate);
    }
    for entry in existing {
        groups
            .entry((entry.value_change, entry.sub_key.clone()))
            .or_default()
            .1
            .push(entry.clone());
    }

    let mut plan = DayPlan::default();
    for (_, (imported, present)) in groups {
        let mut imported = imported.into_iter();
        let mut present = present.into_iter();
        loop {
            let pair = match (imported.next(), present.next()) {
                (Some(imported), Some(existing)) => ConflictPair::ExactMatch { imported, existing },
                (Some(imported), None) => ConflictPair::ImportOnly { imported },
                (None, Some(existing)) => ConflictPair::ExistingOnly { existing },
                (None, None) => break,
            };
            let conflict = ImportConflict::new(account_id, day, pair);
            plan.blocked |= conflict.kind() != ConflictKind::ImportOnly;
            plan.conflicts.push(conflict);
        }
    }
    plan
}
