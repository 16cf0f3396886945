use tracing::{info, warn};

use crate::errors::LedgerError;
use crate::ledger::{Ledger, Recalculate};

use super::conflict::{ResolutionReport, ResolvedConflict};

/// Turns user decisions on import conflicts into ordinary ledger mutations.
pub struct ResolutionApplier;

impl ResolutionApplier {
    /// Applies every resolution in order, best effort.
    ///
    /// A failing resolution is logged and reported; the remaining ones are
    /// still applied. Removal of the existing entry happens before the
    /// imported entry is added, so "replace" decisions never trip the
    /// duplicate check.
    pub fn apply(ledger: &mut Ledger, resolved: Vec<ResolvedConflict>) -> ResolutionReport {
        let mut report = ResolutionReport {
            account_id: ledger.account_id(),
            ..ResolutionReport::default()
        };

        for resolution in resolved {
            let conflict_id = resolution.conflict.id;
            if let Err(err) = Self::apply_one(ledger, resolution, &mut report) {
                warn!(account = %report.account_id, conflict = %conflict_id, error = %err, "conflict resolution failed");
                report.failures.push(format!("conflict {conflict_id}: {err}"));
            }
        }

        info!(
            account = %report.account_id,
            removed = report.removed,
            added = report.added,
            failed = report.failures.len(),
            "conflict resolutions applied"
        );
        report
    }

    fn apply_one(
        ledger: &mut Ledger,
        resolution: ResolvedConflict,
        report: &mut ResolutionReport,
    ) -> Result<(), LedgerError> {
        let conflict = resolution.conflict;
        if conflict.account_id != ledger.account_id() {
            return Err(LedgerError::AccountMismatch {
                expected: ledger.account_id(),
                found: conflict.account_id,
            });
        }

        if !resolution.keep_existing {
            if let Some(existing) = conflict.existing_entry() {
                if ledger.remove(existing.entry_id)?.is_some() {
                    report.removed += 1;
                } else {
                    warn!(account = %report.account_id, entry_id = existing.entry_id, "existing entry already gone");
                }
            }
        }

        if resolution.add_imported {
            if let Some(imported) = conflict.import_entry() {
                ledger.insert(imported.clone(), Recalculate::Now)?;
                report.added += 1;
            }
        }
        Ok(())
    }
}
