//! Statement import: reconciliation against existing entries and application
//! of manually resolved conflicts.

pub mod conflict;
pub mod reconciler;
pub mod resolution;
pub mod row;

pub use conflict::{
    ConflictKind, ConflictPair, ImportConflict, ImportOutcome, ResolutionReport, ResolvedConflict,
};
pub use reconciler::Reconciler;
pub use resolution::ResolutionApplier;
pub use row::ImportRow;
