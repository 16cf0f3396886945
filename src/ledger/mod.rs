//! Ledger domain: entries, partitions, and the running-balance invariant.

pub mod account;
pub mod entry;
#[allow(clippy::module_inception)]
pub mod ledger;
pub mod query;
pub mod sub_key;

pub use account::AccountKind;
pub use entry::{Entry, EntryId, EntryMetadata, EntryPatch, NewEntry};
pub use ledger::{Ledger, Recalculate};
pub use sub_key::SubKey;
