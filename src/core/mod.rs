pub mod ledger_manager;

pub use ledger_manager::LedgerManager;
