use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::{AccountKind, SubKey};

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error type that captures ledger, import, and persistence failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(
        "Duplicate entry in account {account_id}: {posting_date} / {value_change} / {sub_key}"
    )]
    DuplicateEntry {
        account_id: Uuid,
        posting_date: DateTime<Utc>,
        value_change: Decimal,
        sub_key: SubKey,
    },
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Sub-key {sub_key} is not valid for a {kind} account")]
    SubKeyMismatch { kind: AccountKind, sub_key: SubKey },
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("Account already registered: {0}")]
    AccountExists(Uuid),
    #[error("Record of account {found} applied to account {expected}")]
    AccountMismatch { expected: Uuid, found: Uuid },
    #[error("Recalculation failed: {0}")]
    Recalculation(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Persistence error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
