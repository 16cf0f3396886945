use std::fmt;

use serde::{Deserialize, Serialize};

/// Partition key of a ledger entry.
///
/// Bank and currency ledgers keep a single implicit partition (`NoKey`); stock
/// and bond ledgers keep one partition per instrument identifier (ticker or
/// bond details id). Running balances are computed independently per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubKey {
    #[default]
    NoKey,
    Keyed(String),
}

impl SubKey {
    pub fn keyed(id: impl Into<String>) -> Self {
        SubKey::Keyed(id.into())
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, SubKey::Keyed(_))
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            SubKey::NoKey => None,
            SubKey::Keyed(id) => Some(id),
        }
    }
}

impl From<Option<String>> for SubKey {
    fn from(value: Option<String>) -> Self {
        value.map(SubKey::Keyed).unwrap_or(SubKey::NoKey)
    }
}

impl fmt::Display for SubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubKey::NoKey => f.write_str("-"),
            SubKey::Keyed(id) => f.write_str(id),
        }
    }
}
