use std::fmt;

use serde::{Deserialize, Serialize};

use super::sub_key::SubKey;

/// Kind of account owning a ledger; decides whether entries are partitioned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Bank,
    Currency,
    Stock,
    Bond,
}

impl AccountKind {
    /// Stock and bond ledgers interleave entries for many instruments.
    pub fn is_multi_instrument(self) -> bool {
        matches!(self, AccountKind::Stock | AccountKind::Bond)
    }

    pub fn accepts(self, sub_key: &SubKey) -> bool {
        self.is_multi_instrument() == sub_key.is_keyed()
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountKind::Bank => "bank",
            AccountKind::Currency => "currency",
            AccountKind::Stock => "stock",
            AccountKind::Bond => "bond",
        };
        f.write_str(label)
    }
}
