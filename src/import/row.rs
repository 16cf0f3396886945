use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};
use crate::ledger::{EntryMetadata, NewEntry, SubKey};

/// A statement row as handed over by an upstream parser.
///
/// The timestamp keeps its original offset so rows that were not normalized
/// to UTC can be rejected instead of silently shifted to another day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub posting_date: DateTime<FixedOffset>,
    pub value_change: Decimal,
    #[serde(default)]
    pub sub_key: SubKey,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl ImportRow {
    pub fn new(posting_date: DateTime<FixedOffset>, value_change: Decimal) -> Self {
        Self {
            posting_date,
            value_change,
            sub_key: SubKey::NoKey,
            metadata: EntryMetadata::default(),
        }
    }

    /// Parses an RFC 3339 timestamp such as `2024-01-05T00:00:00Z`.
    pub fn from_rfc3339(raw: &str, value_change: Decimal) -> Result<Self> {
        let posting_date = DateTime::parse_from_rfc3339(raw.trim())
            .map_err(|err| LedgerError::InvalidTimestamp(format!("`{raw}`: {err}")))?;
        Ok(Self::new(posting_date, value_change))
    }

    pub fn with_sub_key(mut self, sub_key: SubKey) -> Self {
        self.sub_key = sub_key;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    /// Converts the row into a ledger candidate; only UTC timestamps pass.
    pub fn normalize(&self) -> Result<NewEntry> {
        if self.posting_date.offset().local_minus_utc() != 0 {
            return Err(LedgerError::InvalidTimestamp(format!(
                "{} is not in UTC",
                self.posting_date.to_rfc3339()
            )));
        }
        Ok(NewEntry {
            posting_date: self.posting_date.with_timezone(&Utc),
            value_change: self.value_change,
            sub_key: self.sub_key.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

impl From<&NewEntry> for ImportRow {
    fn from(entry: &NewEntry) -> Self {
        Self {
            posting_date: DateTime::<FixedOffset>::from(entry.posting_date),
            value_change: entry.value_change,
            sub_key: entry.sub_key.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}
