use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sub_key::SubKey;

/// Per-account entry identifier, assigned as `max + 1` and never reused.
pub type EntryId = u64;

/// Descriptive data carried with an entry; never read by the balance logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A single ledger record with its cumulative balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub account_id: Uuid,
    pub entry_id: EntryId,
    pub posting_date: DateTime<Utc>,
    /// Running balance of the entry's partition as of this entry.
    pub value: Decimal,
    pub value_change: Decimal,
    #[serde(default)]
    pub sub_key: SubKey,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl Entry {
    pub fn day(&self) -> NaiveDate {
        self.posting_date.date_naive()
    }

    /// Position of the entry in chronological order (oldest first).
    pub(crate) fn order_key(&self) -> OrderKey {
        (self.posting_date, self.entry_id)
    }

    /// Duplicate-detection key for direct adds.
    pub(crate) fn identity(&self) -> Identity {
        (self.posting_date, self.value_change, self.sub_key.clone())
    }
}

pub(crate) type OrderKey = (DateTime<Utc>, EntryId);
pub(crate) type Identity = (DateTime<Utc>, Decimal, SubKey);

/// Candidate entry that has not been assigned an id or a balance yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub posting_date: DateTime<Utc>,
    pub value_change: Decimal,
    #[serde(default)]
    pub sub_key: SubKey,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl NewEntry {
    pub fn new(posting_date: DateTime<Utc>, value_change: Decimal) -> Self {
        Self {
            posting_date,
            value_change,
            sub_key: SubKey::NoKey,
            metadata: EntryMetadata::default(),
        }
    }

    pub fn with_sub_key(mut self, sub_key: SubKey) -> Self {
        self.sub_key = sub_key;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn day(&self) -> NaiveDate {
        self.posting_date.date_naive()
    }

    pub(crate) fn identity(&self) -> Identity {
        (self.posting_date, self.value_change, self.sub_key.clone())
    }
}

impl From<&Entry> for NewEntry {
    fn from(entry: &Entry) -> Self {
        Self {
            posting_date: entry.posting_date,
            value_change: entry.value_change,
            sub_key: entry.sub_key.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}

/// New user-editable state for an existing entry; the balance is always derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPatch {
    pub entry_id: EntryId,
    pub posting_date: DateTime<Utc>,
    pub value_change: Decimal,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl EntryPatch {
    /// Starts a patch from the entry's current state.
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            entry_id: entry.entry_id,
            posting_date: entry.posting_date,
            value_change: entry.value_change,
            metadata: entry.metadata.clone(),
        }
    }
}
