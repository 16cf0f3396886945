//! Read-only views over a [`Ledger`].
//!
//! Every list is returned newest first (posting date descending, entry id
//! descending), matching the order callers display and reconcile in.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

use super::{
    entry::{Entry, EntryId, OrderKey},
    ledger::Ledger,
    sub_key::SubKey,
};

impl Ledger {
    pub fn get(&self, entry_id: EntryId) -> Option<&Entry> {
        self.entries.get(&entry_id)
    }

    /// All entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.order.iter().rev().filter_map(|key| self.entries.get(&key.1))
    }

    /// Entries of a single partition, newest first.
    pub fn partition<'a>(&'a self, sub_key: &'a SubKey) -> impl Iterator<Item = &'a Entry> + 'a {
        self.iter().filter(move |entry| &entry.sub_key == sub_key)
    }

    /// Distinct sub-keys present in the ledger.
    pub fn sub_keys(&self) -> BTreeSet<SubKey> {
        self.entries
            .values()
            .map(|entry| entry.sub_key.clone())
            .collect()
    }

    /// Entries posted exactly at `date`.
    pub fn at(&self, date: DateTime<Utc>) -> Vec<&Entry> {
        self.range(date, date)
    }

    /// Entries posted on a calendar day (UTC).
    pub fn on_day(&self, day: NaiveDate) -> Vec<&Entry> {
        self.days(day, day)
    }

    /// Entries with `start <= posting_date <= end`.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Entry> {
        if start > end {
            return Vec::new();
        }
        let lower: OrderKey = (start, EntryId::MIN);
        let upper: OrderKey = (end, EntryId::MAX);
        self.order
            .range(lower..=upper)
            .rev()
            .filter_map(|key| self.entries.get(&key.1))
            .collect()
    }

    /// Entries whose posting day lies in `[first, last]`.
    pub fn days(&self, first: NaiveDate, last: NaiveDate) -> Vec<&Entry> {
        if first > last {
            return Vec::new();
        }
        let start = first.and_time(NaiveTime::MIN).and_utc();
        let lower: OrderKey = (start, EntryId::MIN);
        let upper = match last.succ_opt() {
            Some(next) => Bound::Excluded((next.and_time(NaiveTime::MIN).and_utc(), EntryId::MIN)),
            None => Bound::Unbounded,
        };
        self.order
            .range((Bound::Included(lower), upper))
            .rev()
            .filter_map(|key| self.entries.get(&key.1))
            .collect()
    }

    pub fn youngest(&self) -> Option<&Entry> {
        self.iter().next()
    }

    pub fn oldest(&self) -> Option<&Entry> {
        self.order
            .first()
            .and_then(|key| self.entries.get(&key.1))
    }

    pub fn youngest_in(&self, sub_key: &SubKey) -> Option<&Entry> {
        self.iter().find(|entry| &entry.sub_key == sub_key)
    }

    pub fn oldest_in(&self, sub_key: &SubKey) -> Option<&Entry> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(&key.1))
            .find(|entry| &entry.sub_key == sub_key)
    }

    /// Running balance of a partition: the value of its newest entry.
    pub fn balance(&self, sub_key: &SubKey) -> Decimal {
        self.youngest_in(sub_key)
            .map(|entry| entry.value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Nearest entry posted strictly before `date`.
    pub fn next_older(&self, date: DateTime<Utc>) -> Option<&Entry> {
        self.older_than((date, EntryId::MIN)).next()
    }

    /// Nearest entry posted strictly after `date`.
    pub fn next_younger(&self, date: DateTime<Utc>) -> Option<&Entry> {
        self.younger_than((date, EntryId::MAX)).next()
    }

    /// Nearest entry strictly before `date` in every partition that has one.
    pub fn next_older_per_key(&self, date: DateTime<Utc>) -> BTreeMap<SubKey, &Entry> {
        first_per_key(self.older_than((date, EntryId::MIN)))
    }

    /// Nearest entry strictly after `date` in every partition that has one.
    pub fn next_younger_per_key(&self, date: DateTime<Utc>) -> BTreeMap<SubKey, &Entry> {
        first_per_key(self.younger_than((date, EntryId::MAX)))
    }

    /// Entry directly older than `entry_id` in ledger order.
    pub fn entry_before(&self, entry_id: EntryId) -> Option<&Entry> {
        let key = self.entries.get(&entry_id)?.order_key();
        self.older_than(key).next()
    }

    /// Entry directly younger than `entry_id` in ledger order.
    pub fn entry_after(&self, entry_id: EntryId) -> Option<&Entry> {
        let key = self.entries.get(&entry_id)?.order_key();
        self.younger_than(key).next()
    }

    pub fn entry_before_per_key(&self, entry_id: EntryId) -> BTreeMap<SubKey, &Entry> {
        match self.entries.get(&entry_id) {
            Some(entry) => first_per_key(self.older_than(entry.order_key())),
            None => BTreeMap::new(),
        }
    }

    pub fn entry_after_per_key(&self, entry_id: EntryId) -> BTreeMap<SubKey, &Entry> {
        match self.entries.get(&entry_id) {
            Some(entry) => first_per_key(self.younger_than(entry.order_key())),
            None => BTreeMap::new(),
        }
    }

    fn older_than(&self, key: OrderKey) -> impl Iterator<Item = &Entry> + '_ {
        self.order
            .range(..key)
            .rev()
            .filter_map(|key| self.entries.get(&key.1))
    }

    fn younger_than(&self, key: OrderKey) -> impl Iterator<Item = &Entry> + '_ {
        self.order
            .range((Bound::Excluded(key), Bound::Unbounded))
            .filter_map(|key| self.entries.get(&key.1))
    }
}

fn first_per_key<'a>(entries: impl Iterator<Item = &'a Entry>) -> BTreeMap<SubKey, &'a Entry> {
    let mut found = BTreeMap::new();
    for entry in entries {
        found.entry(entry.sub_key.clone()).or_insert(entry);
    }
    found
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::ledger::{AccountKind, NewEntry, Recalculate};

    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn stocks() -> Ledger {
        let mut ledger = Ledger::new(Uuid::new_v4(), "Brokerage", AccountKind::Stock);
        for (day, ticker, change) in [
            (1, "AAPL", dec!(10)),
            (2, "MSFT", dec!(3)),
            (3, "AAPL", dec!(-4)),
            (4, "MSFT", dec!(2)),
        ] {
            let entry = NewEntry::new(at(day, 9), change).with_sub_key(SubKey::keyed(ticker));
            ledger.insert(entry, Recalculate::Now).unwrap();
        }
        ledger
    }

    #[test]
    fn range_is_inclusive_and_newest_first() {
        let ledger = stocks();
        let days: Vec<u32> = ledger
            .range(at(2, 9), at(3, 9))
            .iter()
            .map(|entry| entry.posting_date.day())
            .collect();
        assert_eq!(days, vec![3, 2]);
    }

    #[test]
    fn on_day_ignores_time_of_day() {
        let ledger = stocks();
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(ledger.on_day(day).len(), 1);
        assert!(ledger.at(at(4, 10)).is_empty());
    }

    #[test]
    fn per_key_neighbours_skip_other_instruments() {
        let ledger = stocks();
        let older = ledger.next_older_per_key(at(4, 9));
        assert_eq!(older[&SubKey::keyed("AAPL")].value, dec!(6));
        assert_eq!(older[&SubKey::keyed("MSFT")].value, dec!(3));

        let younger = ledger.next_younger_per_key(at(1, 9));
        assert_eq!(younger.len(), 2);
        assert_eq!(younger[&SubKey::keyed("AAPL")].value_change, dec!(-4));
    }

    #[test]
    fn global_neighbours_are_strict() {
        let ledger = stocks();
        assert_eq!(ledger.next_older(at(2, 9)).unwrap().sub_key, SubKey::keyed("AAPL"));
        assert_eq!(ledger.next_younger(at(4, 9)), None);
        assert_eq!(ledger.balance(&SubKey::keyed("MSFT")), dec!(5));
    }

    #[test]
    fn youngest_in_outlives_the_key_it_was_asked_with() {
        let ledger = stocks();
        let newest = {
            let key = SubKey::keyed("AAPL");
            ledger.youngest_in(&key)
        };
        assert_eq!(newest.map(|entry| entry.value), Some(dec!(6)));
        assert!(ledger.youngest_in(&SubKey::keyed("VTI")).is_none());
    }
}
