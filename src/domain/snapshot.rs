//! Query snapshots: collection kind → record id → record-or-null.
//!
//! Records are stored in their serialized form ([`serde_json::Value`]).
//! `serde_json` keeps object keys ordered, so two records compare equal
//! exactly when every field serializes to the same value. This is what the
//! differ relies on for deep equality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CollectionKind;
use super::records::Record;

/// Records of one collection keyed by id. `None` marks a deletion.
pub type RecordSet = BTreeMap<i64, Option<Value>>;

/// Full result of a query handler, or a patch between two such results.
///
/// A collection that is absent from the map is *not populated* by the query,
/// which differs from a populated but empty collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    collections: BTreeMap<CollectionKind, RecordSet>,
}

impl Snapshot {
    /// Creates a snapshot with no populated collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `kind` as populated, leaving existing records untouched.
    pub fn populate(&mut self, kind: CollectionKind) -> &mut RecordSet {
        self.collections.entry(kind).or_default()
    }

    /// Builds a snapshot populating `R::KIND` with `records`.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if a record cannot be serialized.
    pub fn of_records<'a, R, I>(records: I) -> Result<Self, serde_json::Error>
    where
        R: Record,
        I: IntoIterator<Item = &'a R>,
    {
        let mut snapshot = Self::new();
        snapshot.populate(R::KIND);
        for record in records {
            snapshot.insert_record(record)?;
        }
        Ok(snapshot)
    }

    /// Serializes `record` into its collection.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the record cannot be serialized.
    pub fn insert_record<R: Record>(&mut self, record: &R) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(record)?;
        self.populate(R::KIND).insert(record.id(), Some(value));
        Ok(())
    }

    /// Inserts a raw value (or a deletion marker) into a collection.
    pub fn insert_value(&mut self, kind: CollectionKind, id: i64, value: Option<Value>) {
        self.populate(kind).insert(id, value);
    }

    /// Returns the records of `kind`, or `None` if it is not populated.
    #[must_use]
    pub fn records(&self, kind: CollectionKind) -> Option<&RecordSet> {
        self.collections.get(&kind)
    }

    /// Returns `true` if `kind` is populated.
    #[must_use]
    pub fn is_populated(&self, kind: CollectionKind) -> bool {
        self.collections.contains_key(&kind)
    }

    /// Iterates over the populated kinds in ordinal order.
    pub fn kinds(&self) -> impl Iterator<Item = CollectionKind> + '_ {
        self.collections.keys().copied()
    }

    /// Returns `true` if no collection is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Total number of record entries across all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }
}
