//! In-memory marketplace storage.
//!
//! [`MarketStore`] keeps one [`Table`] per collection kind. Each table is a
//! `RwLock<BTreeMap<..>>`, so concurrent queries share the read lock and
//! writes to different collections never contend. Records come back by
//! value; callers never hold a table lock across an await.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use super::records::{Deal, Event, Listing, Org, Record, User};
use crate::error::GatewayError;

/// Storage for one record type.
#[derive(Debug)]
pub struct Table<R: Record> {
    rows: RwLock<BTreeMap<i64, R>>,
    last_id: AtomicI64,
}

impl<R: Record> Table<R> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            last_id: AtomicI64::new(0),
        }
    }

    /// Inserts `record` when its id is 0, otherwise replaces the stored
    /// record with the same id. Stamps the write time and returns the stored
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RecordNotFound`] when replacing an id that is
    /// not stored, and [`GatewayError::InvalidRequest`] for a negative id.
    pub async fn upsert(&self, mut record: R) -> Result<R, GatewayError> {
        let mut rows = self.rows.write().await;
        match record.id() {
            0 => record.assign_id(self.last_id.fetch_add(1, Ordering::Relaxed) + 1),
            id if id < 0 => {
                return Err(GatewayError::InvalidRequest(format!(
                    "{} id must be positive, got {id}",
                    R::KIND
                )));
            }
            id if !rows.contains_key(&id) => return Err(not_found::<R>(id)),
            _ => {}
        }
        record.stamp(Utc::now());
        rows.insert(record.id(), record.clone());
        Ok(record)
    }

    /// Applies `change` to a stored record, stamps it and returns the result.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RecordNotFound`] if `id` is not stored.
    pub async fn update<F>(&self, id: i64, change: F) -> Result<R, GatewayError>
    where
        F: FnOnce(&mut R),
    {
        let mut rows = self.rows.write().await;
        let record = rows.get_mut(&id).ok_or_else(|| not_found::<R>(id))?;
        change(record);
        record.assign_id(id);
        record.stamp(Utc::now());
        Ok(record.clone())
    }

    /// Returns a copy of the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RecordNotFound`] if `id` is not stored.
    pub async fn get(&self, id: i64) -> Result<R, GatewayError> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found::<R>(id))
    }

    /// Removes and returns the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RecordNotFound`] if `id` is not stored.
    pub async fn remove(&self, id: i64) -> Result<R, GatewayError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| not_found::<R>(id))
    }

    /// Returns copies of every record matching `predicate`, in id order.
    pub async fn select<P>(&self, predicate: P) -> Vec<R>
    where
        P: Fn(&R) -> bool,
    {
        self.rows
            .read()
            .await
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns `true` if the table is empty.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl<R: Record> Default for Table<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found<R: Record>(id: i64) -> GatewayError {
    GatewayError::RecordNotFound { kind: R::KIND, id }
}

/// All marketplace tables.
#[derive(Debug, Default)]
pub struct MarketStore {
    /// Organizations.
    pub orgs: Table<Org>,
    /// Users.
    pub users: Table<User>,
    /// Listings.
    pub listings: Table<Listing>,
    /// Deals.
    pub deals: Table<Deal>,
    /// Events.
    pub events: Table<Event>,
}

impl MarketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::CollectionKind;

    fn listing(id: i64, title: &str) -> Listing {
        let Ok(mut listing) = serde_json::from_value::<Listing>(serde_json::json!({})) else {
            panic!("empty listing should deserialize");
        };
        listing.id = id;
        listing.title = title.to_string();
        listing
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let table = Table::<Listing>::new();
        let Ok(a) = table.upsert(listing(0, "a")).await else {
            panic!("insert should succeed");
        };
        let Ok(b) = table.upsert(listing(0, "b")).await else {
            panic!("insert should succeed");
        };
        assert_eq!((a.id, b.id), (1, 2));
        assert!(a.updated_at.is_some());
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn replace_requires_existing_id() {
        let table = Table::<Listing>::new();
        let missing = table.upsert(listing(7, "ghost")).await;
        assert!(matches!(
            missing,
            Err(GatewayError::RecordNotFound {
                kind: CollectionKind::Listing,
                id: 7
            })
        ));

        let Ok(stored) = table.upsert(listing(0, "old")).await else {
            panic!("insert should succeed");
        };
        let Ok(replaced) = table.upsert(listing(stored.id, "new")).await else {
            panic!("replace should succeed");
        };
        assert_eq!(replaced.id, stored.id);
        let Ok(fetched) = table.get(stored.id).await else {
            panic!("record should exist");
        };
        assert_eq!(fetched.title, "new");
    }

    #[tokio::test]
    async fn negative_id_is_invalid() {
        let table = Table::<Listing>::new();
        let result = table.upsert(listing(-1, "bad")).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn update_changes_and_stamps() {
        let table = Table::<Listing>::new();
        let Ok(stored) = table.upsert(listing(0, "a")).await else {
            panic!("insert should succeed");
        };
        let Ok(updated) = table.update(stored.id, |l| l.make = "Boston Whaler".into()).await else {
            panic!("update should succeed");
        };
        assert_eq!(updated.make, "Boston Whaler");
        assert!(updated.updated_at >= stored.updated_at);
        assert!(table.update(99, |_| {}).await.is_err());
    }

    #[tokio::test]
    async fn select_and_remove() {
        let table = Table::<Listing>::new();
        for title in ["a", "b", "c"] {
            let _ = table.upsert(listing(0, title)).await;
        }
        let picked = table.select(|l| l.title != "b").await;
        assert_eq!(picked.iter().map(|l| l.id).collect::<Vec<_>>(), vec![1, 3]);

        assert!(table.remove(2).await.is_ok());
        assert!(table.remove(2).await.is_err());
        assert!(table.get(2).await.is_err());
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_remove() {
        let table = Table::<Listing>::new();
        let _ = table.upsert(listing(0, "a")).await;
        let _ = table.remove(1).await;
        let Ok(next) = table.upsert(listing(0, "b")).await else {
            panic!("insert should succeed");
        };
        assert_eq!(next.id, 2);
        assert!(!table.is_empty().await);
    }
}
