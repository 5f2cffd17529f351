//! In-memory tables
//!
//! Back the store traits when no database is configured (development mode and
//! tests). A table is a `BTreeMap` keyed by id behind a `parking_lot` lock, so
//! iteration order is insertion order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use erp_core::{Id, Identifiable, Timestamped};
use erp_models::NewRecord;
use parking_lot::RwLock;

use crate::repository::{paginate, Repository, RepositoryError, RepositoryResult};

pub struct MemoryTable<T> {
    name: &'static str,
    rows: RwLock<BTreeMap<Id, T>>,
    next_id: AtomicI64,
}

impl<T> MemoryTable<T>
where
    T: Identifiable + Timestamped + Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert a record built from the next id
    pub fn insert_with(&self, build: impl FnOnce(Id) -> T) -> T {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = build(id);
        self.rows.write().insert(id, record.clone());
        record
    }

    /// Insert unless a row already matches `conflict` (a unique-index stand-in)
    pub fn insert_unless(
        &self,
        conflict: impl Fn(&T) -> bool,
        build: impl FnOnce(Id) -> T,
    ) -> Option<T> {
        let mut rows = self.rows.write();
        if rows.values().any(|row| conflict(row)) {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = build(id);
        rows.insert(id, record.clone());
        Some(record)
    }

    pub fn get(&self, id: Id) -> Option<T> {
        self.rows.read().get(&id).cloned()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.rows.read().contains_key(&id)
    }

    /// Matching rows in id order
    pub fn select(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect()
    }

    pub fn find_first(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.rows.read().values().find(|row| predicate(row)).cloned()
    }

    pub fn count_where(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.rows.read().values().filter(|row| predicate(row)).count()
    }

    /// Apply `f` to one row and touch it; `None` when the id is unknown
    pub fn modify<R>(&self, id: Id, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&id)?;
        let out = f(row);
        row.touch(Utc::now());
        Some(out)
    }

    /// Apply `f` to every row it reports a change for; returns the change count
    pub fn modify_where(&self, mut f: impl FnMut(&mut T) -> bool) -> usize {
        let now = Utc::now();
        let mut changed = 0;
        for row in self.rows.write().values_mut() {
            if f(row) {
                row.touch(now);
                changed += 1;
            }
        }
        changed
    }

    pub fn replace(&self, id: Id, mut record: T) -> Option<T> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&id) {
            return None;
        }
        record.touch(Utc::now());
        rows.insert(id, record.clone());
        Some(record)
    }

    pub fn remove(&self, id: Id) -> Option<T> {
        self.rows.write().remove(&id)
    }

    pub fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> usize {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, row| !predicate(row));
        before - rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<T, C> Repository<T, C, T> for MemoryTable<T>
where
    T: Identifiable + Timestamped + Clone + Send + Sync + 'static,
    C: NewRecord<T> + Send + 'static,
{
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<T>> {
        Ok(self.get(id))
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<T>> {
        Ok(paginate(self.select(|_| true), limit, offset))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.len() as i64)
    }

    async fn create(&self, dto: C) -> RepositoryResult<T> {
        let now = Utc::now();
        Ok(self.insert_with(|id| dto.into_record(id, now)))
    }

    async fn update(&self, id: Id, dto: T) -> RepositoryResult<T> {
        self.replace(id, dto)
            .ok_or_else(|| RepositoryError::not_found(self.name, id))
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        self.remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(self.name, id))
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        Ok(self.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erp_models::{NewNotification, Notification, NotificationKind};

    fn table() -> MemoryTable<Notification> {
        MemoryTable::new("Notification")
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let table = table();
        let a: Notification = table
            .create(NewNotification::new(1, NotificationKind::Info, "a", "a"))
            .await
            .unwrap();
        let b: Notification = table
            .create(NewNotification::new(1, NotificationKind::Info, "b", "b"))
            .await
            .unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let table = table();
        let n = NewNotification::new(1, NotificationKind::Info, "a", "a").into_record(9, Utc::now());

        let err = Repository::<Notification, NewNotification, Notification>::update(&table, 9, n)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));

        let err = Repository::<Notification, NewNotification, Notification>::delete(&table, 9)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[test]
    fn test_modify_where_counts_changes() {
        let table = table();
        for user in [1, 1, 2] {
            table.insert_with(|id| {
                NewNotification::new(user, NotificationKind::Info, "t", "m").into_record(id, Utc::now())
            });
        }

        let changed = table.modify_where(|n| {
            if n.user_id == 1 && !n.read {
                n.read = true;
                true
            } else {
                false
            }
        });
        assert_eq!(changed, 2);
        assert_eq!(table.count_where(|n| n.read), 2);
    }
}
