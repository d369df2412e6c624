//! Filter callbacks and the per-path registries that hold them.
//!
//! Every watched path owns one [`FilterRegistry`] guarded by its own
//! reader-writer lock. The feed worker only holds the read lock long enough to
//! copy the callback list, so callbacks are free to subscribe or unsubscribe.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mongodb::bson::Bson;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::event::{Change, OpType};
use crate::path::PathKey;

/// Value handed to a filter alongside the operation type.
#[derive(Clone, Copy)]
pub enum Payload<'a> {
    /// Decoded full document of an insert, update or replace.
    Document(&'a (dyn Any + Send + Sync)),
    /// `_id` of a deleted document.
    Key(&'a Bson),
}

impl<'a> Payload<'a> {
    /// Returns the decoded document if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        match *self {
            Self::Document(doc) => doc.downcast_ref::<T>(),
            Self::Key(_) => None,
        }
    }

    /// Returns the deleted document's identifier.
    pub fn key(&self) -> Option<&'a Bson> {
        match *self {
            Self::Key(key) => Some(key),
            Self::Document(_) => None,
        }
    }
}

impl fmt::Debug for Payload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(_) => f.write_str("Document(..)"),
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
        }
    }
}

/// Type alias for a filter callback.
///
/// Callbacks run synchronously on the feed worker; a slow callback delays
/// delivery for every watched collection.
pub type FilterFn = Arc<dyn Fn(OpType, Payload<'_>, &Change) + Send + Sync>;

/// Describes one callback to register for a `(db, coll)` pair.
#[derive(Clone)]
pub struct Filter {
    pub db: String,
    pub coll: String,
    pub callback: FilterFn,
}

impl Filter {
    /// Creates a filter descriptor for `callback` on `db.coll`.
    ///
    /// # Arguments
    ///
    /// * `db` - The database name.
    /// * `coll` - The collection name.
    /// * `callback` - Invoked with the operation, payload and raw change.
    pub fn new<F>(db: impl Into<String>, coll: impl Into<String>, callback: F) -> Self
    where
        F: Fn(OpType, Payload<'_>, &Change) + Send + Sync + 'static,
    {
        Self {
            db: db.into(),
            coll: coll.into(),
            callback: Arc::new(callback),
        }
    }

    /// The path key this filter targets.
    pub fn path(&self) -> PathKey {
        PathKey::new(&self.db, &self.coll)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("db", &self.db)
            .field("coll", &self.coll)
            .finish_non_exhaustive()
    }
}

/// Unique identifier of one registered filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterId(String);

impl FilterId {
    /// Generates a fresh random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Concurrency-safe map of filter id to callback for one watched path.
#[derive(Default)]
pub struct FilterRegistry {
    filters: RwLock<HashMap<FilterId, FilterFn>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `id`, replacing any previous entry.
    pub fn insert(&self, id: FilterId, callback: FilterFn) {
        self.filters.write().insert(id, callback);
    }

    /// Removes every given id under a single write lock.
    pub fn remove_all<'a>(&self, ids: impl IntoIterator<Item = &'a FilterId>) -> usize {
        let mut filters = self.filters.write();
        ids.into_iter()
            .filter(|id| filters.remove(*id).is_some())
            .count()
    }

    /// Copies the current callbacks; the lock is released before returning.
    pub fn snapshot(&self) -> Vec<FilterFn> {
        self.filters.read().values().cloned().collect()
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> FilterFn {
        let counter = Arc::clone(counter);
        Arc::new(move |_: OpType, _: Payload<'_>, _: &Change| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = FilterId::generate();
        let b = FilterId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_insert_snapshot_remove() {
        let registry = FilterRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let first = FilterId::generate();
        let second = FilterId::generate();

        registry.insert(first.clone(), counting(&counter));
        registry.insert(second.clone(), counting(&counter));
        assert_eq!(registry.len(), 2);

        let change = Change::default();
        let key = Bson::Int32(1);
        for filter in registry.snapshot() {
            filter(OpType::Delete, Payload::Key(&key), &change);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        assert_eq!(registry.remove_all([&first]), 1);
        assert_eq!(registry.remove_all([&first]), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove_all([&second]), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_callback_may_mutate_registry() {
        let registry = Arc::new(FilterRegistry::new());
        let id = FilterId::generate();

        let inner = Arc::clone(&registry);
        let removed = id.clone();
        registry.insert(
            id,
            Arc::new(move |_: OpType, _: Payload<'_>, _: &Change| {
                inner.remove_all([&removed]);
            }),
        );

        let change = Change::default();
        let key = Bson::Null;
        for filter in registry.snapshot() {
            filter(OpType::Delete, Payload::Key(&key), &change);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_payload_accessors() {
        let key = Bson::Int32(1);
        let payload = Payload::Key(&key);
        assert_eq!(payload.key(), Some(&Bson::Int32(1)));
        assert!(payload.downcast_ref::<String>().is_none());

        let doc: Box<dyn Any + Send + Sync> = Box::new(String::from("a"));
        let payload = Payload::Document(doc.as_ref());
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("a"));
        assert!(payload.downcast_ref::<i32>().is_none());
        assert!(payload.key().is_none());
    }
}
