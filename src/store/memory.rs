//! In-process document store.
//!
//! Behaves like a single MongoDB database for the operations the engine uses,
//! with hooks to inject failures. Results are snapshots taken when the query
//! starts, like a cursor over a collection that nobody else writes to.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mongodb::bson::{oid::ObjectId, Bson, Document};

use super::{DocumentStore, DuplicateKey, FindOrder, FindSpec, StoreError, StoreIter};

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeMap<String, Vec<Document>>,
    failing_groupings: HashSet<String>,
    failing_deletes: HashSet<ObjectId>,
    fail_listing: bool,
    delete_log: Vec<(String, ObjectId)>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

/// Resolve a dotted key path inside a document.
///
/// Returns `None` when any segment is missing or a non-document is traversed.
#[must_use]
pub fn lookup<'d>(doc: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

fn object_id(doc: &Document) -> Option<ObjectId> {
    doc.get_object_id("_id").ok()
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty collection if it does not exist yet.
    pub fn create_collection(&self, name: &str) {
        self.lock().collections.entry(name.to_string()).or_default();
    }

    /// Insert a document, assigning a fresh `_id` when it has none.
    ///
    /// Returns the document's `_id` if it is an `ObjectId`.
    pub fn insert(&self, collection: &str, mut doc: Document) -> Option<ObjectId> {
        if !doc.contains_key("_id") {
            doc.insert("_id", ObjectId::new());
        }
        let id = object_id(&doc);
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        id
    }

    /// Snapshot of a collection in insertion order.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.lock().collections.get(collection).map_or(0, Vec::len)
    }

    /// Make every grouping query on `collection` fail.
    pub fn fail_grouping(&self, collection: &str) {
        self.lock().failing_groupings.insert(collection.to_string());
    }

    /// Make deleting the document with `id` fail.
    pub fn fail_delete(&self, id: ObjectId) {
        self.lock().failing_deletes.insert(id);
    }

    /// Make listing collections fail.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    /// Every delete request received, in order, including ones that matched nothing.
    #[must_use]
    pub fn delete_log(&self) -> Vec<(String, ObjectId)> {
        self.lock().delete_log.clone()
    }
}

impl DocumentStore for MemoryStore {
    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        if inner.fail_listing {
            return Err(StoreError::Backend {
                operation: "listCollections",
                collection: String::new(),
                message: "listing disabled".to_string(),
            });
        }
        Ok(inner.collections.keys().cloned().collect())
    }

    fn duplicate_keys<'a>(
        &'a self,
        collection: &str,
        key: &str,
    ) -> Result<StoreIter<'a, DuplicateKey>, StoreError> {
        let inner = self.lock();
        if inner.failing_groupings.contains(collection) {
            return Err(StoreError::Backend {
                operation: "aggregate",
                collection: collection.to_string(),
                message: "injected grouping failure".to_string(),
            });
        }

        let mut groups: Vec<DuplicateKey> = Vec::new();
        for doc in inner.collections.get(collection).into_iter().flatten() {
            let value = match lookup(doc, key) {
                Some(Bson::Null) | None => continue,
                Some(value) => value,
            };
            match groups.iter_mut().find(|g| &g.value == value) {
                Some(group) => group.count += 1,
                None => groups.push(DuplicateKey {
                    value: value.clone(),
                    count: 1,
                }),
            }
        }
        groups.retain(|g| g.count > 1);

        Ok(Box::new(groups.into_iter().map(Ok)))
    }

    fn find_by_key<'a>(
        &'a self,
        collection: &str,
        key: &str,
        value: &Bson,
        spec: FindSpec,
    ) -> Result<StoreIter<'a, Document>, StoreError> {
        let inner = self.lock();
        let mut matches: Vec<Document> = inner
            .collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| lookup(doc, key) == Some(value))
            .cloned()
            .collect();

        if spec.order == FindOrder::NewestFirst {
            // Documents without an ObjectId sort last.
            matches.sort_by(|a, b| object_id(b).cmp(&object_id(a)));
        }
        if let Some(limit) = spec.limit.filter(|l| *l > 0) {
            matches.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(Box::new(matches.into_iter().map(Ok)))
    }

    fn delete_by_id(&self, collection: &str, id: &ObjectId) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        inner.delete_log.push((collection.to_string(), *id));
        if inner.failing_deletes.contains(id) {
            return Err(StoreError::Backend {
                operation: "deleteOne",
                collection: collection.to_string(),
                message: format!("injected delete failure for {id}"),
            });
        }

        let Some(docs) = inner.collections.get_mut(collection) else {
            return Ok(0);
        };
        match docs.iter().position(|doc| object_id(doc) == Some(*id)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
