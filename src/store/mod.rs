//! Document store abstraction.
//!
//! The deduplication engine never talks to a database driver directly. It is
//! handed something implementing [`DocumentStore`], which exposes exactly the
//! capabilities a pass needs:
//!
//! - a grouping query yielding duplicate key values ([`DocumentStore::duplicate_keys`])
//! - a filtered find with ordering and limit ([`DocumentStore::find_by_key`])
//! - a single-document delete by identifier ([`DocumentStore::delete_by_id`])
//!
//! Two implementations ship with the crate: [`MongoStore`] backed by the
//! MongoDB sync driver, and [`MemoryStore`], an in-process store with failure
//! injection used by the test suite.

pub mod memory;
pub mod mongo;

use mongodb::bson::{oid::ObjectId, Bson, Document};
use thiserror::Error;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Boxed, lazily evaluated sequence of fallible items returned by a store.
pub type StoreIter<'a, T> = Box<dyn Iterator<Item = Result<T, StoreError>> + 'a>;

/// Error type for document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached or the connection string was rejected.
    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: mongodb::error::Error,
    },

    /// A driver operation failed.
    #[error("{operation} on '{collection}' failed: {source}")]
    Driver {
        operation: &'static str,
        collection: String,
        #[source]
        source: mongodb::error::Error,
    },

    /// A backend without a driver error type reported a failure.
    #[error("{operation} on '{collection}' failed: {message}")]
    Backend {
        operation: &'static str,
        collection: String,
        message: String,
    },

    /// A returned row could not be interpreted.
    #[error("failed to decode result from '{collection}': {message}")]
    Decode { collection: String, message: String },
}

impl StoreError {
    /// Collection the failed operation targeted, if any.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::Driver { collection, .. }
            | Self::Backend { collection, .. }
            | Self::Decode { collection, .. } => Some(collection),
            Self::Connect { .. } => None,
        }
    }
}

/// A key value shared by more than one document in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateKey {
    /// The shared, non-null key value.
    pub value: Bson,
    /// Number of documents carrying this value.
    pub count: u64,
}

/// Ordering applied by [`DocumentStore::find_by_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindOrder {
    /// Whatever order the backend returns.
    #[default]
    Natural,
    /// Descending `_id`, so the most recently created document comes first.
    NewestFirst,
}

/// Options for [`DocumentStore::find_by_key`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindSpec {
    pub order: FindOrder,
    pub limit: Option<i64>,
}

impl FindSpec {
    /// Every matching document, unordered.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the newest matching document.
    #[must_use]
    pub fn newest() -> Self {
        Self {
            order: FindOrder::NewestFirst,
            limit: Some(1),
        }
    }
}

/// Capabilities the deduplication engine requires from a database.
///
/// All calls block the calling thread until they complete or fail.
pub trait DocumentStore {
    /// Names of the collections in the database.
    fn collection_names(&self) -> Result<Vec<String>, StoreError>;

    /// Key values shared by more than one document in `collection`.
    ///
    /// Null and missing key values are never yielded. The order of the
    /// sequence is unspecified and callers must not depend on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the grouping query cannot be started. Individual
    /// rows that fail to decode are yielded as `Err` items.
    fn duplicate_keys<'a>(
        &'a self,
        collection: &str,
        key: &str,
    ) -> Result<StoreIter<'a, DuplicateKey>, StoreError>;

    /// Documents in `collection` whose `key` equals `value`.
    fn find_by_key<'a>(
        &'a self,
        collection: &str,
        key: &str,
        value: &Bson,
        spec: FindSpec,
    ) -> Result<StoreIter<'a, Document>, StoreError>;

    /// Delete the document with `_id == id`.
    ///
    /// Returns the number of documents removed, which is `0` when the
    /// document no longer exists.
    fn delete_by_id(&self, collection: &str, id: &ObjectId) -> Result<u64, StoreError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        (**self).collection_names()
    }

    fn duplicate_keys<'a>(
        &'a self,
        collection: &str,
        key: &str,
    ) -> Result<StoreIter<'a, DuplicateKey>, StoreError> {
        (**self).duplicate_keys(collection, key)
    }

    fn find_by_key<'a>(
        &'a self,
        collection: &str,
        key: &str,
        value: &Bson,
        spec: FindSpec,
    ) -> Result<StoreIter<'a, Document>, StoreError> {
        (**self).find_by_key(collection, key, value, spec)
    }

    fn delete_by_id(&self, collection: &str, id: &ObjectId) -> Result<u64, StoreError> {
        (**self).delete_by_id(collection, id)
    }
}
