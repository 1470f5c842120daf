//! MongoDB-backed document store using the driver's blocking API.

use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, Collection, Database};

use super::{DocumentStore, DuplicateKey, FindOrder, FindSpec, StoreError, StoreIter};
use crate::dedup::finder;

/// A connected MongoDB database.
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Create a client for `uri` and select database `db_name`.
    ///
    /// The driver connects lazily, so an unreachable server is only detected
    /// by the first operation. Call [`DocumentStore::collection_names`] right
    /// after connecting to surface connectivity problems at startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connect`] if the connection string is invalid.
    pub fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).map_err(|source| StoreError::Connect {
            uri: crate::config::redact_uri(uri),
            source,
        })?;
        log::debug!("MongoDB client created, using database '{}'", db_name);
        Ok(Self {
            db: client.database(db_name),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

/// Equality filter on `key`.
///
/// `$eq` keeps regex and document values from being interpreted as query
/// operators.
pub(crate) fn key_filter(key: &str, value: &Bson) -> Document {
    let mut filter = Document::new();
    filter.insert(key, doc! { "$eq": value.clone() });
    filter
}

fn find_options(spec: FindSpec) -> FindOptions {
    let mut options = FindOptions::default();
    if spec.order == FindOrder::NewestFirst {
        options.sort = Some(doc! { "_id": -1 });
    }
    options.limit = spec.limit;
    options
}

impl DocumentStore for MongoStore {
    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        self.db
            .list_collection_names(None)
            .map_err(|source| StoreError::Driver {
                operation: "listCollections",
                collection: self.db.name().to_string(),
                source,
            })
    }

    fn duplicate_keys<'a>(
        &'a self,
        collection: &str,
        key: &str,
    ) -> Result<StoreIter<'a, DuplicateKey>, StoreError> {
        let cursor = self
            .collection(collection)
            .aggregate(finder::pipeline(key), None)
            .map_err(|source| StoreError::Driver {
                operation: "aggregate",
                collection: collection.to_string(),
                source,
            })?;

        let collection = collection.to_string();
        Ok(Box::new(cursor.map(move |row| {
            let row = row.map_err(|source| StoreError::Driver {
                operation: "aggregate",
                collection: collection.clone(),
                source,
            })?;
            finder::parse_row(&row).map_err(|message| StoreError::Decode {
                collection: collection.clone(),
                message,
            })
        })))
    }

    fn find_by_key<'a>(
        &'a self,
        collection: &str,
        key: &str,
        value: &Bson,
        spec: FindSpec,
    ) -> Result<StoreIter<'a, Document>, StoreError> {
        let cursor = self
            .collection(collection)
            .find(key_filter(key, value), find_options(spec))
            .map_err(|source| StoreError::Driver {
                operation: "find",
                collection: collection.to_string(),
                source,
            })?;

        let collection = collection.to_string();
        Ok(Box::new(cursor.map(move |item| {
            item.map_err(|source| StoreError::Driver {
                operation: "find",
                collection: collection.clone(),
                source,
            })
        })))
    }

    fn delete_by_id(&self, collection: &str, id: &ObjectId) -> Result<u64, StoreError> {
        self.collection(collection)
            .delete_one(doc! { "_id": *id }, None)
            .map(|result| result.deleted_count)
            .map_err(|source| StoreError::Driver {
                operation: "deleteOne",
                collection: collection.to_string(),
                source,
            })
    }
}
