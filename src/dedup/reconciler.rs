//! Group reconciliation: delete every member of a duplicate group except the
//! canonical document.
//!
//! Deletions are issued one document at a time so that every outcome is
//! visible on its own: a document that is already gone is counted as missing,
//! a failed delete is recorded and the remaining members are still processed.
//!
//! # Example
//!
//! ```
//! use docdedup::dedup::{reconcile_group, ReconcileConfig};
//! use docdedup::store::MemoryStore;
//! use mongodb::bson::{doc, Bson};
//!
//! let store = MemoryStore::new();
//! store.insert("bots", doc! { "botID": "x" });
//! let keep = store.insert("bots", doc! { "botID": "x" }).unwrap();
//!
//! let value = Bson::String("x".into());
//! let report = reconcile_group(&store, "bots", "botID", &value, &keep, &ReconcileConfig::default())
//!     .unwrap();
//! assert_eq!(report.removed, 1);
//! assert_eq!(store.count("bots"), 1);
//! ```

use mongodb::bson::{oid::ObjectId, Bson, Document};
use thiserror::Error;

use super::DedupError;
use crate::store::{DocumentStore, FindSpec, StoreError};

/// A problem with a single group member. Never aborts the group.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The member could not be read from the cursor.
    #[error("failed to read document: {0}")]
    Read(#[source] StoreError),

    /// The member has no `_id` field.
    #[error("document has no _id")]
    MissingId,

    /// The member's `_id` is not an ObjectId.
    #[error("document _id {found} is not an ObjectId")]
    InvalidId { found: String },

    /// The delete request failed.
    #[error("failed to delete {id}: {source}")]
    Delete {
        id: ObjectId,
        #[source]
        source: StoreError,
    },
}

/// Configuration for group reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ReconcileConfig {
    /// Count the documents that would be deleted without deleting them.
    pub dry_run: bool,
}

impl ReconcileConfig {
    /// Enable/disable dry run.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Result of reconciling one duplicate group.
#[derive(Debug)]
pub struct GroupReport {
    /// Collection the group lives in.
    pub collection: String,
    /// Shared key value.
    pub value: Bson,
    /// The retained document.
    pub canonical: ObjectId,
    /// Number of canonical documents seen while iterating (normally 1).
    pub retained: usize,
    /// Duplicates deleted (or, in dry run, that would have been deleted).
    pub removed: usize,
    /// Duplicates whose delete matched nothing because they were already gone.
    pub missing: usize,
    /// Per-document failures.
    pub errors: Vec<DocumentError>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl GroupReport {
    fn new(collection: &str, value: &Bson, canonical: ObjectId, dry_run: bool) -> Self {
        Self {
            collection: collection.to_string(),
            value: value.clone(),
            canonical,
            retained: 0,
            removed: 0,
            missing: 0,
            errors: Vec::new(),
            dry_run,
        }
    }

    /// Check if every member was handled without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable summary of the group.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "Would remove" } else { "Removed" };
        let mut line = format!(
            "{} {} duplicates from {} with id {}",
            verb, self.removed, self.collection, self.value
        );
        if self.missing > 0 {
            line.push_str(&format!(", {} already gone", self.missing));
        }
        if !self.errors.is_empty() {
            line.push_str(&format!(", {} failed", self.errors.len()));
        }
        line
    }
}

fn member_id(doc: &Document) -> Result<ObjectId, DocumentError> {
    match doc.get("_id") {
        None => Err(DocumentError::MissingId),
        Some(Bson::ObjectId(id)) => Ok(*id),
        Some(other) => Err(DocumentError::InvalidId {
            found: other.to_string(),
        }),
    }
}

/// Delete every document with `key == value` except `canonical`.
///
/// # Errors
///
/// Returns [`DedupError::GroupListing`] only when the member listing cannot
/// be started. Failures on individual members end up in
/// [`GroupReport::errors`].
pub fn reconcile_group<S: DocumentStore>(
    store: &S,
    collection: &str,
    key: &str,
    value: &Bson,
    canonical: &ObjectId,
    config: &ReconcileConfig,
) -> Result<GroupReport, DedupError> {
    let members = store
        .find_by_key(collection, key, value, FindSpec::all())
        .map_err(|source| DedupError::GroupListing {
            key: key.to_string(),
            value: value.to_string(),
            source,
        })?;

    let mut report = GroupReport::new(collection, value, *canonical, config.dry_run);

    for member in members {
        let id = match member.map_err(DocumentError::Read).and_then(|doc| member_id(&doc)) {
            Ok(id) => id,
            Err(e) => {
                log::error!("Skipping member of {} = {} in {}: {}", key, value, collection, e);
                report.errors.push(e);
                continue;
            }
        };

        if id == *canonical {
            log::debug!("Retaining canonical document {}", id);
            report.retained += 1;
            continue;
        }

        if config.dry_run {
            log::info!("{} != {} | Would delete", id, canonical);
            report.removed += 1;
            continue;
        }

        log::debug!("{} != {} | Deleting", id, canonical);
        match store.delete_by_id(collection, &id) {
            Ok(0) => {
                log::warn!("Document {} in {} was already gone", id, collection);
                report.missing += 1;
            }
            Ok(_) => report.removed += 1,
            Err(source) => {
                let e = DocumentError::Delete { id, source };
                log::error!("{}", e);
                report.errors.push(e);
            }
        }
    }

    log::info!("{}", report.summary());
    Ok(report)
}
