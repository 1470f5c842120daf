//! Canonical document selection.
//!
//! The survivor of a duplicate group is the most recently created document,
//! i.e. the one with the highest ObjectId. It is found by sorting the group on
//! `_id` descending and taking the first result.

use mongodb::bson::{oid::ObjectId, Bson};

use super::DedupError;
use crate::store::{DocumentStore, FindSpec, StoreError};

/// Outcome of canonical selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The `_id` of the document to keep.
    Canonical(ObjectId),
    /// No document carries the key value anymore; skip the group this pass.
    Vanished,
}

/// Select the document to retain for `key == value` in `collection`.
///
/// # Errors
///
/// - [`DedupError::Selection`] if the lookup fails
/// - [`DedupError::InvalidCanonicalId`] if the newest document's `_id` is not an ObjectId
pub fn select_canonical<S: DocumentStore>(
    store: &S,
    collection: &str,
    key: &str,
    value: &Bson,
) -> Result<Selection, DedupError> {
    let selection_error = |source: StoreError| DedupError::Selection {
        key: key.to_string(),
        value: value.to_string(),
        source,
    };

    let mut newest = store
        .find_by_key(collection, key, value, FindSpec::newest())
        .map_err(selection_error)?;

    let doc = match newest.next() {
        None => return Ok(Selection::Vanished),
        Some(result) => result.map_err(selection_error)?,
    };

    let id = doc
        .get_object_id("_id")
        .map_err(|_| DedupError::InvalidCanonicalId {
            key: key.to_string(),
            value: value.to_string(),
        })?;

    log::debug!("Canonical document for {} = {} is {}", key, value, id);
    Ok(Selection::Canonical(id))
}
