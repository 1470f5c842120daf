//! Duplicate group discovery.
//!
//! Groups every document of a collection by the configured key, counts the
//! members, and keeps the non-null values shared by more than one document.
//! On MongoDB this is a three stage aggregation:
//!
//! ```text
//! { $group:   { _id: "$<key>", count: { $sum: 1 } } }
//! { $match:   { _id: { $ne: null }, count: { $gt: 1 } } }
//! { $project: { _id: 0, value: "$_id", count: 1 } }
//! ```
//!
//! Missing fields group under `null`, so the `$match` stage drops them along
//! with explicit nulls. The order of the resulting groups is whatever the
//! server produces.

use mongodb::bson::{doc, Bson, Document};

use super::DedupError;
use crate::config::ScanPair;
use crate::store::{DocumentStore, DuplicateKey, StoreIter};

/// Field of a projected row holding the shared key value.
pub const VALUE_FIELD: &str = "value";
/// Field of a projected row holding the member count.
pub const COUNT_FIELD: &str = "count";

/// Aggregation pipeline yielding one row per duplicated key value.
#[must_use]
pub fn pipeline(key: &str) -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": format!("${key}"), COUNT_FIELD: { "$sum": 1 } } },
        doc! { "$match": { "_id": { "$ne": Bson::Null }, COUNT_FIELD: { "$gt": 1 } } },
        doc! { "$project": { "_id": 0, VALUE_FIELD: "$_id", COUNT_FIELD: 1 } },
    ]
}

/// Interpret one projected aggregation row.
///
/// # Errors
///
/// Returns a message describing the problem if the row has no usable value
/// or count.
pub fn parse_row(row: &Document) -> Result<DuplicateKey, String> {
    let value = match row.get(VALUE_FIELD) {
        None | Some(Bson::Null) => return Err(format!("row without key value: {row}")),
        Some(value) => value.clone(),
    };
    let count = match row.get(COUNT_FIELD) {
        Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
        Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
        _ => None,
    }
    .ok_or_else(|| format!("row without valid count: {row}"))?;

    Ok(DuplicateKey { value, count })
}

/// Start the duplicate search for one scan pair.
///
/// # Errors
///
/// Returns [`DedupError::GroupQuery`] when the grouping query cannot be
/// executed; the caller skips the pair for this pass.
pub fn find_duplicates<'a, S: DocumentStore>(
    store: &'a S,
    pair: &ScanPair,
) -> Result<StoreIter<'a, DuplicateKey>, DedupError> {
    log::info!("Validating collection {} by {}", pair.collection, pair.key);
    store
        .duplicate_keys(&pair.collection, &pair.key)
        .map_err(|source| DedupError::GroupQuery {
            collection: pair.collection.clone(),
            key: pair.key.clone(),
            source,
        })
}
