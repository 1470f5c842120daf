//! Key-based duplicate document removal.
//!
//! A pass over one collection runs three steps per duplicate group:
//! - [`finder`]: group documents by key value, keep values shared by 2+ documents
//! - [`selector`]: pick the canonical document (highest `_id`)
//! - [`reconciler`]: delete every other member, one document at a time
//!
//! [`engine`] drives these steps across every configured scan pair.

pub mod engine;
pub mod finder;
pub mod reconciler;
pub mod selector;

use thiserror::Error;

use crate::store::StoreError;

pub use engine::{DedupEngine, EngineConfig, PairFailure, PairSummary, PassSummary};
pub use finder::find_duplicates;
pub use reconciler::{reconcile_group, DocumentError, GroupReport, ReconcileConfig};
pub use selector::{select_canonical, Selection};

/// Error type for group-level and pair-level failures.
///
/// Document-level problems are [`DocumentError`]s and never abort a group.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The grouping query for a pair could not be run.
    #[error("grouping '{collection}' by '{key}' failed: {source}")]
    GroupQuery {
        collection: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Looking up the canonical document failed.
    #[error("selecting canonical document for {key} = {value} failed: {source}")]
    Selection {
        key: String,
        value: String,
        #[source]
        source: StoreError,
    },

    /// The newest document of a group has an `_id` that is not an ObjectId.
    #[error("canonical document for {key} = {value} has no ObjectId _id")]
    InvalidCanonicalId { key: String, value: String },

    /// Listing the members of a group failed.
    #[error("listing documents for {key} = {value} failed: {source}")]
    GroupListing {
        key: String,
        value: String,
        #[source]
        source: StoreError,
    },
}
