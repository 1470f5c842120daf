use std::cell::Cell;

use docdedup::config::ScanPair;
use docdedup::dedup::{reconcile_group, DedupEngine, DedupError, DocumentError, ReconcileConfig};
use docdedup::store::{
    DocumentStore, DuplicateKey, FindSpec, MemoryStore, StoreError, StoreIter,
};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};

use super::common::{ids, insert_bot, oid};

/// Removes one document behind the engine's back right after a group's
/// members have been listed, like a concurrent writer would.
struct RacingStore {
    inner: MemoryStore,
    victim: Cell<Option<ObjectId>>,
}

impl DocumentStore for RacingStore {
    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        self.inner.collection_names()
    }

    fn duplicate_keys<'a>(
        &'a self,
        collection: &str,
        key: &str,
    ) -> Result<StoreIter<'a, DuplicateKey>, StoreError> {
        self.inner.duplicate_keys(collection, key)
    }

    fn find_by_key<'a>(
        &'a self,
        collection: &str,
        key: &str,
        value: &Bson,
        spec: FindSpec,
    ) -> Result<StoreIter<'a, Document>, StoreError> {
        let members = self.inner.find_by_key(collection, key, value, spec)?;
        if spec.limit.is_none() {
            if let Some(victim) = self.victim.take() {
                self.inner.delete_by_id(collection, &victim)?;
            }
        }
        Ok(members)
    }

    fn delete_by_id(&self, collection: &str, id: &ObjectId) -> Result<u64, StoreError> {
        self.inner.delete_by_id(collection, id)
    }
}

fn x() -> Bson {
    Bson::String("x".into())
}

#[test]
fn test_failing_pair_does_not_stop_later_pairs() {
    let store = MemoryStore::new();
    store.insert("users", doc! { "_id": oid(1), "email": "a@b.c" });
    store.insert("users", doc! { "_id": oid(2), "email": "a@b.c" });
    insert_bot(&store, 3, "x");
    insert_bot(&store, 4, "x");
    store.fail_grouping("users");

    let engine = DedupEngine::new(
        &store,
        vec![ScanPair::new("users", "email"), ScanPair::new("bots", "botID")],
    );
    let summary = engine.run_pass();

    assert_eq!(summary.failed_pairs.len(), 1);
    let failure = &summary.failed_pairs[0];
    assert_eq!(failure.pair, ScanPair::new("users", "email"));
    assert!(matches!(
        &failure.error,
        DedupError::GroupQuery { collection, .. } if collection == "users"
    ));

    assert_eq!(summary.pairs.len(), 1);
    assert_eq!(summary.removed(), 1);
    assert_eq!(store.count("users"), 2);
    assert_eq!(ids(&store, "bots"), vec![oid(4)]);
}

#[test]
fn test_failing_delete_is_recorded_and_group_continues() {
    let store = MemoryStore::new();
    for n in 1..=4 {
        insert_bot(&store, n, "x");
    }
    store.fail_delete(oid(2));

    let summary = DedupEngine::new(&store, vec![ScanPair::new("bots", "botID")]).run_pass();

    assert_eq!(summary.removed(), 2);
    assert_eq!(summary.document_errors(), 1);
    assert_eq!(ids(&store, "bots"), vec![oid(2), oid(4)]);
}

#[test]
fn test_delete_error_carries_document_id() {
    let store = MemoryStore::new();
    insert_bot(&store, 1, "x");
    insert_bot(&store, 2, "x");
    store.fail_delete(oid(1));

    let report =
        reconcile_group(&store, "bots", "botID", &x(), &oid(2), &ReconcileConfig::default())
            .unwrap();

    assert_eq!(report.removed, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        &report.errors[0],
        DocumentError::Delete { id, source: StoreError::Backend { .. } } if *id == oid(1)
    ));
    assert!(report.summary().contains("1 failed"));
}

#[test]
fn test_member_without_object_id_is_skipped() {
    let store = MemoryStore::new();
    store.insert("bots", doc! { "_id": "legacy", "botID": "x" });
    insert_bot(&store, 1, "x");
    insert_bot(&store, 2, "x");

    let summary = DedupEngine::new(&store, vec![ScanPair::new("bots", "botID")]).run_pass();

    assert_eq!(summary.removed(), 1);
    assert_eq!(summary.document_errors(), 1);
    assert_eq!(store.count("bots"), 2);
    let object_ids: Vec<ObjectId> = store
        .documents("bots")
        .iter()
        .filter_map(|d| d.get_object_id("_id").ok())
        .collect();
    assert_eq!(object_ids, vec![oid(2)]);
}

#[test]
fn test_concurrently_deleted_member_counts_as_missing() {
    let store = RacingStore {
        inner: MemoryStore::new(),
        victim: Cell::new(Some(oid(1))),
    };
    for n in 1..=3 {
        insert_bot(&store.inner, n, "x");
    }

    let summary = DedupEngine::new(&store, vec![ScanPair::new("bots", "botID")]).run_pass();

    let pair = &summary.pairs[0];
    assert_eq!(pair.removed, 1);
    assert_eq!(pair.missing, 1);
    assert_eq!(pair.document_errors, 0);
    assert_eq!(ids(&store.inner, "bots"), vec![oid(3)]);
}
