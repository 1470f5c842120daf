use docdedup::config::ScanPair;
use docdedup::dedup::{find_duplicates, DedupEngine, EngineConfig};
use docdedup::store::MemoryStore;
use mongodb::bson::{doc, Bson};

use super::common::{ids, insert_bot, oid};

fn bots_engine(store: &MemoryStore) -> DedupEngine<&MemoryStore> {
    DedupEngine::new(store, vec![ScanPair::new("bots", "botID")])
}

#[test]
fn test_bots_scenario_deletes_only_oldest_duplicate() {
    let store = MemoryStore::new();
    insert_bot(&store, 1, "x");
    insert_bot(&store, 2, "y");
    insert_bot(&store, 3, "x");

    let summary = bots_engine(&store).run_pass();

    assert_eq!(summary.pairs.len(), 1);
    assert_eq!(summary.groups(), 1);
    assert_eq!(summary.removed(), 1);
    assert_eq!(ids(&store, "bots"), vec![oid(2), oid(3)]);
    assert_eq!(store.delete_log(), vec![("bots".to_string(), oid(1))]);
}

#[test]
fn test_null_and_missing_keys_are_never_grouped() {
    let store = MemoryStore::new();
    insert_bot(&store, 1, Bson::Null);
    insert_bot(&store, 2, Bson::Null);
    insert_bot(&store, 3, Bson::Null);
    store.insert("bots", doc! { "_id": oid(4), "name": "no key" });
    store.insert("bots", doc! { "_id": oid(5), "name": "no key either" });

    let pair = ScanPair::new("bots", "botID");
    let groups: Vec<_> = find_duplicates(&store, &pair).unwrap().collect();
    assert!(groups.is_empty());

    let summary = bots_engine(&store).run_pass();
    assert_eq!(summary.groups(), 0);
    assert_eq!(store.count("bots"), 5);
    assert!(store.delete_log().is_empty());
}

#[test]
fn test_survivor_is_highest_id_regardless_of_insert_order() {
    let store = MemoryStore::new();
    for n in [7, 2, 9, 4, 1] {
        insert_bot(&store, n, "x");
    }

    bots_engine(&store).run_pass();

    assert_eq!(ids(&store, "bots"), vec![oid(9)]);
}

#[test]
fn test_second_pass_is_a_no_op() {
    let store = MemoryStore::new();
    for n in 1..=4 {
        insert_bot(&store, n, "x");
    }
    insert_bot(&store, 5, "y");
    insert_bot(&store, 6, "y");

    let engine = bots_engine(&store);
    let first = engine.run_pass();
    assert_eq!(first.groups(), 2);
    assert_eq!(first.removed(), 4);
    let deletes_after_first = store.delete_log().len();

    let second = engine.run_pass();
    assert_eq!(second.groups(), 0);
    assert_eq!(second.removed(), 0);
    assert_eq!(store.delete_log().len(), deletes_after_first);
    assert_eq!(ids(&store, "bots"), vec![oid(4), oid(6)]);
}

#[test]
fn test_each_pair_uses_its_own_key() {
    let store = MemoryStore::new();
    insert_bot(&store, 1, "x");
    insert_bot(&store, 2, "x");
    store.insert("users", doc! { "_id": oid(3), "email": "a@b.c", "botID": "x" });
    store.insert("users", doc! { "_id": oid(4), "email": "d@e.f", "botID": "x" });
    store.insert("users", doc! { "_id": oid(5), "email": "a@b.c" });

    let engine = DedupEngine::new(
        &store,
        vec![ScanPair::new("bots", "botID"), ScanPair::new("users", "email")],
    );
    let summary = engine.run_pass();

    assert_eq!(summary.removed(), 2);
    assert_eq!(ids(&store, "bots"), vec![oid(2)]);
    assert_eq!(ids(&store, "users"), vec![oid(4), oid(5)]);
}

#[test]
fn test_dotted_key_path() {
    let store = MemoryStore::new();
    store.insert("bots", doc! { "_id": oid(1), "meta": { "owner": "ann" } });
    store.insert("bots", doc! { "_id": oid(2), "meta": { "owner": "ann" } });
    store.insert("bots", doc! { "_id": oid(3), "meta": { "owner": "bob" } });

    let engine = DedupEngine::new(&store, vec![ScanPair::new("bots", "meta.owner")]);
    let summary = engine.run_pass();

    assert_eq!(summary.removed(), 1);
    assert_eq!(ids(&store, "bots"), vec![oid(2), oid(3)]);
}

#[test]
fn test_non_string_key_values() {
    let store = MemoryStore::new();
    insert_bot(&store, 1, 42);
    insert_bot(&store, 2, 42);
    insert_bot(&store, 3, true);
    insert_bot(&store, 4, true);
    insert_bot(&store, 5, "42");

    let summary = bots_engine(&store).run_pass();

    assert_eq!(summary.groups(), 2);
    assert_eq!(ids(&store, "bots"), vec![oid(2), oid(4), oid(5)]);
}

#[test]
fn test_dry_run_deletes_nothing() {
    let store = MemoryStore::new();
    insert_bot(&store, 1, "x");
    insert_bot(&store, 2, "x");
    insert_bot(&store, 3, "x");

    let engine = DedupEngine::with_config(
        &store,
        vec![ScanPair::new("bots", "botID")],
        EngineConfig::default().with_dry_run(true),
    );
    let summary = engine.run_pass();

    assert_eq!(summary.groups(), 1);
    assert_eq!(summary.removed(), 2);
    assert_eq!(store.count("bots"), 3);
    assert!(store.delete_log().is_empty());
}

#[test]
fn test_missing_collection_is_empty_not_an_error() {
    let store = MemoryStore::new();
    let summary = bots_engine(&store).run_pass();

    assert!(summary.failed_pairs.is_empty());
    assert_eq!(summary.pairs.len(), 1);
    assert_eq!(summary.groups(), 0);
}
