use docdedup::store::MemoryStore;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson};

/// An `ObjectId` whose ordering follows `n`.
pub fn oid(n: u8) -> ObjectId {
    let mut bytes = [0u8; 12];
    bytes[3] = n;
    ObjectId::from_bytes(bytes)
}

/// Insert a `bots` document with the given id and `botID`.
pub fn insert_bot(store: &MemoryStore, n: u8, bot_id: impl Into<Bson>) {
    let value: Bson = bot_id.into();
    store.insert("bots", doc! { "_id": oid(n), "botID": value });
}

/// Ids left in a collection, in insertion order.
pub fn ids(store: &MemoryStore, collection: &str) -> Vec<ObjectId> {
    store
        .documents(collection)
        .iter()
        .map(|d| d.get_object_id("_id").unwrap())
        .collect()
}
