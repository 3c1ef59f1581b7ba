mod client;
mod memory;

pub use client::{
    key_item, reason_codes, CancellationReason, Condition, Item, KeyValueStore, PutRequest,
    ReturnValue, ScanOutput, ScanRequest, StoreError, TransactWriteItem, UpdateRequest,
    KEY_ATTRIBUTE, MAX_ITEMS_PER_TRANSACTION, VERSION_ATTRIBUTE,
};
pub use memory::InMemoryStore;
