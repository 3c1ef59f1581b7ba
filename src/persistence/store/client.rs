use std::collections::BTreeMap;
use async_trait::async_trait;
use serde_json::Value;

use crate::utils::IsTransient;

// ============================================================================
// Key-Value Store Seam
// ============================================================================
//
// The store is reached only through KeyValueStore. Items are JSON objects;
// the entity's canonical key lives under KEY_ATTRIBUTE. Write instructions
// carry a server-evaluated condition so that creates and updates can be
// rejected atomically by the store.
//
// ============================================================================

/// Serialized record as stored
pub type Item = serde_json::Map<String, Value>;

/// Attribute holding the canonical key of every stored entity
pub const KEY_ATTRIBUTE: &str = "id._key";

/// Attribute holding the entity version
pub const VERSION_ATTRIBUTE: &str = "version";

/// Maximum number of items in one store transaction
pub const MAX_ITEMS_PER_TRANSACTION: usize = 100;

pub mod reason_codes {
    pub const NONE: &str = "None";
    pub const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailed";
    pub const TRANSACTION_CONFLICT: &str = "TransactionConflict";
    pub const THROTTLING_ERROR: &str = "ThrottlingError";
    pub const VALIDATION_ERROR: &str = "ValidationError";
}

/// Build the single-attribute key item for a canonical key
pub fn key_item(key_name: &str, key: &str) -> Item {
    let mut item = Item::new();
    item.insert(key_name.to_string(), Value::String(key.to_string()));
    item
}

/// Precondition evaluated by the store before a write is applied
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// No record exists at the key
    AttributeNotExists { attribute: String },
    /// A record exists at the key
    AttributeExists { attribute: String },
    /// A record exists at the key and its version equals `expected`
    VersionEquals { key_attribute: String, expected: i64 },
}

impl Condition {
    pub fn expression(&self) -> String {
        match self {
            Condition::AttributeNotExists { .. } => "attribute_not_exists(#id)".to_string(),
            Condition::AttributeExists { .. } => "attribute_exists(#id)".to_string(),
            Condition::VersionEquals { .. } => {
                "attribute_exists(#id) AND #version = :expected_version".to_string()
            }
        }
    }

    pub fn attribute_names(&self) -> BTreeMap<String, String> {
        let mut names = BTreeMap::new();
        match self {
            Condition::AttributeNotExists { attribute } | Condition::AttributeExists { attribute } => {
                names.insert("#id".to_string(), attribute.clone());
            }
            Condition::VersionEquals { key_attribute, .. } => {
                names.insert("#id".to_string(), key_attribute.clone());
                names.insert("#version".to_string(), VERSION_ATTRIBUTE.to_string());
            }
        }
        names
    }

    pub fn attribute_values(&self) -> Item {
        let mut values = Item::new();
        if let Condition::VersionEquals { expected, .. } = self {
            values.insert(":expected_version".to_string(), Value::from(*expected));
        }
        values
    }

    /// Evaluate against the record currently stored at the key
    pub fn evaluate(&self, current: Option<&Item>) -> bool {
        match self {
            Condition::AttributeNotExists { attribute } => {
                current.map_or(true, |item| !item.contains_key(attribute))
            }
            Condition::AttributeExists { attribute } => {
                current.map_or(false, |item| item.contains_key(attribute))
            }
            Condition::VersionEquals { key_attribute, expected } => current.map_or(false, |item| {
                item.contains_key(key_attribute)
                    && item.get(VERSION_ATTRIBUTE).and_then(Value::as_i64) == Some(*expected)
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    None,
    AllOld,
}

/// Conditional create of a whole item
#[derive(Debug, Clone, PartialEq)]
pub struct PutRequest {
    pub table_name: String,
    pub key_name: String,
    pub item: Item,
    pub condition: Condition,
    pub return_values_on_condition_check_failure: ReturnValue,
}

/// Field-level update of an existing item
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub table_name: String,
    pub key_name: String,
    pub key: Item,
    /// "SET #a = :a, #b = :b"
    pub update_expression: String,
    pub expression_attribute_names: BTreeMap<String, String>,
    pub expression_attribute_values: Item,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactWriteItem {
    Put(PutRequest),
    Update(UpdateRequest),
}

impl TransactWriteItem {
    pub fn table_name(&self) -> &str {
        match self {
            TransactWriteItem::Put(put) => &put.table_name,
            TransactWriteItem::Update(update) => &update.table_name,
        }
    }

    /// Canonical key targeted by this write, if present
    pub fn key(&self) -> Option<&str> {
        match self {
            TransactWriteItem::Put(put) => put.item.get(&put.key_name).and_then(Value::as_str),
            TransactWriteItem::Update(update) => {
                update.key.get(&update.key_name).and_then(Value::as_str)
            }
        }
    }

    pub fn condition(&self) -> &Condition {
        match self {
            TransactWriteItem::Put(put) => &put.condition,
            TransactWriteItem::Update(update) => &update.condition,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table_name: String,
    /// Attribute holding the key, used for the continuation token
    pub key_name: String,
    pub limit: usize,
    pub exclusive_start_key: Option<Item>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutput {
    pub items: Vec<Item>,
    /// Continuation token; None once the table is exhausted
    pub last_evaluated_key: Option<Item>,
}

/// Per-item outcome reported with a cancelled transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationReason {
    pub code: String,
    pub message: Option<String>,
    /// Prior item, returned when the write asked for ALL_OLD
    pub item: Option<Item>,
}

impl CancellationReason {
    pub fn none() -> Self {
        Self {
            code: reason_codes::NONE.to_string(),
            message: None,
            item: None,
        }
    }
}

fn join_reasons(reasons: &[CancellationReason]) -> String {
    reasons
        .iter()
        .filter_map(|reason| reason.message.as_deref())
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Transaction cancelled: {}", join_reasons(.reasons))]
    TransactionCanceled { reasons: Vec<CancellationReason> },

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl StoreError {
    /// Concatenated per-item rejection messages
    pub fn reasons_message(&self) -> String {
        match self {
            StoreError::TransactionCanceled { reasons } => join_reasons(reasons),
            other => other.to_string(),
        }
    }

    pub fn is_condition_failure(&self) -> bool {
        match self {
            StoreError::TransactionCanceled { reasons } => reasons
                .iter()
                .any(|reason| reason.code == reason_codes::CONDITIONAL_CHECK_FAILED),
            _ => false,
        }
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::TransactionCanceled { reasons } => !reasons.iter().any(|reason| {
                reason.code == reason_codes::CONDITIONAL_CHECK_FAILED
                    || reason.code == reason_codes::VALIDATION_ERROR
            }),
            StoreError::Throttled(_) | StoreError::Unavailable(_) => true,
            StoreError::Validation(_) => false,
        }
    }
}

/// Point reads, paginated scans and all-or-nothing multi-item writes
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>, StoreError>;

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, StoreError>;

    async fn transact_write_items(&self, items: &[TransactWriteItem]) -> Result<(), StoreError>;
}
