use std::collections::{BTreeMap, HashMap, VecDeque};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::client::{
    reason_codes, CancellationReason, Item, KeyValueStore, PutRequest, ReturnValue, ScanOutput,
    ScanRequest, StoreError, TransactWriteItem, UpdateRequest,
};

// ============================================================================
// In-Memory Key-Value Store
// ============================================================================
//
// Behaves like the real store for everything the unit of work relies on:
// - Transactions are all-or-nothing; every condition is checked first
// - Failed conditions report ConditionalCheckFailed per item (ALL_OLD aware)
// - SET update expressions are evaluated against the stored item
// - Scans are ordered by key and paginated with a continuation token
//
// It also records every transaction call and can replay scripted failures.
//
// ============================================================================

type Table = BTreeMap<String, Item>;

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    write_calls: Mutex<Vec<Vec<TransactWriteItem>>>,
    scan_calls: Mutex<usize>,
    scripted_failures: Mutex<VecDeque<StoreError>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next transaction calls, one scripted error per call
    pub async fn fail_next_writes(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.scripted_failures.lock().await.extend(errors);
    }

    /// Every transact_write_items call received, failed ones included
    pub async fn write_calls(&self) -> Vec<Vec<TransactWriteItem>> {
        self.write_calls.lock().await.clone()
    }

    pub async fn scan_calls(&self) -> usize {
        *self.scan_calls.lock().await
    }

    /// Seed an item directly, bypassing conditions
    pub async fn insert_item(&self, table_name: &str, key_name: &str, item: Item) -> Result<(), StoreError> {
        let key = item_key(&item, key_name)?;
        self.tables
            .lock()
            .await
            .entry(table_name.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    pub async fn item_count(&self, table_name: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table_name)
            .map_or(0, BTreeMap::len)
    }
}

fn item_key(item: &Item, key_name: &str) -> Result<String, StoreError> {
    item.get(key_name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Validation(format!("missing key attribute '{}'", key_name)))
}

/// The value of a key item's single attribute
fn lookup_key(key: &Item) -> Result<String, StoreError> {
    let mut attributes = key.values();
    match (attributes.next(), attributes.next()) {
        (Some(Value::String(value)), None) => Ok(value.clone()),
        _ => Err(StoreError::Validation(
            "key must hold exactly one string attribute".to_string(),
        )),
    }
}

fn check_condition(tables: &HashMap<String, Table>, write: &TransactWriteItem) -> Result<CancellationReason, StoreError> {
    let key = write
        .key()
        .ok_or_else(|| StoreError::Validation("write without key attribute".to_string()))?;
    let current = tables.get(write.table_name()).and_then(|table| table.get(key));

    if write.condition().evaluate(current) {
        return Ok(CancellationReason::none());
    }

    let item = match write {
        TransactWriteItem::Put(PutRequest {
            return_values_on_condition_check_failure: ReturnValue::AllOld,
            ..
        }) => current.cloned(),
        _ => None,
    };

    Ok(CancellationReason {
        code: reason_codes::CONDITIONAL_CHECK_FAILED.to_string(),
        message: Some("The conditional request failed".to_string()),
        item,
    })
}

/// Resolve "SET #a = :a, #b = :b" into (attribute, value) assignments
fn parse_assignments(update: &UpdateRequest) -> Result<Vec<(String, Value)>, StoreError> {
    let body = update
        .update_expression
        .strip_prefix("SET ")
        .ok_or_else(|| StoreError::Validation("only SET update expressions are supported".to_string()))?;

    body.split(',')
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(|clause| {
            let (name, value) = clause
                .split_once('=')
                .ok_or_else(|| StoreError::Validation(format!("invalid clause '{}'", clause)))?;
            let attribute = update
                .expression_attribute_names
                .get(name.trim())
                .ok_or_else(|| StoreError::Validation(format!("unbound name '{}'", name.trim())))?;
            let value = update
                .expression_attribute_values
                .get(value.trim())
                .ok_or_else(|| StoreError::Validation(format!("unbound value '{}'", value.trim())))?;
            Ok((attribute.clone(), value.clone()))
        })
        .collect()
}

fn apply(tables: &mut HashMap<String, Table>, write: &TransactWriteItem) -> Result<(), StoreError> {
    match write {
        TransactWriteItem::Put(put) => {
            let key = item_key(&put.item, &put.key_name)?;
            tables
                .entry(put.table_name.clone())
                .or_default()
                .insert(key, put.item.clone());
        }
        TransactWriteItem::Update(update) => {
            let key = item_key(&update.key, &update.key_name)?;
            let assignments = parse_assignments(update)?;
            let item = tables
                .entry(update.table_name.clone())
                .or_default()
                .entry(key)
                .or_insert_with(|| update.key.clone());
            for (attribute, value) in assignments {
                item.insert(attribute, value);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>, StoreError> {
        let key = lookup_key(key)?;
        let tables = self.tables.lock().await;
        Ok(tables.get(table_name).and_then(|table| table.get(&key)).cloned())
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, StoreError> {
        if request.limit == 0 {
            return Err(StoreError::Validation("scan limit must be positive".to_string()));
        }
        *self.scan_calls.lock().await += 1;

        let start_after = request
            .exclusive_start_key
            .as_ref()
            .map(lookup_key)
            .transpose()?;

        let tables = self.tables.lock().await;
        let Some(table) = tables.get(&request.table_name) else {
            return Ok(ScanOutput::default());
        };

        let mut remaining = table
            .iter()
            .filter(|(key, _)| start_after.as_ref().map_or(true, |start| *key > start));

        let items: Vec<Item> = remaining
            .by_ref()
            .take(request.limit)
            .map(|(_, item)| item.clone())
            .collect();

        let last_evaluated_key = match (remaining.next(), items.last()) {
            (Some(_), Some(last)) => Some(super::client::key_item(
                &request.key_name,
                &item_key(last, &request.key_name)?,
            )),
            _ => None,
        };

        Ok(ScanOutput {
            items,
            last_evaluated_key,
        })
    }

    async fn transact_write_items(&self, items: &[TransactWriteItem]) -> Result<(), StoreError> {
        self.write_calls.lock().await.push(items.to_vec());

        if let Some(error) = self.scripted_failures.lock().await.pop_front() {
            return Err(error);
        }

        let mut tables = self.tables.lock().await;

        let reasons = items
            .iter()
            .map(|write| check_condition(&tables, write))
            .collect::<Result<Vec<_>, _>>()?;

        if reasons.iter().any(|reason| reason.code != reason_codes::NONE) {
            tracing::debug!(
                item_count = items.len(),
                "In-memory transaction cancelled by condition check"
            );
            return Err(StoreError::TransactionCanceled { reasons });
        }

        // Validate everything before mutating so a bad expression cannot half-apply
        let mut staged = tables.clone();
        for write in items {
            apply(&mut staged, write)?;
        }
        *tables = staged;

        Ok(())
    }
}
