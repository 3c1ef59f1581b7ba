use serde_json::Value;

use crate::persistence::core::{EntityId, KeyError, RootEntity};
use crate::persistence::store::{
    key_item, Condition, Item, PutRequest, ReturnValue, TransactWriteItem, UpdateRequest,
};

// ============================================================================
// Write Operations - Conditional Store Instructions
// ============================================================================
//
// A write operation is derived from a snapshot of one aggregate:
// - Create: put the whole item if nothing exists at the key
// - Update: SET the declared fields on the item that exists at the key
//
// The snapshot is a copy with its version already incremented, so the
// caller's aggregate is never touched by a commit that fails.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
}

impl WriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteKind::Create => "create",
            WriteKind::Update => "update",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteOperationError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Failed to serialize entity: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity must serialize to an object")]
    NotAnObject,

    #[error("Updatable field '{0}' is missing from the serialized entity")]
    UnknownField(String),
}

/// How write instructions are shaped for one table
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub key_name: String,
    /// Guard updates with the version the aggregate was loaded at
    pub check_version_on_update: bool,
}

/// One pending write for one entity identity
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOperation {
    table_name: String,
    key: String,
    kind: WriteKind,
    instruction: TransactWriteItem,
}

impl WriteOperation {
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Canonical key of the entity
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    pub fn instruction(&self) -> &TransactWriteItem {
        &self.instruction
    }

    /// Identity used to detect a second write to the same entity
    pub fn identity(&self) -> String {
        format!("{}/{}", self.table_name, self.key)
    }
}

/// Build the write operation for `item` without mutating it
pub fn build_write_operation<E: RootEntity>(
    table_name: &str,
    item: &E,
    kind: WriteKind,
    options: &WriteOptions,
) -> Result<WriteOperation, WriteOperationError> {
    let mut snapshot = item.clone();
    let loaded_version = snapshot.version();
    snapshot.increase_version();

    let key = snapshot.id().key()?;
    let mut record = match serde_json::to_value(&snapshot)? {
        Value::Object(record) => record,
        _ => return Err(WriteOperationError::NotAnObject),
    };
    record.insert(options.key_name.clone(), Value::String(key.clone()));

    let instruction = match kind {
        WriteKind::Create => TransactWriteItem::Put(PutRequest {
            table_name: table_name.to_string(),
            key_name: options.key_name.clone(),
            item: record,
            condition: Condition::AttributeNotExists {
                attribute: options.key_name.clone(),
            },
            return_values_on_condition_check_failure: ReturnValue::AllOld,
        }),
        WriteKind::Update => {
            let condition = if options.check_version_on_update {
                Condition::VersionEquals {
                    key_attribute: options.key_name.clone(),
                    expected: loaded_version,
                }
            } else {
                Condition::AttributeExists {
                    attribute: options.key_name.clone(),
                }
            };
            TransactWriteItem::Update(update_request::<E>(table_name, &key, &record, condition, options)?)
        }
    };

    Ok(WriteOperation {
        table_name: table_name.to_string(),
        key,
        kind,
        instruction,
    })
}

fn update_request<E: RootEntity>(
    table_name: &str,
    key: &str,
    record: &Item,
    condition: Condition,
    options: &WriteOptions,
) -> Result<UpdateRequest, WriteOperationError> {
    let mut fields: Vec<&str> = Vec::new();
    for field in E::updatable_fields().iter().copied().chain(["last_update", "version"]) {
        if field != options.key_name && !fields.contains(&field) {
            fields.push(field);
        }
    }

    let mut names = condition.attribute_names();
    let mut values = condition.attribute_values();
    let mut assignments = Vec::with_capacity(fields.len());

    for field in fields {
        let value = record
            .get(field)
            .ok_or_else(|| WriteOperationError::UnknownField(field.to_string()))?;
        names.insert(format!("#{}", field), field.to_string());
        values.insert(format!(":{}", field), value.clone());
        assignments.push(format!("#{field} = :{field}"));
    }

    Ok(UpdateRequest {
        table_name: table_name.to_string(),
        key_name: options.key_name.clone(),
        key: key_item(&options.key_name, key),
        update_expression: format!("SET {}", assignments.join(", ")),
        expression_attribute_names: names,
        expression_attribute_values: values,
        condition,
    })
}
