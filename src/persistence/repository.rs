use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;

use crate::persistence::core::{EntityId, KeyError, RootEntity};
use crate::persistence::session::{
    build_write_operation, Session, SessionError, WriteKind, WriteOperationError, WriteOptions,
    WriteSession,
};
use crate::persistence::store::{key_item, Item, KeyValueStore, ScanRequest, StoreError};

// ============================================================================
// Repository - Aggregate Access Bound to a Session
// ============================================================================
//
// Writes never reach the store from here: put/update build a conditional
// write operation and stage it into the session of the owning unit of work.
// Reads go straight to the store and see only committed state.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found in {table}: {key}")]
    NotFound { table: String, key: String },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    WriteOperation(#[from] WriteOperationError),

    #[error("Failed to decode stored item: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

/// Access to one aggregate type
#[async_trait]
pub trait Repository<E: RootEntity>: Send + Sync {
    /// Stage a create: committed only if nothing exists at the key
    fn put(&self, item: &E) -> Result<(), RepositoryError>;

    /// Stage a partial update of an existing record
    fn update(&self, item: &E) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: &E::Id) -> Result<E, RepositoryError>;

    /// Like `get_by_id`, with "not found" turned into `None`
    async fn find_by_id(&self, id: &E::Id) -> Result<Option<E>, RepositoryError> {
        match self.get_by_id(id).await {
            Ok(item) => Ok(Some(item)),
            Err(RepositoryError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Lazily scan the whole table, one store page at a time
    fn get_all(&self) -> BoxStream<'_, Result<E, RepositoryError>>;
}

/// Repository over a key-value store table
///
/// Reads go to `store`; writes are staged into any `WriteSession`.
pub struct StoreRepository<E, S: KeyValueStore, W: WriteSession = Session<S>> {
    table_name: String,
    store: Arc<S>,
    session: Arc<W>,
    options: WriteOptions,
    scan_page_size: usize,
    _entity: PhantomData<fn() -> E>,
}

impl<E: RootEntity, S: KeyValueStore + 'static, W: WriteSession> StoreRepository<E, S, W> {
    pub fn new(
        table_name: impl Into<String>,
        store: Arc<S>,
        session: Arc<W>,
        options: WriteOptions,
        scan_page_size: usize,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            store,
            session,
            options,
            scan_page_size: scan_page_size.max(1),
            _entity: PhantomData,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn stage(&self, item: &E, kind: WriteKind) -> Result<(), RepositoryError> {
        let operation = build_write_operation(&self.table_name, item, kind, &self.options)?;
        self.session.add_write_operation(operation)?;
        Ok(())
    }
}

fn decode<E: RootEntity>(mut item: Item, key_name: &str) -> Result<E, RepositoryError> {
    item.remove(key_name);
    Ok(serde_json::from_value(Value::Object(item))?)
}

enum ScanCursor {
    Start,
    After(Item),
    Exhausted,
}

#[async_trait]
impl<E, S, W> Repository<E> for StoreRepository<E, S, W>
where
    E: RootEntity + 'static,
    S: KeyValueStore + 'static,
    W: WriteSession + 'static,
{
    fn put(&self, item: &E) -> Result<(), RepositoryError> {
        self.stage(item, WriteKind::Create)
    }

    fn update(&self, item: &E) -> Result<(), RepositoryError> {
        self.stage(item, WriteKind::Update)
    }

    async fn get_by_id(&self, id: &E::Id) -> Result<E, RepositoryError> {
        let key = id.key()?;
        let found = self
            .store
            .get_item(&self.table_name, &key_item(&self.options.key_name, &key))
            .await?;

        match found {
            Some(item) => decode(item, &self.options.key_name),
            None => {
                tracing::debug!(table = %self.table_name, key = %key, "Entity not found");
                Err(RepositoryError::NotFound {
                    table: self.table_name.clone(),
                    key,
                })
            }
        }
    }

    fn get_all(&self) -> BoxStream<'_, Result<E, RepositoryError>> {
        let store = self.store.clone();
        let table_name = self.table_name.clone();
        let key_name = self.options.key_name.clone();
        let limit = self.scan_page_size;

        stream::try_unfold(ScanCursor::Start, move |cursor| {
            let store = store.clone();
            let table_name = table_name.clone();
            let key_name = key_name.clone();

            async move {
                let exclusive_start_key = match cursor {
                    ScanCursor::Exhausted => return Ok(None),
                    ScanCursor::Start => None,
                    ScanCursor::After(key) => Some(key),
                };

                let output = store
                    .scan(ScanRequest {
                        table_name: table_name.clone(),
                        key_name: key_name.clone(),
                        limit,
                        exclusive_start_key,
                    })
                    .await?;

                tracing::debug!(
                    table = %table_name,
                    items = output.items.len(),
                    more = output.last_evaluated_key.is_some(),
                    "Scanned page"
                );

                let page = output
                    .items
                    .into_iter()
                    .map(|item| decode::<E>(item, &key_name))
                    .collect::<Result<Vec<_>, _>>()?;
                let next = match output.last_evaluated_key {
                    Some(key) => ScanCursor::After(key),
                    None => ScanCursor::Exhausted,
                };

                Ok::<_, RepositoryError>(Some((page, next)))
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<E, RepositoryError>)))
        .try_flatten()
        .boxed()
    }
}
