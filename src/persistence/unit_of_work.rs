use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use crate::config::UnitOfWorkConfig;
use crate::messaging::{EventPublishError, EventPublisher};
use crate::metrics::Metrics;
use crate::persistence::core::{DomainEvent, EventEnvelope, RawEvent, RootEntity};
use crate::persistence::repository::StoreRepository;
use crate::persistence::session::{Session, SessionError, WriteOptions, WriteSession};
use crate::persistence::store::KeyValueStore;

// ============================================================================
// Unit of Work - Transaction Scopes, Commit and Event Flush
// ============================================================================
//
// A unit of work owns one session and one buffer of domain events. The
// session is store-backed by default; any WriteSession can stand in.
//
// transaction() / batch() open a scope that selects how the session commits.
// Committing the scope writes the staged operations, then publishes the
// buffered events. Events are only published once the store accepted every
// write; if the store fails they are discarded.
//
// Leaving a scope on any path (commit, error, early return, panic) resets
// the mode to NONE and empties the event buffer and the session.
//
// Known gap: a crash between the store commit and the event flush loses the
// events. Closing it needs an outbox table written in the same transaction.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Single,
    Batch,
    None,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Single => "SINGLE",
            TransactionType::Batch => "BATCH",
            TransactionType::None => "NONE",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("Unknown transaction type {0}: only SINGLE and BATCH scopes can commit")]
    UnknownTransactionType(TransactionType),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Publish(#[from] EventPublishError),

    #[error("Failed to serialize domain event: {0}")]
    EventSerialization(#[from] serde_json::Error),
}

pub struct UnitOfWork<S: KeyValueStore, P: EventPublisher, W: WriteSession = Session<S>> {
    store: Arc<S>,
    session: Arc<W>,
    publisher: Arc<P>,
    config: UnitOfWorkConfig,
    transaction_type: TransactionType,
    events: Vec<RawEvent>,
    metrics: Option<Arc<Metrics>>,
}

impl<S: KeyValueStore + 'static, P: EventPublisher> UnitOfWork<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: UnitOfWorkConfig) -> Self {
        let session = Session::new(store.clone(), config.max_batch_size, config.store_retry.clone());
        Self::with_session(store, Arc::new(session), publisher, config)
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        let session = Session::new(
            self.store.clone(),
            self.config.max_batch_size,
            self.config.store_retry.clone(),
        )
        .with_metrics(metrics.clone());
        self.session = Arc::new(session);
        self.metrics = Some(metrics);
        self
    }
}

impl<S, P, W> UnitOfWork<S, P, W>
where
    S: KeyValueStore + 'static,
    P: EventPublisher,
    W: WriteSession + 'static,
{
    /// Unit of work over an explicit session; reads still go to `store`
    pub fn with_session(store: Arc<S>, session: Arc<W>, publisher: Arc<P>, config: UnitOfWorkConfig) -> Self {
        Self {
            store,
            session,
            publisher,
            config,
            transaction_type: TransactionType::None,
            events: Vec::new(),
            metrics: None,
        }
    }

    /// Repository for one aggregate type, staging into this unit's session
    pub fn repository<E: RootEntity>(&self, table_name: &str) -> StoreRepository<E, S, W> {
        let options = WriteOptions {
            key_name: self.config.key_name.clone(),
            check_version_on_update: self.config.check_version_on_update,
        };
        StoreRepository::new(
            table_name,
            self.store.clone(),
            self.session.clone(),
            options,
            self.config.scan_page_size,
        )
    }

    pub fn session(&self) -> &Arc<W> {
        &self.session
    }

    pub fn publisher(&self) -> &Arc<P> {
        &self.publisher
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    /// Events waiting for the next successful commit
    pub fn pending_events(&self) -> &[RawEvent] {
        &self.events
    }

    /// Open a scope committing everything in one atomic transaction
    pub fn transaction(&mut self) -> UnitOfWorkScope<'_, S, P, W> {
        self.begin(TransactionType::Single)
    }

    /// Open a scope committing in chunks of at most `max_batch_size` writes
    pub fn batch(&mut self) -> UnitOfWorkScope<'_, S, P, W> {
        self.begin(TransactionType::Batch)
    }

    fn begin(&mut self, transaction_type: TransactionType) -> UnitOfWorkScope<'_, S, P, W> {
        tracing::info!(transaction_type = %transaction_type, "Init unit of work scope");
        // Writes staged outside a scope never belong to this one
        self.session.clear();
        self.events.clear();
        self.transaction_type = transaction_type;
        UnitOfWorkScope { unit_of_work: self }
    }

    fn finish(&mut self) {
        tracing::debug!(transaction_type = %self.transaction_type, "Closing unit of work scope");
        self.transaction_type = TransactionType::None;
        self.events.clear();
        self.session.clear();
    }

    /// Buffer events to publish after the next successful commit
    pub fn publish_events<E: DomainEvent>(
        &mut self,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<(), UnitOfWorkError> {
        for event in events {
            self.events.push(event.into_raw()?);
        }
        Ok(())
    }

    /// Write the session in the active mode, then flush buffered events
    pub async fn commit(&mut self) -> Result<(), UnitOfWorkError> {
        let transaction_type = self.transaction_type;
        let events = std::mem::take(&mut self.events);
        let started = Instant::now();

        tracing::info!(
            transaction_type = %transaction_type,
            operations = self.session.pending_count(),
            events = events.len(),
            "Committing unit of work"
        );

        let persisted = match transaction_type {
            TransactionType::Single => self.session.execute_in_single_transaction().await,
            TransactionType::Batch => self.session.execute_in_batch_transaction().await,
            TransactionType::None => {
                tracing::error!("Commit requested outside of a transaction scope");
                return Err(UnitOfWorkError::UnknownTransactionType(transaction_type));
            }
        };

        if let Err(error) = persisted {
            tracing::error!(
                transaction_type = %transaction_type,
                discarded_events = events.len(),
                error = %error,
                "Commit failed, buffered events discarded"
            );
            self.record_commit(transaction_type, started, false);
            return Err(error.into());
        }

        if !events.is_empty() {
            tracing::info!(events = events.len(), "Publishing domain events associated");
            if let Err(error) = self.publisher.publish(&events).await {
                self.record_commit(transaction_type, started, false);
                return Err(error.into());
            }
        }

        self.record_commit(transaction_type, started, true);
        Ok(())
    }

    /// Nothing to undo: a scope that never committed wrote nothing
    pub fn rollback(&mut self) {
        tracing::debug!(transaction_type = %self.transaction_type, "Rollback requested, nothing to undo");
    }

    fn record_commit(&self, transaction_type: TransactionType, started: Instant, success: bool) {
        if let Some(metrics) = &self.metrics {
            let mode = transaction_type.as_str().to_lowercase();
            metrics.record_commit(&mode, started.elapsed().as_secs_f64(), success);
        }
    }
}

/// An open transaction or batch scope
///
/// `commit()` is the normal exit. Dropping the scope on any path resets the
/// unit of work to `TransactionType::None` with no events or staged writes.
pub struct UnitOfWorkScope<'a, S, P, W = Session<S>>
where
    S: KeyValueStore + 'static,
    P: EventPublisher,
    W: WriteSession + 'static,
{
    unit_of_work: &'a mut UnitOfWork<S, P, W>,
}

impl<S, P, W> UnitOfWorkScope<'_, S, P, W>
where
    S: KeyValueStore + 'static,
    P: EventPublisher,
    W: WriteSession + 'static,
{
    pub async fn commit(self) -> Result<(), UnitOfWorkError> {
        self.unit_of_work.commit().await
    }
}

impl<S, P, W> Deref for UnitOfWorkScope<'_, S, P, W>
where
    S: KeyValueStore + 'static,
    P: EventPublisher,
    W: WriteSession + 'static,
{
    type Target = UnitOfWork<S, P, W>;

    fn deref(&self) -> &Self::Target {
        self.unit_of_work
    }
}

impl<S, P, W> DerefMut for UnitOfWorkScope<'_, S, P, W>
where
    S: KeyValueStore + 'static,
    P: EventPublisher,
    W: WriteSession + 'static,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.unit_of_work
    }
}

impl<S, P, W> Drop for UnitOfWorkScope<'_, S, P, W>
where
    S: KeyValueStore + 'static,
    P: EventPublisher,
    W: WriteSession + 'static,
{
    fn drop(&mut self) {
        self.unit_of_work.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{BusError, EventBusPublisher, InMemoryEventBus};
    use crate::config::PublisherConfig;
    use crate::persistence::core::{DomainAggregate, EntityId, EntityMetadata, KeyAttribute};
    use crate::persistence::repository::Repository;
    use crate::persistence::session::InMemorySession;
    use crate::persistence::store::{InMemoryStore, StoreError};
    use crate::utils::RetryConfig;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use tokio::sync::Mutex;

    // ------------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct GadgetId {
        serial: String,
    }

    impl EntityId for GadgetId {
        fn key_attributes(&self) -> Vec<KeyAttribute> {
            vec![KeyAttribute::new("serial", self.serial.clone())]
        }
    }

    #[derive(Debug, Clone, Serialize)]
    struct GadgetAssembled {
        serial: String,
    }

    impl DomainEvent for GadgetAssembled {
        const DOMAIN_NAME: &'static str = "factory";

        fn event_type(&self) -> &'static str {
            "GadgetAssembled"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Gadget {
        id: GadgetId,
        #[serde(flatten)]
        metadata: EntityMetadata,
        #[serde(skip)]
        events: Vec<EventEnvelope<GadgetAssembled>>,
    }

    impl Gadget {
        fn assemble(serial: &str) -> Self {
            let mut gadget = Gadget {
                id: GadgetId { serial: serial.into() },
                metadata: EntityMetadata::new(),
                events: Vec::new(),
            };
            gadget.add_event(GadgetAssembled { serial: serial.into() });
            gadget
        }
    }

    impl RootEntity for Gadget {
        type Id = GadgetId;

        fn id(&self) -> &GadgetId {
            &self.id
        }

        fn metadata(&self) -> &EntityMetadata {
            &self.metadata
        }

        fn metadata_mut(&mut self) -> &mut EntityMetadata {
            &mut self.metadata
        }

        fn updatable_fields() -> &'static [&'static str] {
            &[]
        }
    }

    impl DomainAggregate for Gadget {
        type Event = GadgetAssembled;

        fn events(&self) -> &[EventEnvelope<GadgetAssembled>] {
            &self.events
        }

        fn events_mut(&mut self) -> &mut Vec<EventEnvelope<GadgetAssembled>> {
            &mut self.events
        }
    }

    /// Publisher that only records what it was handed
    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Vec<RawEvent>>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, events: &[RawEvent]) -> Result<(), EventPublishError> {
            self.published.lock().await.push(events.to_vec());
            Ok(())
        }
    }

    const TABLE: &str = "gadgets";

    fn config(max_batch_size: usize) -> UnitOfWorkConfig {
        UnitOfWorkConfig {
            max_batch_size,
            store_retry: RetryConfig::none(),
            ..UnitOfWorkConfig::default()
        }
    }

    fn unit_of_work(
        store: &Arc<InMemoryStore>,
        max_batch_size: usize,
    ) -> UnitOfWork<InMemoryStore, RecordingPublisher> {
        UnitOfWork::new(store.clone(), Arc::new(RecordingPublisher::default()), config(max_batch_size))
    }

    fn stage(scope: &mut UnitOfWork<InMemoryStore, RecordingPublisher>, gadget: &mut Gadget) {
        scope.repository::<Gadget>(TABLE).put(gadget).unwrap();
        let events = gadget.pull_events();
        scope.publish_events(events).unwrap();
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    #[test]
    fn test_transaction_type_names() {
        assert_eq!(TransactionType::Single.to_string(), "SINGLE");
        assert_eq!(TransactionType::Batch.to_string(), "BATCH");
        assert_eq!(TransactionType::None.to_string(), "NONE");
    }

    #[tokio::test]
    async fn test_scopes_set_and_reset_mode() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 100);
        assert_eq!(uow.transaction_type(), TransactionType::None);

        {
            let scope = uow.transaction();
            assert_eq!(scope.transaction_type(), TransactionType::Single);
            scope.commit().await.unwrap();
        }
        assert_eq!(uow.transaction_type(), TransactionType::None);

        {
            let scope = uow.batch();
            assert_eq!(scope.transaction_type(), TransactionType::Batch);
        }
        assert_eq!(uow.transaction_type(), TransactionType::None);
    }

    #[tokio::test]
    async fn test_commit_outside_scope_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 100);

        let error = uow.commit().await.unwrap_err();
        assert!(matches!(error, UnitOfWorkError::UnknownTransactionType(TransactionType::None)));
    }

    #[tokio::test]
    async fn test_abandoned_scope_leaves_nothing_behind() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 100);

        {
            let mut scope = uow.transaction();
            stage(&mut scope, &mut Gadget::assemble("g-1"));
            assert_eq!(scope.session().pending_count(), 1);
            assert_eq!(scope.pending_events().len(), 1);
        }

        assert_eq!(uow.transaction_type(), TransactionType::None);
        assert_eq!(uow.session().pending_count(), 0);
        assert!(uow.pending_events().is_empty());
        assert!(store.write_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 100);

        let mut scope = uow.transaction();
        stage(&mut scope, &mut Gadget::assemble("g-1"));
        scope.rollback();

        assert_eq!(scope.session().pending_count(), 1);
        assert_eq!(scope.transaction_type(), TransactionType::Single);
    }

    // ------------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_successful_commit_persists_then_publishes() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 100);
        let mut gadget = Gadget::assemble("g-1");

        let mut scope = uow.transaction();
        stage(&mut scope, &mut gadget);
        scope.commit().await.unwrap();

        assert_eq!(uow.session().pending_count(), 0);
        assert!(uow.pending_events().is_empty());

        let published = uow.publisher().published.lock().await.clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0][0].event_type, "GadgetAssembled");
        assert_eq!(published[0][0].event_data["serial"], "g-1");

        let stored = uow.repository::<Gadget>(TABLE).get_by_id(&gadget.id).await.unwrap();
        assert_eq!(stored.id, gadget.id);
        assert_eq!(stored.version(), 1);
        assert_eq!(gadget.version(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_discards_events() {
        let store = Arc::new(InMemoryStore::new());
        store
            .fail_next_writes([StoreError::Unavailable("connection reset".into())])
            .await;
        let mut uow = unit_of_work(&store, 100);

        let mut scope = uow.transaction();
        stage(&mut scope, &mut Gadget::assemble("g-1"));
        let error = scope.commit().await.unwrap_err();

        assert!(matches!(error, UnitOfWorkError::Session(SessionError::TransactionFailed { .. })));
        assert!(uow.publisher().published.lock().await.is_empty());
        assert!(uow.pending_events().is_empty());
        assert_eq!(uow.session().pending_count(), 0);
        assert_eq!(uow.transaction_type(), TransactionType::None);
    }

    #[tokio::test]
    async fn test_create_conflict_fails_commit() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 100);

        let mut scope = uow.transaction();
        stage(&mut scope, &mut Gadget::assemble("g-1"));
        scope.commit().await.unwrap();

        let mut scope = uow.transaction();
        stage(&mut scope, &mut Gadget::assemble("g-1"));
        let error = scope.commit().await.unwrap_err();

        match error {
            UnitOfWorkError::Session(error) => {
                assert!(error.store_error().is_some_and(StoreError::is_condition_failure));
            }
            other => panic!("expected session error, got {other:?}"),
        }
        assert_eq!(uow.publisher().published.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_staging_in_one_scope() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 100);
        let gadget = Gadget::assemble("g-1");

        let scope = uow.transaction();
        let gadgets = scope.repository::<Gadget>(TABLE);
        gadgets.put(&gadget).unwrap();
        let error = gadgets.update(&gadget).unwrap_err();

        assert!(matches!(
            error,
            crate::persistence::RepositoryError::Session(SessionError::DuplicateWriteOperation { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_transaction_over_limit_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 3);

        let mut scope = uow.transaction();
        for serial in 0..4 {
            stage(&mut scope, &mut Gadget::assemble(&format!("g-{serial}")));
        }
        let error = scope.commit().await.unwrap_err();

        assert!(matches!(
            error,
            UnitOfWorkError::Session(SessionError::BatchSizeExceeded { count: 4, limit: 3 })
        ));
        assert!(store.write_calls().await.is_empty());
        assert!(uow.publisher().published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_scope_chunks_writes() {
        let store = Arc::new(InMemoryStore::new());
        let mut uow = unit_of_work(&store, 3);

        let mut scope = uow.batch();
        for serial in 0..7 {
            stage(&mut scope, &mut Gadget::assemble(&format!("g-{serial}")));
        }
        scope.commit().await.unwrap();

        let calls = store.write_calls().await;
        assert_eq!(calls.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert_eq!(store.item_count(TABLE).await, 7);
        assert_eq!(uow.publisher().published.lock().await[0].len(), 7);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_after_persisting() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_next_call(BusError::Rejected("malformed".into())).await;
        let publisher = EventBusPublisher::new(
            bus.clone(),
            PublisherConfig {
                event_bus_name: "bus".into(),
                retry: RetryConfig::none(),
            },
        );
        let mut uow = UnitOfWork::new(store.clone(), Arc::new(publisher), config(100));

        let mut gadget = Gadget::assemble("g-1");
        let mut scope = uow.transaction();
        scope.repository::<Gadget>(TABLE).put(&gadget).unwrap();
        scope.publish_events(gadget.pull_events()).unwrap();
        let error = scope.commit().await.unwrap_err();

        assert!(matches!(error, UnitOfWorkError::Publish(EventPublishError::Bus(_))));
        assert_eq!(store.item_count(TABLE).await, 1);
        assert!(uow.pending_events().is_empty());
    }

    #[tokio::test]
    async fn test_commit_metrics() {
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut uow = unit_of_work(&store, 100).with_metrics(metrics.clone());

        let mut scope = uow.transaction();
        stage(&mut scope, &mut Gadget::assemble("g-1"));
        scope.commit().await.unwrap();

        let text = metrics.render().unwrap();
        assert!(text.contains("uow_commits_total{mode=\"single\",outcome=\"committed\"} 1"));
        assert!(text.contains("write_operations_staged_total{kind=\"create\"} 1"));
    }

    #[tokio::test]
    async fn test_in_memory_session_stands_in_for_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let session = Arc::new(InMemorySession::new(2));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut uow = UnitOfWork::with_session(store.clone(), session.clone(), publisher.clone(), config(2));

        let mut scope = uow.batch();
        for serial in ["g-3", "g-1", "g-2"] {
            let mut gadget = Gadget::assemble(serial);
            scope.repository::<Gadget>(TABLE).put(&gadget).unwrap();
            scope.publish_events(gadget.pull_events()).unwrap();
        }
        scope.commit().await.unwrap();

        let sizes: Vec<usize> = session.committed().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(session.committed_identities(), vec!["gadgets/g-3", "gadgets/g-1", "gadgets/g-2"]);
        assert!(store.write_calls().await.is_empty());
        assert_eq!(publisher.published.lock().await[0].len(), 3);
        assert_eq!(uow.session().pending_count(), 0);
    }
}
