use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Write operations staged into sessions
// - Store transactions (outcome, size) and their retries
// - Unit of work commits per mode
// - Domain events published through the event bus
//
// ============================================================================

/// Central metrics registry for the persistence layer
pub struct Metrics {
    registry: Registry,

    // Session Metrics
    pub write_operations_staged: IntCounterVec,
    pub store_transactions: IntCounterVec,
    pub store_transaction_items: IntCounter,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,

    // Unit of Work Metrics
    pub commits_total: IntCounterVec,
    pub commit_duration: HistogramVec,

    // Publisher Metrics
    pub events_published: IntCounter,
    pub event_publish_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let write_operations_staged = IntCounterVec::new(
            Opts::new("write_operations_staged_total", "Write operations staged into a session"),
            &["kind"],
        )?;
        registry.register(Box::new(write_operations_staged.clone()))?;

        let store_transactions = IntCounterVec::new(
            Opts::new("store_transactions_total", "Store transactions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(store_transactions.clone()))?;

        let store_transaction_items = IntCounter::new(
            "store_transaction_items_total",
            "Items written by successful store transactions",
        )?;
        registry.register(Box::new(store_transaction_items.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let commits_total = IntCounterVec::new(
            Opts::new("uow_commits_total", "Unit of work commits by mode and outcome"),
            &["mode", "outcome"],
        )?;
        registry.register(Box::new(commits_total.clone()))?;

        let commit_duration = HistogramVec::new(
            HistogramOpts::new("uow_commit_duration_seconds", "Unit of work commit duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["mode"],
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let events_published = IntCounter::new(
            "events_published_total",
            "Domain events accepted by the event bus",
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let event_publish_failures = IntCounter::new(
            "event_publish_failures_total",
            "Publish calls that failed",
        )?;
        registry.register(Box::new(event_publish_failures.clone()))?;

        Ok(Self {
            registry,
            write_operations_staged,
            store_transactions,
            store_transaction_items,
            retry_attempts_total,
            commits_total,
            commit_duration,
            events_published,
            event_publish_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode every registered metric in the text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_staged(&self, kind: &str) {
        self.write_operations_staged.with_label_values(&[kind]).inc();
    }

    pub fn record_store_transaction(&self, items: usize, success: bool) {
        if success {
            self.store_transactions.with_label_values(&["committed"]).inc();
            self.store_transaction_items.inc_by(items as u64);
        } else {
            self.store_transactions.with_label_values(&["failed"]).inc();
        }
    }

    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts_total.with_label_values(&[operation]).inc();
    }

    pub fn record_commit(&self, mode: &str, duration_secs: f64, success: bool) {
        let outcome = if success { "committed" } else { "failed" };
        self.commits_total.with_label_values(&[mode, outcome]).inc();
        self.commit_duration.with_label_values(&[mode]).observe(duration_secs);
    }

    pub fn record_publish(&self, events: usize, success: bool) {
        if success {
            self.events_published.inc_by(events as u64);
        } else {
            self.event_publish_failures.inc();
        }
    }
}
