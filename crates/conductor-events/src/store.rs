use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use conductor_contracts::{ContractValidator, ShapeValidator};
use conductor_protocol::{
    ConductorError, ConductorResult, ConductorSnapshot, EventEnvelope, EventId, EventSource,
    EventType, StoreMetrics, TraceId, ValidationBoundary, ValidationIssue, ValidationMode,
    ValidationOutcome,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, instrument, warn};

use crate::log::{DEFAULT_RETENTION, EventLog};
use crate::reducer::reduce;
use crate::sink::LineSink;
use crate::stream::EventStreamHub;

pub const DEFAULT_VALIDATE_STATE_EVERY: u64 = 250;
pub const DEFAULT_STREAM_BUFFER: usize = 1024;

/// Rough per-event size used for the snapshot size metric.
const APPROX_EVENT_BYTES: usize = 220;

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub retention_limit: usize,
    pub validate_state_every: u64,
    pub event_payload_mode: ValidationMode,
    pub stream_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_limit: DEFAULT_RETENTION,
            validate_state_every: DEFAULT_VALIDATE_STATE_EVERY,
            event_payload_mode: ValidationMode::Warn,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

pub type Listener = Arc<dyn Fn(&EventEnvelope, &ConductorSnapshot) + Send + Sync>;
type ListenerMap = Mutex<IndexMap<u64, Listener>>;

/// Handle returned by [`ConductorStore::subscribe`].
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    /// Stop receiving events. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().shift_remove(&self.id);
        }
    }
}

#[derive(Default)]
struct StoreInner {
    log: EventLog,
    state: ConductorSnapshot,
    version: u64,
    cached: Option<(u64, Arc<ConductorSnapshot>)>,
    dispatch_count: u64,
    last_validation_dispatch: u64,
    last_snapshot_bytes: usize,
}

impl StoreInner {
    fn snapshot(&mut self) -> Arc<ConductorSnapshot> {
        if let Some((version, snapshot)) = &self.cached
            && *version == self.version
        {
            return snapshot.clone();
        }
        let mut snapshot = self.state.clone();
        snapshot.events = self.log.to_vec();
        self.last_snapshot_bytes = snapshot.events.len() * APPROX_EVENT_BYTES;
        let snapshot = Arc::new(snapshot);
        self.cached = Some((self.version, snapshot.clone()));
        snapshot
    }
}

/// Event-sourced conductor state.
///
/// `dispatch` is the only mutation path. Each dispatch is atomic: the event is
/// reduced, appended, and the cached snapshot invalidated under one lock.
/// Listeners run synchronously after the lock is released, so they may read
/// state or dispatch follow-up events.
pub struct ConductorStore {
    config: StoreConfig,
    validator: Arc<dyn ContractValidator>,
    inner: Mutex<StoreInner>,
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
    sink: Option<Arc<dyn LineSink>>,
    stream: EventStreamHub,
}

impl ConductorStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_validator(config, Arc::new(ShapeValidator))
    }

    pub fn with_validator(mut config: StoreConfig, validator: Arc<dyn ContractValidator>) -> Self {
        config.validate_state_every = config.validate_state_every.max(1);
        config.retention_limit = config.retention_limit.max(1);
        Self {
            inner: Mutex::new(StoreInner {
                log: EventLog::with_capacity(config.retention_limit),
                ..StoreInner::default()
            }),
            stream: EventStreamHub::new(config.stream_buffer),
            config,
            validator,
            listeners: Arc::new(Mutex::new(IndexMap::new())),
            next_listener_id: AtomicU64::new(1),
            sink: None,
        }
    }

    /// Mirror every appended event to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Wait for the sink to persist everything recorded so far.
    pub async fn flush_sink(&self) {
        if let Some(sink) = &self.sink {
            sink.flush().await;
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn validator(&self) -> &Arc<dyn ContractValidator> {
        &self.validator
    }

    /// Check, append, and fold one event.
    ///
    /// A payload that fails its registered contract is replaced by a
    /// `validation.outcome` event; under `enforce` the dispatch then fails.
    /// An envelope with blank ids is always refused.
    #[instrument(
        skip(self, event),
        fields(event_type = %event.event_type, event_id = %event.event_id, trace_id = %event.trace_id)
    )]
    pub fn dispatch(&self, event: EventEnvelope) -> ConductorResult<Arc<ConductorSnapshot>> {
        let envelope_issues = self.validator.envelope(&event);
        if !envelope_issues.is_empty() {
            let outcome = ValidationOutcome::failure(
                ValidationBoundary::EventPayload,
                ValidationMode::Enforce,
                format!(
                    "Event envelope failed validation for type \"{}\".",
                    event.event_type
                ),
                envelope_issues,
            );
            self.record_rejection(&event, outcome)?;
            return Err(ConductorError::Validation {
                boundary: ValidationBoundary::EventPayload,
                message: format!("Event envelope validation failed for {}.", event.event_type),
            });
        }

        let payload_issues = self
            .validator
            .event_payload(&event.event_type, &event.payload)
            .unwrap_or_default();
        if payload_issues.is_empty() {
            return self.apply(event);
        }

        let mode = self.config.event_payload_mode;
        warn!(
            issues = payload_issues.len(),
            ?mode,
            "event payload failed validation"
        );
        let outcome = ValidationOutcome::failure(
            ValidationBoundary::EventPayload,
            mode,
            format!(
                "Event payload failed validation for type \"{}\".",
                event.event_type
            ),
            payload_issues,
        );
        let snapshot = self.record_rejection(&event, outcome)?;
        if mode.blocks() {
            return Err(ConductorError::Validation {
                boundary: ValidationBoundary::EventPayload,
                message: format!("Event payload validation failed for {}.", event.event_type),
            });
        }
        Ok(snapshot)
    }

    fn record_rejection(
        &self,
        rejected: &EventEnvelope,
        outcome: ValidationOutcome,
    ) -> ConductorResult<Arc<ConductorSnapshot>> {
        let trace_id = if rejected.trace_id.is_empty() {
            TraceId::generate()
        } else {
            rejected.trace_id.clone()
        };
        let mut synthetic = EventEnvelope::typed(
            EventType::ValidationOutcome,
            &outcome,
            EventSource::conductor(format!("validateEventPayload:{}", rejected.event_type)),
            trace_id,
        )?;
        synthetic.event_id = EventId::from_string(format!("evt-payload-{}", rejected.event_id));
        self.apply(synthetic)
    }

    fn apply(&self, event: EventEnvelope) -> ConductorResult<Arc<ConductorSnapshot>> {
        let (snapshot, consistency_issues, dispatch_count) = {
            let mut inner = self.inner.lock();
            let state = std::mem::take(&mut inner.state);
            inner.state = reduce(state, &event);
            if let Some(evicted) = inner.log.push(event.clone()) {
                debug!(evicted = %evicted.event_id, "event left the retention window");
            }
            inner.dispatch_count += 1;
            inner.version += 1;
            let snapshot = inner.snapshot();

            let issues = if inner.dispatch_count % self.config.validate_state_every == 0 {
                inner.last_validation_dispatch = inner.dispatch_count;
                self.validator.snapshot(&snapshot)
            } else {
                Vec::new()
            };
            (snapshot, issues, inner.dispatch_count)
        };

        if let Some(sink) = &self.sink {
            sink.record(&event);
        }
        self.stream.publish(event.clone());

        if !consistency_issues.is_empty() {
            let detail = describe_issues(&consistency_issues);
            error!(dispatch_count, %detail, "reducer output failed state validation");
            return Err(ConductorError::Consistency(detail));
        }

        let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(&event, &snapshot);
        }
        debug!(dispatch_count, "event dispatched");
        Ok(snapshot)
    }

    /// Current snapshot. Repeated calls between dispatches share one value.
    pub fn get_state(&self) -> Arc<ConductorSnapshot> {
        self.inner.lock().snapshot()
    }

    /// Register a listener called with `(event, snapshot)` after every
    /// successful dispatch, in dispatch order.
    pub fn subscribe(
        &self,
        listener: impl Fn(&EventEnvelope, &ConductorSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.stream.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<EventEnvelope> {
        self.stream.subscribe_stream()
    }

    /// The newest `limit` retained events, oldest first.
    pub fn trace(&self, limit: usize) -> Vec<EventEnvelope> {
        self.inner.lock().log.tail(limit)
    }

    pub fn metrics(&self) -> StoreMetrics {
        let inner = self.inner.lock();
        StoreMetrics {
            dispatch_count: inner.dispatch_count,
            event_count: inner.log.len(),
            last_validation_dispatch: inner.last_validation_dispatch,
            snapshot_version: inner.version,
            last_snapshot_bytes: inner.last_snapshot_bytes,
        }
    }
}

fn describe_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.path, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}
