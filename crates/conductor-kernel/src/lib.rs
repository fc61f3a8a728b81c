use std::sync::Arc;

use conductor_contracts::{ContractValidator, ShapeValidator};
use conductor_events::{
    ConductorStore, DEFAULT_RETENTION, DEFAULT_STREAM_BUFFER, DEFAULT_VALIDATE_STATE_EVERY,
    LineSink, StoreConfig, Subscription,
};
use conductor_protocol::{
    CapabilityInventory, ConductorResult, ConductorSnapshot, EventEnvelope, ModuleId,
    ModuleRegistration, MountViewRequest, MountedViewResult, PortSignal, RegisteredModule,
    StoreMetrics, SwapMode, SwapPlan, ValidationBoundary, ValidationOutcome, ValidationPolicy,
    WiringEdge,
};
use conductor_runtime::{ConductorRuntime, DEFAULT_TRACE_LIMIT, RoutedAction};
use conductor_transport::{
    HttpTransportConnector, TransportAdapter, TransportAdapterRegistry, TransportConnector,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, instrument};

pub use conductor_runtime::{extract_pdf_selection, extract_selection_from_model_context};

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

fn default_validate_state_every() -> u64 {
    DEFAULT_VALIDATE_STATE_EVERY
}

fn default_stream_buffer() -> usize {
    DEFAULT_STREAM_BUFFER
}

/// Engine settings. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorConfig {
    #[serde(default)]
    pub validation_policy: ValidationPolicy,
    #[serde(default = "default_retention")]
    pub retention_limit: usize,
    #[serde(default = "default_validate_state_every")]
    pub validate_state_every: u64,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            validation_policy: ValidationPolicy::default(),
            retention_limit: DEFAULT_RETENTION,
            validate_state_every: DEFAULT_VALIDATE_STATE_EVERY,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl ConductorConfig {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            retention_limit: self.retention_limit,
            validate_state_every: self.validate_state_every,
            event_payload_mode: self.validation_policy.mode(ValidationBoundary::EventPayload),
            stream_buffer: self.stream_buffer,
        }
    }
}

pub struct ConductorBuilder {
    config: ConductorConfig,
    validator: Arc<dyn ContractValidator>,
    connector: Arc<dyn TransportConnector>,
    adapters: TransportAdapterRegistry,
    sink: Option<Arc<dyn LineSink>>,
}

impl Default for ConductorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConductorBuilder {
    pub fn new() -> Self {
        Self {
            config: ConductorConfig::default(),
            validator: Arc::new(ShapeValidator),
            connector: Arc::new(HttpTransportConnector::default()),
            adapters: TransportAdapterRegistry::with_builtin_adapters(),
            sink: None,
        }
    }

    pub fn config(mut self, config: ConductorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy(mut self, policy: ValidationPolicy) -> Self {
        self.config.validation_policy = policy;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn ContractValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn transport_connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replace the adapter registry. The builtin session adapter is not kept.
    pub fn adapters(mut self, adapters: TransportAdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn TransportAdapter>) -> Self {
        self.adapters.register(adapter);
        self
    }

    /// Mirror every appended event to `sink`.
    pub fn sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Conductor {
        let mut store = ConductorStore::with_validator(self.config.store_config(), self.validator);
        if let Some(sink) = self.sink {
            store = store.with_sink(sink);
        }
        debug!(
            retention_limit = self.config.retention_limit,
            validate_state_every = self.config.validate_state_every,
            "conductor assembled"
        );
        let runtime = ConductorRuntime::new(
            Arc::new(store),
            self.config.validation_policy,
            self.connector,
            self.adapters,
        );
        Conductor {
            runtime: Arc::new(runtime),
        }
    }
}

/// Cheap cloneable handle over one conductor instance.
#[derive(Clone)]
pub struct Conductor {
    runtime: Arc<ConductorRuntime>,
}

impl Conductor {
    pub fn builder() -> ConductorBuilder {
        ConductorBuilder::new()
    }

    pub fn runtime(&self) -> &ConductorRuntime {
        &self.runtime
    }

    pub fn policy(&self) -> &ValidationPolicy {
        self.runtime.policy()
    }

    pub async fn register_module(
        &self,
        registration: ModuleRegistration,
    ) -> ConductorResult<RegisteredModule> {
        self.runtime.register_module(registration).await
    }

    pub async fn discover_capabilities(
        &self,
        module_id: Option<&ModuleId>,
    ) -> ConductorResult<IndexMap<ModuleId, CapabilityInventory>> {
        self.runtime.discover_capabilities(module_id).await
    }

    pub async fn mount_view(&self, request: MountViewRequest) -> ConductorResult<MountedViewResult> {
        self.runtime.mount_view(request).await
    }

    pub fn validate_wiring_edge(
        &self,
        edge: &WiringEdge,
        state: Option<&ConductorSnapshot>,
    ) -> Vec<ValidationOutcome> {
        self.runtime.validate_wiring_edge(edge, state)
    }

    pub fn connect_ports(&self, edge: WiringEdge) -> ConductorResult<WiringEdge> {
        self.runtime.connect_ports(edge)
    }

    pub async fn swap_module(
        &self,
        from_module_id: &ModuleId,
        to_module_id: &ModuleId,
        mode: SwapMode,
    ) -> ConductorResult<SwapPlan> {
        self.runtime
            .swap_module(from_module_id, to_module_id, mode)
            .await
    }

    pub async fn emit_port_event(&self, signal: PortSignal) -> ConductorResult<Vec<RoutedAction>> {
        self.runtime.emit_port_event(signal).await
    }

    pub fn report_validation_outcome(
        &self,
        outcome: ValidationOutcome,
    ) -> ConductorResult<EventEnvelope> {
        self.runtime.report_validation_outcome(outcome)
    }

    pub fn get_state(&self) -> Arc<ConductorSnapshot> {
        self.runtime.get_state()
    }

    /// Newest events, oldest first. `None` takes the default window.
    pub fn get_trace(&self, limit: Option<usize>) -> Vec<EventEnvelope> {
        self.runtime.get_trace(limit.unwrap_or(DEFAULT_TRACE_LIMIT))
    }

    pub fn metrics(&self) -> StoreMetrics {
        self.runtime.metrics()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&EventEnvelope, &ConductorSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.runtime.subscribe(listener)
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<EventEnvelope> {
        self.runtime.subscribe_events()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<EventEnvelope> {
        self.runtime.store().subscribe_stream()
    }

    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.runtime.close().await;
    }
}
