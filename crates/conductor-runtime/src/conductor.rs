use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::Utc;
use conductor_contracts::ContractValidator;
use conductor_events::{ConductorStore, Subscription};
use conductor_protocol::{
    Actor, CapabilityInventory, ConductorError, ConductorResult, ConductorSnapshot, EdgeId,
    EventEnvelope, EventSource, EventType, ModuleCapabilities, ModuleFailure, ModuleId,
    ModuleRegistered, ModuleRegistration, MountViewRequest, MountedView, MountedViewResult,
    PortEvent, PortSignal, RegisteredModule, StoreMetrics, SwapApplied, SwapMode, SwapPlan,
    SwapPlanned, SwapRejected, SwapTier, ToolCallRecord, ToolErrorRecord, ToolResultRecord, TraceId,
    ValidationBoundary, ValidationOutcome, ValidationPolicy, ViewId, ViewMounted,
    WiringConnected, WiringDecision, WiringEdge,
};
use conductor_transport::{ModuleTransport, TransportAdapterRegistry, TransportConnector};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::router::{RoutedAction, route_port_event};
use crate::swap::resolve_swap_plan;
use crate::wiring::{resolve_edge_schemas, validate_wiring_edge};

pub const DEFAULT_TRACE_LIMIT: usize = 100;

fn actor_for_boundary(boundary: ValidationBoundary) -> Actor {
    let name = boundary.as_str();
    if name.starts_with("host.") {
        Actor::Host
    } else if name.starts_with("conductor.") {
        Actor::Conductor
    } else {
        Actor::System
    }
}

fn remote(module_id: &ModuleId, error: anyhow::Error) -> ConductorError {
    ConductorError::remote(module_id, format!("{error:#}"))
}

fn failure_reason(error: &ConductorError) -> String {
    match error {
        ConductorError::Remote { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// The conductor facade: every public operation validates, records its events
/// under one trace id, and talks to remote modules through cached transports.
///
/// All state lives in the [`ConductorStore`]; this type only owns the
/// per-module client cache.
pub struct ConductorRuntime {
    store: Arc<ConductorStore>,
    policy: ValidationPolicy,
    connector: Arc<dyn TransportConnector>,
    adapters: TransportAdapterRegistry,
    clients: Mutex<HashMap<ModuleId, Arc<dyn ModuleTransport>>>,
}

impl ConductorRuntime {
    pub fn new(
        store: Arc<ConductorStore>,
        policy: ValidationPolicy,
        connector: Arc<dyn TransportConnector>,
        adapters: TransportAdapterRegistry,
    ) -> Self {
        Self {
            store,
            policy,
            connector,
            adapters,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ConductorStore> {
        &self.store
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn adapters(&self) -> &TransportAdapterRegistry {
        &self.adapters
    }

    fn validator(&self) -> &Arc<dyn ContractValidator> {
        self.store.validator()
    }

    fn push_event<P: Serialize>(
        &self,
        event_type: EventType,
        payload: &P,
        source: EventSource,
        trace_id: &TraceId,
    ) -> ConductorResult<EventEnvelope> {
        let event = EventEnvelope::typed(event_type, payload, source, trace_id.clone())?;
        self.store.dispatch(event.clone())?;
        Ok(event)
    }

    fn emit_validation_outcome(
        &self,
        outcome: &ValidationOutcome,
        trace_id: &TraceId,
    ) -> ConductorResult<EventEnvelope> {
        let source = EventSource::new(actor_for_boundary(outcome.boundary))
            .with_operation(format!("validation:{}", outcome.boundary));
        self.push_event(EventType::ValidationOutcome, outcome, source, trace_id)
    }

    /// Record a `tool.error` for a failed remote step and hand back `error`.
    fn record_tool_error(
        &self,
        module_id: &ModuleId,
        tool_name: &str,
        edge_id: Option<&EdgeId>,
        error: ConductorError,
        operation: &str,
        trace_id: &TraceId,
    ) -> ConductorError {
        warn!(module_id = %module_id, tool = tool_name, %error, "remote step failed");
        let record = ToolErrorRecord {
            module_id: module_id.clone(),
            tool_name: tool_name.to_owned(),
            error: failure_reason(&error),
            edge_id: edge_id.cloned(),
        };
        let source = EventSource::conductor(operation).with_module(module_id);
        match self.push_event(EventType::ToolError, &record, source, trace_id) {
            Ok(_) => error,
            Err(dispatch_error) => dispatch_error,
        }
    }

    async fn client(&self, module_id: &ModuleId) -> ConductorResult<Arc<dyn ModuleTransport>> {
        if let Some(existing) = self.clients.lock().get(module_id).cloned() {
            return Ok(existing);
        }

        let state = self.store.get_state();
        let module = state
            .module(module_id)
            .ok_or_else(|| ConductorError::ModuleNotRegistered(module_id.clone()))?;
        let client = self
            .connector
            .client_for(module)
            .map_err(|error| remote(module_id, error))?;
        client
            .connect()
            .await
            .map_err(|error| remote(module_id, error))?;

        // A concurrent first call may have cached its client while this one
        // was connecting; keep theirs and close ours.
        let loser = match self.clients.lock().entry(module_id.clone()) {
            Entry::Occupied(cached) => Some((cached.get().clone(), client.clone())),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                None
            }
        };
        if let Some((cached, loser)) = loser {
            if let Err(error) = loser.close().await {
                warn!(module_id = %module_id, %error, "redundant module client close failed");
            }
            return Ok(cached);
        }
        debug!(module_id = %module_id, url = %module.url, "module client connected");
        Ok(client)
    }

    /// Register or replace a module. No connection is opened here.
    #[instrument(skip(self, registration), fields(module_id = %registration.id))]
    pub async fn register_module(
        &self,
        registration: ModuleRegistration,
    ) -> ConductorResult<RegisteredModule> {
        let trace_id = TraceId::generate();
        let module_id = registration.id.clone();
        let source = EventSource::conductor("registerModule").with_module(&module_id);

        let issues = self.validator().registration(&registration);
        if !issues.is_empty() {
            let mode = self.policy.mode(ValidationBoundary::ModuleManifest);
            let outcome = ValidationOutcome::failure(
                ValidationBoundary::ModuleManifest,
                mode,
                format!("Module manifest failed validation for \"{module_id}\"."),
                issues,
            );
            self.emit_validation_outcome(&outcome, &trace_id)?;
            if mode.blocks() {
                let reason = "manifest failed validation.".to_owned();
                self.push_event(
                    EventType::ModuleRejected,
                    &ModuleFailure {
                        module_id: module_id.clone(),
                        reason: format!("Module manifest failed validation ({mode} mode)."),
                    },
                    source,
                    &trace_id,
                )?;
                warn!("module manifest rejected");
                return Err(ConductorError::ModuleRejected { module_id, reason });
            }
            warn!(?mode, "module manifest failed validation; registering anyway");
        }

        let profile = registration.resolved_profile();
        if profile.requires_session() {
            let adapter_id = registration.transport_adapter_id.as_deref();
            let compatible = self
                .adapters
                .get(adapter_id)
                .is_some_and(|adapter| adapter.supports(profile));
            if !compatible {
                self.push_event(
                    EventType::ModuleRejected,
                    &ModuleFailure {
                        module_id: module_id.clone(),
                        reason: format!(
                            "Module requires session transport. Adapter {} is missing or incompatible.",
                            adapter_id.unwrap_or("<none>")
                        ),
                    },
                    source,
                    &trace_id,
                )?;
                warn!(adapter = ?adapter_id, "session module rejected");
                return Err(ConductorError::ModuleRejected {
                    module_id,
                    reason: "session transport requires a compatible adapter.".to_owned(),
                });
            }
        }

        let stale = self.clients.lock().remove(&module_id);
        if let Some(stale) = stale
            && let Err(error) = stale.close().await
        {
            warn!(%error, "failed closing replaced module client");
        }

        let module = RegisteredModule::from(registration);
        self.push_event(
            EventType::ModuleRegistered,
            &ModuleRegistered {
                module: module.clone(),
            },
            source,
            &trace_id,
        )?;
        info!(url = %module.url, "module registered");
        Ok(module)
    }

    /// Discover capabilities of one module, or of every registered module.
    ///
    /// A failing module records `module.error` and is left out of the result;
    /// the remaining modules still complete. Naming an unregistered module is
    /// an error.
    #[instrument(skip_all, fields(module_id = ?module_id.map(ModuleId::as_str)))]
    pub async fn discover_capabilities(
        &self,
        module_id: Option<&ModuleId>,
    ) -> ConductorResult<IndexMap<ModuleId, CapabilityInventory>> {
        let trace_id = TraceId::generate();
        let state = self.store.get_state();
        let targets: Vec<ModuleId> = match module_id {
            Some(id) if state.module(id).is_none() => {
                self.push_event(
                    EventType::ModuleError,
                    &ModuleFailure {
                        module_id: id.clone(),
                        reason: format!("Module {id} is not registered."),
                    },
                    EventSource::conductor("discoverCapabilities").with_module(id),
                    &trace_id,
                )?;
                return Err(ConductorError::ModuleNotRegistered(id.clone()));
            }
            Some(id) => vec![id.clone()],
            None => state.modules.keys().cloned().collect(),
        };

        let mut discovered = IndexMap::new();
        for id in targets {
            let source = EventSource::conductor("discoverCapabilities").with_module(&id);
            match self.discover_one(&id).await {
                Ok(capabilities) => {
                    info!(
                        module_id = %id,
                        tools = capabilities.tools.len(),
                        resources = capabilities.resources.len(),
                        "capabilities discovered"
                    );
                    self.push_event(
                        EventType::ModuleCapabilities,
                        &ModuleCapabilities {
                            module_id: id.clone(),
                            capabilities: capabilities.clone(),
                        },
                        source,
                        &trace_id,
                    )?;
                    discovered.insert(id, capabilities);
                }
                Err(error) => {
                    warn!(module_id = %id, %error, "capability discovery failed");
                    self.push_event(
                        EventType::ModuleError,
                        &ModuleFailure {
                            module_id: id.clone(),
                            reason: failure_reason(&error),
                        },
                        source,
                        &trace_id,
                    )?;
                }
            }
        }
        Ok(discovered)
    }

    async fn discover_one(&self, module_id: &ModuleId) -> ConductorResult<CapabilityInventory> {
        let client = self.client(module_id).await?;
        client
            .discover_capabilities()
            .await
            .map_err(|error| remote(module_id, error))
    }

    /// Call a UI tool, fetch its resource, and record the mounted view.
    #[instrument(
        skip(self, request),
        fields(module_id = %request.module_id, tool = %request.tool_name, mount_point = ?request.mount_point)
    )]
    pub async fn mount_view(&self, request: MountViewRequest) -> ConductorResult<MountedViewResult> {
        let trace_id = TraceId::generate();
        let module_id = request.module_id.clone();
        let tool_name = request.tool_name.clone();
        let fail = |error: ConductorError| {
            self.record_tool_error(&module_id, &tool_name, None, error, "mountView", &trace_id)
        };

        let state = self.store.get_state();
        if state.module(&module_id).is_none() {
            return Err(fail(ConductorError::ModuleNotRegistered(module_id.clone())));
        }

        let inventory = match state.inventory(&module_id) {
            Some(inventory) => inventory.clone(),
            None => {
                let mut discovered = self.discover_capabilities(Some(&module_id)).await?;
                match discovered.shift_remove(&module_id) {
                    Some(inventory) => inventory,
                    None => {
                        let reason = self
                            .store
                            .get_state()
                            .module(&module_id)
                            .and_then(|module| module.last_error.clone())
                            .unwrap_or_else(|| "capability discovery failed".to_owned());
                        return Err(ConductorError::remote(&module_id, reason));
                    }
                }
            }
        };

        let Some(tool) = inventory.tool(&tool_name) else {
            return Err(fail(ConductorError::ToolNotFound {
                module_id: module_id.clone(),
                tool: tool_name.clone(),
            }));
        };
        let Some(resource_uri) = tool.ui_resource_uri().map(str::to_owned) else {
            return Err(fail(ConductorError::UiResourceMissing {
                module_id: module_id.clone(),
                tool: tool_name.clone(),
            }));
        };

        let client = self.client(&module_id).await.map_err(&fail)?;

        self.push_event(
            EventType::ToolCall,
            &ToolCallRecord {
                module_id: module_id.clone(),
                tool_name: tool_name.clone(),
                args: request.args.clone(),
                edge_id: None,
            },
            EventSource::conductor("mountView").with_module(&module_id),
            &trace_id,
        )?;
        let tool_result = client
            .call_tool(&tool_name, request.args.clone())
            .await
            .map_err(|error| fail(remote(&module_id, error)))?;
        self.push_event(
            EventType::ToolResult,
            &ToolResultRecord {
                module_id: module_id.clone(),
                tool_name: tool_name.clone(),
                result: tool_result.clone(),
                edge_id: None,
            },
            EventSource::new(Actor::Module)
                .with_module(&module_id)
                .with_operation("mountView"),
            &trace_id,
        )?;

        let resource = client
            .read_resource(&resource_uri)
            .await
            .map_err(|error| fail(remote(&module_id, error)))?;
        let Some(first) = resource.contents.first() else {
            return Err(fail(ConductorError::remote(
                &module_id,
                format!("UI resource {resource_uri} returned no contents"),
            )));
        };
        let Some(html) = first.text.clone() else {
            return Err(fail(ConductorError::remote(
                &module_id,
                format!("UI resource {resource_uri} is missing text/html content"),
            )));
        };

        let view = MountedView {
            id: ViewId::generate(),
            module_id: module_id.clone(),
            tool_name: tool_name.clone(),
            resource_uri,
            mount_point: request.mount_point,
            created_at: Utc::now(),
        };
        self.push_event(
            EventType::ViewMounted,
            &ViewMounted { view: view.clone() },
            EventSource::new(Actor::Host)
                .with_module(&module_id)
                .with_view(&view.id)
                .with_operation("mountView"),
            &trace_id,
        )?;
        info!(view_id = %view.id, "view mounted");

        Ok(MountedViewResult {
            csp: first.ui_meta("csp").cloned(),
            permissions: first.ui_meta("permissions").cloned(),
            view,
            html,
            tool_result,
        })
    }

    /// Check an edge against `state` (the current snapshot when `None`).
    /// Records nothing.
    pub fn validate_wiring_edge(
        &self,
        edge: &WiringEdge,
        state: Option<&ConductorSnapshot>,
    ) -> Vec<ValidationOutcome> {
        let mode = self.policy.mode(ValidationBoundary::WiringEdge);
        match state {
            Some(state) => validate_wiring_edge(edge, state, mode),
            None => validate_wiring_edge(edge, &self.store.get_state(), mode),
        }
    }

    /// Validate and record a wiring edge. A blank id is replaced with a
    /// generated one; an existing id is replaced in place.
    #[instrument(skip(self, edge), fields(edge_id = %edge.id, from = %edge.from.module_id, to = %edge.to.module_id))]
    pub fn connect_ports(&self, mut edge: WiringEdge) -> ConductorResult<WiringEdge> {
        let trace_id = TraceId::generate();
        if edge.id.is_empty() {
            edge.id = EdgeId::generate();
        }
        let source = EventSource::conductor("connectPorts").with_module(&edge.from.module_id);

        let state = self.store.get_state();
        let outcomes = self.validate_wiring_edge(&edge, Some(&state));
        let failing: Vec<ValidationOutcome> = outcomes
            .iter()
            .filter(|outcome| !outcome.ok)
            .cloned()
            .collect();

        self.push_event(
            EventType::WiringValidate,
            &WiringDecision {
                edge: edge.clone(),
                outcomes: outcomes.clone(),
            },
            source.clone(),
            &trace_id,
        )?;

        if !failing.is_empty() {
            for outcome in &failing {
                self.emit_validation_outcome(outcome, &trace_id)?;
            }

            let decision = WiringDecision {
                edge: edge.clone(),
                outcomes: failing.clone(),
            };
            if failing.iter().any(ValidationOutcome::is_blocking) {
                self.push_event(EventType::WiringReject, &decision, source, &trace_id)?;
                warn!(edge = %edge.describe(), "wiring edge rejected");
                return Err(ConductorError::WiringRejected(edge.id));
            }
            self.push_event(EventType::WiringWarn, &decision, source.clone(), &trace_id)?;
            warn!(issues = failing.len(), "wiring edge accepted with warnings");
        }

        let edge = resolve_edge_schemas(edge, &state);
        self.push_event(
            EventType::WiringConnected,
            &WiringConnected { edge: edge.clone() },
            source.clone(),
            &trace_id,
        )?;
        self.push_event(
            EventType::WiringAccept,
            &WiringDecision {
                edge: edge.clone(),
                outcomes,
            },
            source,
            &trace_id,
        )?;
        info!(edge = %edge.describe(), "wiring edge connected");
        Ok(edge)
    }

    /// Plan a swap and re-home the enabled edges leaving `from_module_id`.
    ///
    /// Edges from other sources are left as they are; they already sit in
    /// state and are not re-emitted.
    #[instrument(skip_all, fields(from = %from_module_id, to = %to_module_id, %mode))]
    pub async fn swap_module(
        &self,
        from_module_id: &ModuleId,
        to_module_id: &ModuleId,
        mode: SwapMode,
    ) -> ConductorResult<SwapPlan> {
        let trace_id = TraceId::generate();
        let state = self.store.get_state();
        let source = EventSource::conductor("swapModule").with_module(from_module_id);

        let (from, to) = match (state.module(from_module_id), state.module(to_module_id)) {
            (Some(from), Some(to)) => (from, to),
            (from, _) => {
                let missing = if from.is_none() {
                    from_module_id
                } else {
                    to_module_id
                };
                self.push_event(
                    EventType::SwapReject,
                    &SwapRejected {
                        from_module_id: from_module_id.clone(),
                        to_module_id: to_module_id.clone(),
                        reason: format!("Module {missing} is not registered."),
                    },
                    source,
                    &trace_id,
                )?;
                return Err(ConductorError::ModuleNotRegistered(missing.clone()));
            }
        };

        let plan = resolve_swap_plan(from.resolved_profile(), to.resolved_profile(), mode);
        let planned = SwapPlanned {
            from_module_id: from_module_id.clone(),
            to_module_id: to_module_id.clone(),
            plan: plan.clone(),
        };
        self.push_event(EventType::SwapPlan, &planned, source.clone(), &trace_id)?;
        if plan.resolved != SwapTier::Hot {
            self.push_event(EventType::SwapFallback, &planned, source, &trace_id)?;
        }

        let rehome_source = EventSource::conductor("swapModule").with_module(to_module_id);
        let mut edge_ids = Vec::new();
        for edge in state
            .wiring
            .iter()
            .filter(|edge| edge.enabled && &edge.from.module_id == from_module_id)
        {
            let mut moved = edge.clone();
            moved.from.module_id = to_module_id.clone();
            self.push_event(
                EventType::WiringConnected,
                &WiringConnected { edge: moved },
                rehome_source.clone(),
                &trace_id,
            )?;
            edge_ids.push(edge.id.clone());
        }

        self.push_event(
            EventType::SwapApplied,
            &SwapApplied {
                from_module_id: from_module_id.clone(),
                to_module_id: to_module_id.clone(),
                resolved: plan.resolved,
                edge_ids: edge_ids.clone(),
            },
            rehome_source,
            &trace_id,
        )?;
        info!(
            resolved = %plan.resolved,
            fallback = plan.fallback_used,
            rehomed = edge_ids.len(),
            "module swapped"
        );
        Ok(plan)
    }

    /// Record a port signal and invoke every tool it routes to, in edge
    /// order. Returns the executed actions.
    #[instrument(skip(self, signal), fields(module_id = %signal.module_id, port = %signal.port))]
    pub async fn emit_port_event(&self, signal: PortSignal) -> ConductorResult<Vec<RoutedAction>> {
        let mode = self.policy.mode(ValidationBoundary::PortSignal);
        let trace_id = signal
            .trace_id
            .clone()
            .filter(|trace_id| !trace_id.is_empty())
            .unwrap_or_else(TraceId::generate);

        let issues = self.validator().port_signal(&signal);
        if !issues.is_empty() {
            let outcome = ValidationOutcome::failure(
                ValidationBoundary::PortSignal,
                mode,
                "Port signal validation failed.",
                issues,
            );
            self.emit_validation_outcome(&outcome, &trace_id)?;
            if mode.blocks() {
                return Err(ConductorError::Validation {
                    boundary: ValidationBoundary::PortSignal,
                    message: "Port signal validation failed.".to_owned(),
                });
            }
            warn!(?mode, "port signal dropped after failed validation");
            return Ok(Vec::new());
        }

        let event = self.push_event(
            EventType::PortEvent,
            &PortEvent {
                module_id: signal.module_id.clone(),
                port: signal.port.clone(),
                data: signal.data,
            },
            EventSource::new(Actor::Module)
                .with_module(&signal.module_id)
                .with_operation(format!("port:{}", signal.port)),
            &trace_id,
        )?;

        let state = self.store.get_state();
        let validator = self.validator().clone();
        let actions = route_port_event(
            &event,
            &state.wiring,
            mode,
            validator.as_ref(),
            &mut |outcome: ValidationOutcome| self.emit_validation_outcome(&outcome, &trace_id).map(|_| ()),
        )?;
        debug!(actions = actions.len(), "port event routed");

        for action in &actions {
            self.invoke_routed(action, &trace_id).await?;
        }
        Ok(actions)
    }

    async fn invoke_routed(&self, action: &RoutedAction, trace_id: &TraceId) -> ConductorResult<Value> {
        let fail = |error: ConductorError| {
            self.record_tool_error(
                &action.module_id,
                &action.tool_name,
                Some(&action.edge_id),
                error,
                "routeEvent",
                trace_id,
            )
        };
        let client = self.client(&action.module_id).await.map_err(&fail)?;

        self.push_event(
            EventType::ToolCall,
            &ToolCallRecord {
                module_id: action.module_id.clone(),
                tool_name: action.tool_name.clone(),
                args: action.args.clone(),
                edge_id: Some(action.edge_id.clone()),
            },
            EventSource::conductor("routeEvent").with_module(&action.module_id),
            trace_id,
        )?;
        let result = client
            .call_tool(&action.tool_name, action.args.clone())
            .await
            .map_err(|error| fail(remote(&action.module_id, error)))?;
        self.push_event(
            EventType::ToolResult,
            &ToolResultRecord {
                module_id: action.module_id.clone(),
                tool_name: action.tool_name.clone(),
                result: result.clone(),
                edge_id: Some(action.edge_id.clone()),
            },
            EventSource::new(Actor::Module)
                .with_module(&action.module_id)
                .with_operation("routeEvent"),
            trace_id,
        )?;
        Ok(result)
    }

    /// Inject an externally produced outcome into the trace.
    pub fn report_validation_outcome(
        &self,
        outcome: ValidationOutcome,
    ) -> ConductorResult<EventEnvelope> {
        self.emit_validation_outcome(&outcome, &TraceId::generate())
    }

    pub fn get_state(&self) -> Arc<ConductorSnapshot> {
        self.store.get_state()
    }

    pub fn get_trace(&self, limit: usize) -> Vec<EventEnvelope> {
        self.store.trace(limit)
    }

    pub fn metrics(&self) -> StoreMetrics {
        self.store.metrics()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&EventEnvelope, &ConductorSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(listener)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.store.subscribe_events()
    }

    /// Close every cached module client and flush the event sink. State and
    /// log are kept.
    pub async fn close(&self) {
        let clients: Vec<(ModuleId, Arc<dyn ModuleTransport>)> =
            self.clients.lock().drain().collect();
        for (module_id, client) in clients {
            if let Err(error) = client.close().await {
                warn!(module_id = %module_id, %error, "module client close failed");
            }
        }
        self.store.flush_sink().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use conductor_events::{ConductorStore, StoreConfig};
    use conductor_protocol::{
        CapabilityInventory, ConductorError, EventType, ModuleManifest, ModulePort,
        ModuleRegistration, ModuleStatus, MountPoint, MountViewRequest, PortRef, PortSignal,
        RuntimeProfile, SwapMode, SwapSupport, SwapTier, ToolDescriptor, ToolTarget,
        TransportMode, ValidationBoundary, ValidationMode, ValidationOutcome, ValidationPolicy,
        WiringEdge,
    };
    use conductor_transport::{
        ModuleTransport, ReadResourceResult, ResourceContents, StreamableHttpSessionAdapter,
        TransportAdapterRegistry, TransportConnector,
    };
    use conductor_protocol::{Actor, ModuleId, RegisteredModule};
    use parking_lot::Mutex;
    use serde_json::{Map, Value, json};
    use tokio::sync::Barrier;

    use super::ConductorRuntime;

    #[derive(Default)]
    struct FakeModule {
        inventory: Option<CapabilityInventory>,
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
        closed: AtomicUsize,
        fail_close: AtomicBool,
        connect_gate: Option<Arc<Barrier>>,
    }

    struct FakeTransport(Arc<FakeModule>);

    #[async_trait]
    impl ModuleTransport for FakeTransport {
        async fn connect(&self) -> Result<()> {
            if let Some(gate) = &self.0.connect_gate {
                gate.wait().await;
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.0.closed.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_close.load(Ordering::SeqCst) {
                bail!("session already torn down");
            }
            Ok(())
        }

        async fn discover_capabilities(&self) -> Result<CapabilityInventory> {
            match &self.0.inventory {
                Some(inventory) => Ok(inventory.clone()),
                None => bail!("connection refused"),
            }
        }

        async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
            self.0.calls.lock().push((name.to_owned(), args));
            Ok(json!({ "content": [{ "type": "text", "text": "ok" }] }))
        }

        async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
            Ok(ReadResourceResult {
                contents: vec![ResourceContents {
                    uri: uri.to_owned(),
                    mime_type: Some("text/html".to_owned()),
                    text: Some(format!("<main>{uri}</main>")),
                    blob: None,
                    meta: Some(json!({ "ui": { "csp": { "connectDomains": [] } } })),
                }],
            })
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        modules: HashMap<String, Arc<FakeModule>>,
    }

    impl TransportConnector for FakeConnector {
        fn client_for(&self, module: &RegisteredModule) -> Result<Arc<dyn ModuleTransport>> {
            match self.modules.get(&module.url) {
                Some(fake) => Ok(Arc::new(FakeTransport(fake.clone()))),
                None => bail!("no route to {}", module.url),
            }
        }
    }

    fn ui_tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name).with_meta(json!({ "ui": { "resourceUri": format!("ui://{name}") } }))
    }

    fn text_tool(name: &str, arg_type: &str) -> ToolDescriptor {
        ui_tool(name).with_input_schema(json!({
            "type": "object",
            "properties": { "text": { "type": arg_type } }
        }))
    }

    struct Harness {
        runtime: ConductorRuntime,
        modules: HashMap<String, Arc<FakeModule>>,
    }

    fn harness(policy: ValidationPolicy, tools: &[(&str, Option<Vec<ToolDescriptor>>)]) -> Harness {
        let mut modules = HashMap::new();
        for (id, inventory) in tools {
            modules.insert(
                format!("http://fake/{id}"),
                Arc::new(FakeModule {
                    inventory: inventory
                        .clone()
                        .map(|tools| CapabilityInventory::new(tools, Vec::new())),
                    ..FakeModule::default()
                }),
            );
        }
        let store = Arc::new(ConductorStore::new(StoreConfig {
            event_payload_mode: policy.event_payload,
            validate_state_every: 1,
            ..StoreConfig::default()
        }));
        let runtime = ConductorRuntime::new(
            store,
            policy,
            Arc::new(FakeConnector {
                modules: modules.clone(),
            }),
            TransportAdapterRegistry::with_builtin_adapters(),
        );
        Harness { runtime, modules }
    }

    fn registration(id: &str) -> ModuleRegistration {
        let manifest = ModuleManifest::new(id, "1.0.0", id.to_uppercase()).with_output(
            ModulePort::new("selectionText").with_schema(json!({ "type": "string" })),
        );
        ModuleRegistration::new(id, format!("http://fake/{id}"), manifest)
    }

    fn event_types(runtime: &ConductorRuntime) -> Vec<String> {
        runtime
            .get_state()
            .events
            .iter()
            .map(|event| event.event_type.to_string())
            .collect()
    }

    fn edge(id: &str, to: &str) -> WiringEdge {
        WiringEdge::new(
            id,
            PortRef::new("pdf", "selectionText"),
            ToolTarget::new(to, "say", "text"),
        )
    }

    async fn wired(policy: ValidationPolicy, arg_type: &str) -> Result<Harness> {
        let h = harness(
            policy,
            &[
                ("pdf", Some(vec![ui_tool("display_pdf")])),
                ("say", Some(vec![text_tool("say", arg_type)])),
                ("speak", Some(vec![text_tool("say", "string")])),
            ],
        );
        for id in ["pdf", "say", "speak"] {
            h.runtime.register_module(registration(id)).await?;
        }
        h.runtime.discover_capabilities(None).await?;
        Ok(h)
    }

    #[tokio::test]
    async fn session_modules_need_a_compatible_adapter() -> Result<()> {
        let h = harness(ValidationPolicy::default(), &[]);
        let session = RuntimeProfile {
            transport_mode: TransportMode::Session,
            ..RuntimeProfile::default()
        };

        let err = h
            .runtime
            .register_module(registration("pdf").with_profile(session.clone()))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Module pdf rejected: session transport requires a compatible adapter."
        );
        let state = h.runtime.get_state();
        assert!(state.modules.is_empty());
        assert_eq!(state.events[0].event_type, EventType::ModuleRejected);
        assert_eq!(
            state.events[0].payload["reason"],
            "Module requires session transport. Adapter <none> is missing or incompatible."
        );

        let module = h
            .runtime
            .register_module(
                registration("pdf")
                    .with_profile(session)
                    .with_adapter(StreamableHttpSessionAdapter::ID),
            )
            .await?;
        assert_eq!(module.status, ModuleStatus::Registered);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_manifest_is_rejected_under_enforce() -> Result<()> {
        let h = harness(ValidationPolicy::default(), &[]);
        let mut bad = registration("pdf");
        bad.manifest.display_name.clear();

        let err = h.runtime.register_module(bad.clone()).await.unwrap_err();
        assert!(matches!(err, ConductorError::ModuleRejected { .. }));
        assert_eq!(event_types(&h.runtime), vec!["validation.outcome", "module.rejected"]);

        let lenient = harness(
            ValidationPolicy::default().with_mode(ValidationBoundary::ModuleManifest, ValidationMode::Warn),
            &[],
        );
        let registered = lenient.runtime.register_module(bad).await?;
        assert_eq!(
            event_types(&lenient.runtime),
            vec!["validation.outcome", "module.registered"]
        );
        let state = lenient.runtime.get_state();
        assert_eq!(state.modules.get(&registered.id), Some(&registered));
        assert_eq!(state.modules[&ModuleId::from("pdf")].manifest.display_name, "");
        Ok(())
    }

    #[tokio::test]
    async fn discovery_isolates_module_failures() -> Result<()> {
        let h = harness(
            ValidationPolicy::default(),
            &[("pdf", Some(vec![ui_tool("display_pdf")])), ("broken", None)],
        );
        h.runtime.register_module(registration("pdf")).await?;
        h.runtime.register_module(registration("broken")).await?;
        h.runtime.register_module(registration("offline")).await?;

        let discovered = h.runtime.discover_capabilities(None).await?;
        assert_eq!(discovered.len(), 1);
        assert!(discovered.contains_key(&ModuleId::from("pdf")));

        let state = h.runtime.get_state();
        assert_eq!(state.modules[&ModuleId::from("pdf")].status, ModuleStatus::Connected);
        let broken = &state.modules[&ModuleId::from("broken")];
        assert_eq!(broken.status, ModuleStatus::Error);
        assert_eq!(broken.last_error.as_deref(), Some("connection refused"));
        let offline = &state.modules[&ModuleId::from("offline")];
        assert_eq!(
            offline.last_error.as_deref(),
            Some("no route to http://fake/offline")
        );

        let err = h
            .runtime
            .discover_capabilities(Some(&"ghost".into()))
            .await
            .unwrap_err();
        assert!(err.is_referential());
        Ok(())
    }

    #[tokio::test]
    async fn mount_records_call_result_and_view() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        let result = h
            .runtime
            .mount_view(
                MountViewRequest::new("pdf", "display_pdf", MountPoint::Main)
                    .with_arg("url", json!("https://example.org/a.pdf")),
            )
            .await?;
        assert_eq!(result.html, "<main>ui://display_pdf</main>");
        assert_eq!(result.csp, Some(json!({ "connectDomains": [] })));
        assert_eq!(result.view.mount_point, MountPoint::Main);

        let state = h.runtime.get_state();
        let tail: Vec<_> = state.events[state.events.len() - 3..]
            .iter()
            .map(|event| (event.event_type.to_string(), event.trace_id.clone()))
            .collect();
        assert_eq!(tail[0].0, "tool.call");
        assert_eq!(tail[1].0, "tool.result");
        assert_eq!(tail[2].0, "view.mounted");
        assert!(tail.iter().all(|(_, trace)| trace == &tail[0].1));
        assert_eq!(state.views.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn mount_without_ui_resource_fails_with_a_recorded_error() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        let err = h
            .runtime
            .mount_view(MountViewRequest::new("pdf", "missing", MountPoint::Main))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Tool missing not found for module pdf.");
        assert_eq!(
            event_types(&h.runtime).last().map(String::as_str),
            Some("tool.error")
        );
        Ok(())
    }

    #[tokio::test]
    async fn unregistered_source_never_reaches_state() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        let mut ghost = edge("e1", "say");
        ghost.from.module_id = "ghost".into();

        let err = h.runtime.connect_ports(ghost).unwrap_err();
        assert!(matches!(err, ConductorError::WiringRejected(_)));
        assert!(h.runtime.get_state().wiring.is_empty());
        let types = event_types(&h.runtime);
        assert_eq!(
            types[types.len() - 3..],
            ["wiring.validate", "validation.outcome", "wiring.reject"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn reconnecting_an_edge_replaces_it() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        let first = h.runtime.connect_ports(edge("e1", "say"))?;
        assert_eq!(first.to.schema, Some(json!({ "type": "string" })));
        h.runtime.connect_ports(edge("e1", "speak"))?;

        let state = h.runtime.get_state();
        assert_eq!(state.wiring.len(), 1);
        assert_eq!(state.wiring[0].to.module_id, "speak");

        let generated = h.runtime.connect_ports(edge("", "say"))?;
        assert!(generated.id.as_str().starts_with("edge-"));
        Ok(())
    }

    #[tokio::test]
    async fn non_enforced_findings_warn_and_connect() -> Result<()> {
        let policy = ValidationPolicy::default()
            .with_mode(ValidationBoundary::WiringEdge, ValidationMode::Warn);
        let h = wired(policy, "number").await?;
        h.runtime.connect_ports(edge("e1", "say"))?;
        let types = event_types(&h.runtime);
        assert_eq!(
            types[types.len() - 5..],
            [
                "wiring.validate",
                "validation.outcome",
                "wiring.warn",
                "wiring.connected",
                "wiring.accept"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn swap_rehomes_only_edges_from_the_swapped_module() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        h.runtime.connect_ports(edge("e1", "say"))?;
        let mut other = edge("e2", "pdf");
        other.from.module_id = "speak".into();
        other.to.tool = "display_pdf".to_owned();
        h.runtime.connect_ports(other)?;

        let plan = h
            .runtime
            .swap_module(&"pdf".into(), &"speak".into(), SwapMode::Auto)
            .await?;
        assert_eq!(plan.resolved, SwapTier::Warm);

        let state = h.runtime.get_state();
        assert_eq!(state.wiring.len(), 2);
        assert!(state.wiring.iter().all(|edge| edge.from.module_id == "speak"));
        let applied = state.events.last().map(|event| event.payload.clone());
        assert_eq!(
            applied,
            Some(json!({
                "fromModuleId": "pdf",
                "toModuleId": "speak",
                "resolved": "warm",
                "edgeIds": ["e1"]
            }))
        );
        let types = event_types(&h.runtime);
        assert_eq!(
            types[types.len() - 4..],
            ["swap.plan", "swap.fallback", "wiring.connected", "swap.applied"]
        );

        let err = h
            .runtime
            .swap_module(&"pdf".into(), &"ghost".into(), SwapMode::Cold)
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::ModuleNotRegistered(_)));
        assert_eq!(
            event_types(&h.runtime).last().map(String::as_str),
            Some("swap.reject")
        );
        Ok(())
    }

    #[tokio::test]
    async fn hot_capable_pair_swaps_without_fallback_event() -> Result<()> {
        let h = harness(ValidationPolicy::default(), &[]);
        let hot = RuntimeProfile {
            swap_support: SwapSupport {
                hot: true,
                warm: true,
                cold: true,
            },
            snapshot_tool: Some("snapshot".to_owned()),
            restore_tool: Some("restore".to_owned()),
            ..RuntimeProfile::default()
        };
        h.runtime
            .register_module(registration("a").with_profile(hot.clone()))
            .await?;
        h.runtime
            .register_module(registration("b").with_profile(hot))
            .await?;
        let plan = h
            .runtime
            .swap_module(&"a".into(), &"b".into(), SwapMode::Auto)
            .await?;
        assert_eq!(plan.resolved, SwapTier::Hot);
        assert!(!event_types(&h.runtime).contains(&"swap.fallback".to_owned()));
        Ok(())
    }

    #[tokio::test]
    async fn port_events_fan_out_with_one_trace() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        h.runtime.connect_ports(edge("e1", "say"))?;
        h.runtime.connect_ports(edge("e2", "speak"))?;

        let actions = h
            .runtime
            .emit_port_event(PortSignal::new("pdf", "selectionText", json!("hello")))
            .await?;
        assert_eq!(actions.len(), 2);
        for id in ["say", "speak"] {
            let calls = h.modules[&format!("http://fake/{id}")].calls.lock().clone();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].1["text"], "hello");
        }

        let state = h.runtime.get_state();
        let port_event = state
            .events
            .iter()
            .position(|event| event.event_type == EventType::PortEvent)
            .unwrap_or_default();
        let chain = &state.events[port_event..];
        assert_eq!(chain.len(), 5);
        assert!(chain.iter().all(|event| event.trace_id == chain[0].trace_id));
        assert_eq!(chain[1].payload["edgeId"], "e1");
        Ok(())
    }

    #[tokio::test]
    async fn schema_mismatch_blocks_calls_unless_observing() -> Result<()> {
        let enforce = ValidationPolicy::default()
            .with_mode(ValidationBoundary::WiringEdge, ValidationMode::Warn)
            .with_mode(ValidationBoundary::PortSignal, ValidationMode::Enforce);
        let h = wired(enforce, "number").await?;
        h.runtime.connect_ports(edge("e1", "say"))?;
        let actions = h
            .runtime
            .emit_port_event(PortSignal::new("pdf", "selectionText", json!("hello")))
            .await?;
        assert!(actions.is_empty());
        assert!(h.modules["http://fake/say"].calls.lock().is_empty());

        let observe = ValidationPolicy::default()
            .with_mode(ValidationBoundary::WiringEdge, ValidationMode::Observe)
            .with_mode(ValidationBoundary::PortSignal, ValidationMode::Observe);
        let h = wired(observe, "number").await?;
        h.runtime.connect_ports(edge("e1", "say"))?;
        let actions = h
            .runtime
            .emit_port_event(PortSignal::new("pdf", "selectionText", json!("hello")))
            .await?;
        assert_eq!(actions.len(), 1);
        assert_eq!(h.modules["http://fake/say"].calls.lock().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_signals_are_recorded_then_dropped_or_refused() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        let blank = PortSignal::new("pdf", "", json!("hello"));
        assert!(h.runtime.emit_port_event(blank.clone()).await?.is_empty());
        let last = h.runtime.get_trace(1);
        assert_eq!(last[0].event_type, EventType::ValidationOutcome);
        assert_eq!(last[0].payload["mode"], "warn");

        let strict = wired(
            ValidationPolicy::default()
                .with_mode(ValidationBoundary::PortSignal, ValidationMode::Enforce),
            "string",
        )
        .await?;
        let err = strict.runtime.emit_port_event(blank).await.unwrap_err();
        assert_eq!(err.to_string(), "Port signal validation failed.");
        Ok(())
    }

    #[tokio::test]
    async fn reported_outcomes_take_the_boundary_actor() -> Result<()> {
        let h = harness(ValidationPolicy::default(), &[]);
        let event = h.runtime.report_validation_outcome(ValidationOutcome::failure(
            ValidationBoundary::HostMountArgs,
            ValidationMode::Warn,
            "Mount args are not JSON.",
            Vec::new(),
        ))?;
        assert_eq!(event.source.actor, Actor::Host);
        assert_eq!(
            event.source.operation.as_deref(),
            Some("validation:host.mountArgs")
        );

        let event = h.runtime.report_validation_outcome(ValidationOutcome::failure(
            ValidationBoundary::CliFlags,
            ValidationMode::Enforce,
            "Unknown flag --x.",
            Vec::new(),
        ))?;
        assert_eq!(event.source.actor, Actor::System);
        Ok(())
    }

    #[tokio::test]
    async fn close_is_idempotent_and_keeps_state() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        h.runtime.close().await;
        h.runtime.close().await;
        assert_eq!(h.modules["http://fake/pdf"].closed.load(Ordering::SeqCst), 1);
        assert_eq!(h.runtime.get_state().modules.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn close_survives_a_failing_client() -> Result<()> {
        let h = wired(ValidationPolicy::default(), "string").await?;
        h.modules["http://fake/say"]
            .fail_close
            .store(true, Ordering::SeqCst);
        let before = h.runtime.get_state();

        h.runtime.close().await;
        h.runtime.close().await;

        for id in ["pdf", "say", "speak"] {
            let closed = h.modules[&format!("http://fake/{id}")]
                .closed
                .load(Ordering::SeqCst);
            assert_eq!(closed, 1, "{id} closed {closed} times");
        }
        assert_eq!(h.runtime.get_state(), before);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_first_connect_keeps_one_client() -> Result<()> {
        let module = Arc::new(FakeModule {
            inventory: Some(CapabilityInventory::new(vec![ui_tool("display_pdf")], Vec::new())),
            connect_gate: Some(Arc::new(Barrier::new(2))),
            ..FakeModule::default()
        });
        let runtime = ConductorRuntime::new(
            Arc::new(ConductorStore::new(StoreConfig::default())),
            ValidationPolicy::default(),
            Arc::new(FakeConnector {
                modules: HashMap::from([("http://fake/pdf".to_owned(), module.clone())]),
            }),
            TransportAdapterRegistry::with_builtin_adapters(),
        );
        runtime.register_module(registration("pdf")).await?;

        let id = ModuleId::from("pdf");
        let (first, second) = tokio::join!(runtime.client(&id), runtime.client(&id));
        let (first, second) = (first?, second?);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(module.closed.load(Ordering::SeqCst), 1);

        runtime.close().await;
        assert_eq!(module.closed.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
