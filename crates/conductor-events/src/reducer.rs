//! Pure fold from events to conductor state.
//!
//! [`reduce`] touches only the materialized fields (modules, inventories,
//! wiring, views). The retained event window belongs to the log and is
//! attached when a snapshot is built.

use conductor_protocol::{
    ConductorSnapshot, EventEnvelope, EventType, ModuleCapabilities, ModuleFailure,
    ModuleRegistered, ModuleStatus, ViewMounted, WiringConnected,
};

/// Apply one event. Unknown types and audit-only types are no-ops, as are
/// payloads that do not decode into their typed body.
pub fn reduce(mut state: ConductorSnapshot, event: &EventEnvelope) -> ConductorSnapshot {
    match event.event_type {
        EventType::ModuleRegistered => {
            if let Ok(ModuleRegistered { module }) = event.decode() {
                state.modules.insert(module.id.clone(), module);
            }
        }
        EventType::ModuleRejected => mark_failed(&mut state, event, ModuleStatus::Rejected),
        EventType::ModuleError => mark_failed(&mut state, event, ModuleStatus::Error),
        EventType::ModuleCapabilities => {
            if let Ok(ModuleCapabilities {
                module_id,
                capabilities,
            }) = event.decode()
            {
                if let Some(module) = state.modules.get_mut(&module_id) {
                    module.status = ModuleStatus::Connected;
                    module.last_error = None;
                }
                state.capability_inventory.insert(module_id, capabilities);
            }
        }
        EventType::WiringConnected => {
            if let Ok(WiringConnected { edge }) = event.decode() {
                match state.wiring.iter_mut().find(|existing| existing.id == edge.id) {
                    Some(existing) => *existing = edge,
                    None => state.wiring.push(edge),
                }
            }
        }
        EventType::ViewMounted => {
            if let Ok(ViewMounted { view }) = event.decode() {
                state.views.push(view);
            }
        }
        _ => {}
    }
    state
}

fn mark_failed(state: &mut ConductorSnapshot, event: &EventEnvelope, status: ModuleStatus) {
    if let Ok(ModuleFailure { module_id, reason }) = event.decode()
        && let Some(module) = state.modules.get_mut(&module_id)
    {
        module.status = status;
        module.last_error = Some(reason);
    }
}

/// Fold `events` from the empty snapshot; the result carries `events` as its
/// retained window.
pub fn replay<'a>(events: impl IntoIterator<Item = &'a EventEnvelope>) -> ConductorSnapshot {
    let mut retained = Vec::new();
    let mut state = ConductorSnapshot::default();
    for event in events {
        state = reduce(state, event);
        retained.push(event.clone());
    }
    state.events = retained;
    state
}
