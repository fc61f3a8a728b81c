//! The materialized read view of the conductor log.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityInventory;
use crate::event::EventEnvelope;
use crate::ids::{EdgeId, ModuleId};
use crate::module::RegisteredModule;
use crate::view::MountedView;
use crate::wiring::WiringEdge;

/// Snapshot of conductor state. Derived purely by folding the event log.
///
/// Maps keep registration order so serialized snapshots are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorSnapshot {
    #[serde(default)]
    pub modules: IndexMap<ModuleId, RegisteredModule>,
    #[serde(default)]
    pub capability_inventory: IndexMap<ModuleId, CapabilityInventory>,
    #[serde(default)]
    pub wiring: Vec<WiringEdge>,
    #[serde(default)]
    pub views: Vec<MountedView>,
    #[serde(default)]
    pub events: Vec<EventEnvelope>,
}

impl ConductorSnapshot {
    pub fn module(&self, module_id: &ModuleId) -> Option<&RegisteredModule> {
        self.modules.get(module_id)
    }

    pub fn inventory(&self, module_id: &ModuleId) -> Option<&CapabilityInventory> {
        self.capability_inventory.get(module_id)
    }

    pub fn edge(&self, edge_id: &EdgeId) -> Option<&WiringEdge> {
        self.wiring.iter().find(|edge| &edge.id == edge_id)
    }
}

/// Counters exposed by the store for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetrics {
    pub dispatch_count: u64,
    pub event_count: usize,
    pub last_validation_dispatch: u64,
    pub snapshot_version: u64,
    pub last_snapshot_bytes: usize,
}
