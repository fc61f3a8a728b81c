//! Typed payload bodies, one per event type.
//!
//! `validation.outcome` uses [`ValidationOutcome`] directly; the decision
//! events (`wiring.validate|reject|warn|accept`) share [`WiringDecision`];
//! `swap.plan` and `swap.fallback` share [`SwapPlanned`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::CapabilityInventory;
use crate::ids::{EdgeId, ModuleId};
use crate::module::RegisteredModule;
use crate::swap::{SwapPlan, SwapTier};
use crate::validation::ValidationOutcome;
use crate::view::MountedView;
use crate::wiring::WiringEdge;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRegistered {
    pub module: RegisteredModule,
}

/// Body of `module.rejected` and `module.error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFailure {
    pub module_id: ModuleId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCapabilities {
    pub module_id: ModuleId,
    pub capabilities: CapabilityInventory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewMounted {
    pub view: MountedView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WiringConnected {
    pub edge: WiringEdge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WiringDecision {
    pub edge: WiringEdge,
    pub outcomes: Vec<ValidationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortEvent {
    pub module_id: ModuleId,
    pub port: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub module_id: ModuleId,
    pub tool_name: String,
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<EdgeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultRecord {
    pub module_id: ModuleId,
    pub tool_name: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<EdgeId>,
}

/// Remote failure of a tool call or resource read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorRecord {
    pub module_id: ModuleId,
    pub tool_name: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<EdgeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPlanned {
    pub from_module_id: ModuleId,
    pub to_module_id: ModuleId,
    #[serde(flatten)]
    pub plan: SwapPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapApplied {
    pub from_module_id: ModuleId,
    pub to_module_id: ModuleId,
    pub resolved: SwapTier,
    pub edge_ids: Vec<EdgeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRejected {
    pub from_module_id: ModuleId,
    pub to_module_id: ModuleId,
    pub reason: String,
}
