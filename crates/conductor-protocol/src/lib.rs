//! # conductor-protocol: shared contract for the module conductor
//!
//! Types that every conductor crate depends on: ids, the event envelope and
//! its closed type tag, typed payloads, module/profile/inventory records,
//! wiring edges, mounted views, validation outcomes, swap plans, and the
//! materialized snapshot.
//!
//! The crate carries no runtime dependencies (no tokio, no HTTP client) so it
//! can be shared by hosts, tooling, and the engine alike.
//!
//! ## Module Overview
//!
//! - [`ids`]: typed id wrappers with `<prefix>-<uuid>` generation
//! - [`event`]: EventEnvelope, EventType (forward-compatible), EventSource
//! - [`payload`]: typed payload bodies keyed by event type
//! - [`module`]: ModuleManifest, RuntimeProfile, RegisteredModule
//! - [`capability`]: CapabilityInventory and remote tool/resource/prompt descriptors
//! - [`wiring`]: WiringEdge and endpoint specifier parsing
//! - [`view`]: MountedView, MountPoint, mount request/result
//! - [`validation`]: boundaries, modes, policy, outcomes, issues
//! - [`swap`]: SwapMode, SwapPlan
//! - [`state`]: ConductorSnapshot, StoreMetrics
//! - [`error`]: ConductorError, ConductorResult

pub mod capability;
pub mod error;
pub mod event;
pub mod ids;
pub mod module;
pub mod payload;
pub mod state;
pub mod swap;
pub mod validation;
pub mod view;
pub mod wiring;

pub use capability::{CapabilityInventory, PromptDescriptor, ResourceDescriptor, ToolDescriptor};
pub use error::{ConductorError, ConductorResult};
pub use event::{Actor, CONTRACT_VERSION, EVENT_KIND, EventEnvelope, EventSource, EventType};
pub use ids::{EdgeId, EventId, ModuleId, TraceId, ViewId};
pub use module::{
    Affinity, ModuleManifest, ModulePort, ModuleRegistration, ModuleStatus, ModuleView,
    RegisteredModule, RuntimeProfile, StateModel, SwapSupport, TransportMode,
};
pub use payload::{
    ModuleCapabilities, ModuleFailure, ModuleRegistered, PortEvent, SwapApplied, SwapPlanned,
    SwapRejected, ToolCallRecord, ToolErrorRecord, ToolResultRecord, ViewMounted, WiringConnected,
    WiringDecision,
};
pub use state::{ConductorSnapshot, StoreMetrics};
pub use swap::{SwapMode, SwapPlan, SwapTier};
pub use validation::{
    PortSignal, ValidationBoundary, ValidationIssue, ValidationMode, ValidationOutcome,
    ValidationPolicy,
};
pub use view::{MountPoint, MountViewRequest, MountedView, MountedViewResult};
pub use wiring::{PortRef, ToolTarget, WiringEdge};
