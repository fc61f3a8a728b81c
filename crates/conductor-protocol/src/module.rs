//! Module manifests, runtime profiles, and registered module records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ModuleId;
use crate::view::MountPoint;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Stateless,
    Session,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateModel {
    #[default]
    None,
    Ephemeral,
    Durable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    #[default]
    None,
    Session,
    Instance,
}

fn yes() -> bool {
    true
}

/// Continuity tiers a module can participate in. Cold is always available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSupport {
    #[serde(default)]
    pub hot: bool,
    #[serde(default = "yes")]
    pub warm: bool,
    #[serde(default = "yes")]
    pub cold: bool,
}

impl Default for SwapSupport {
    fn default() -> Self {
        Self {
            hot: false,
            warm: true,
            cold: true,
        }
    }
}

/// How a module may be operated. Compared pairwise by the swap planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeProfile {
    #[serde(default)]
    pub transport_mode: TransportMode,
    #[serde(default)]
    pub state_model: StateModel,
    #[serde(default)]
    pub affinity: Affinity,
    #[serde(default)]
    pub swap_support: SwapSupport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_tool: Option<String>,
}

impl RuntimeProfile {
    pub fn requires_session(&self) -> bool {
        self.transport_mode == TransportMode::Session
    }

    /// Hot swap needs the flag plus both snapshot and restore tool names.
    pub fn hot_capable(&self) -> bool {
        self.swap_support.hot
            && self.snapshot_tool.as_deref().is_some_and(|t| !t.is_empty())
            && self.restore_tool.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn warm_capable(&self) -> bool {
        self.swap_support.warm
    }
}

/// A named data channel declared by a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePort {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModulePort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            description: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleView {
    pub resource_uri: String,
    pub display_modes: Vec<MountPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    pub id: String,
    pub version: String,
    pub display_name: String,
    #[serde(default)]
    pub views: Vec<ModuleView>,
    #[serde(default)]
    pub outputs: Vec<ModulePort>,
    #[serde(default)]
    pub inputs: Vec<ModulePort>,
    #[serde(default)]
    pub state_resources: Vec<String>,
    #[serde(default)]
    pub runtime: RuntimeProfile,
}

impl ModuleManifest {
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            display_name: display_name.into(),
            views: Vec::new(),
            outputs: Vec::new(),
            inputs: Vec::new(),
            state_resources: Vec::new(),
            runtime: RuntimeProfile::default(),
        }
    }

    pub fn with_output(mut self, port: ModulePort) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn with_input(mut self, port: ModulePort) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeProfile) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn output(&self, name: &str) -> Option<&ModulePort> {
        self.outputs.iter().find(|port| port.name == name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    #[default]
    Registered,
    Connected,
    Rejected,
    Error,
}

/// Input to `register_module`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRegistration {
    pub id: ModuleId,
    pub url: String,
    pub manifest: ModuleManifest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<RuntimeProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_adapter_id: Option<String>,
}

impl ModuleRegistration {
    pub fn new(id: impl Into<ModuleId>, url: impl Into<String>, manifest: ModuleManifest) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            manifest,
            profile: None,
            transport_adapter_id: None,
        }
    }

    pub fn with_profile(mut self, profile: RuntimeProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.transport_adapter_id = Some(adapter_id.into());
        self
    }

    /// The override profile if supplied, otherwise the manifest's runtime.
    pub fn resolved_profile(&self) -> &RuntimeProfile {
        self.profile.as_ref().unwrap_or(&self.manifest.runtime)
    }
}

/// A module as held in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredModule {
    pub id: ModuleId,
    pub url: String,
    pub manifest: ModuleManifest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<RuntimeProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_adapter_id: Option<String>,
    #[serde(default)]
    pub status: ModuleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RegisteredModule {
    pub fn resolved_profile(&self) -> &RuntimeProfile {
        self.profile.as_ref().unwrap_or(&self.manifest.runtime)
    }
}

impl From<ModuleRegistration> for RegisteredModule {
    fn from(registration: ModuleRegistration) -> Self {
        Self {
            id: registration.id,
            url: registration.url,
            manifest: registration.manifest,
            profile: registration.profile,
            transport_adapter_id: registration.transport_adapter_id,
            status: ModuleStatus::Registered,
            last_error: None,
        }
    }
}
