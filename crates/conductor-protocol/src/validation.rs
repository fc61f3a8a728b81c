//! Validation boundaries, enforcement modes, and outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::ids::{ModuleId, TraceId};

/// How a failed check at a boundary is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Record the outcome and still take the action.
    Observe,
    /// Record the outcome and skip the action.
    Warn,
    /// Record the outcome and fail the operation.
    #[default]
    Enforce,
}

impl ValidationMode {
    pub fn blocks(self) -> bool {
        self == Self::Enforce
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Observe => "observe",
            Self::Warn => "warn",
            Self::Enforce => "enforce",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValidationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "observe" => Ok(Self::Observe),
            "warn" => Ok(Self::Warn),
            "enforce" => Ok(Self::Enforce),
            other => Err(format!("unknown validation mode {other:?}")),
        }
    }
}

/// Named checkpoint with its own enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationBoundary {
    #[serde(rename = "cli.runtimeConfig")]
    CliRuntimeConfig,
    #[serde(rename = "cli.profile")]
    CliProfile,
    #[serde(rename = "cli.flags")]
    CliFlags,
    #[serde(rename = "host.mountArgs")]
    HostMountArgs,
    #[serde(rename = "host.wireInput")]
    HostWireInput,
    #[serde(rename = "conductor.wiringEdge")]
    WiringEdge,
    #[serde(rename = "conductor.eventPayload")]
    EventPayload,
    #[serde(rename = "conductor.portSignal")]
    PortSignal,
    #[serde(rename = "conductor.moduleManifest")]
    ModuleManifest,
}

impl ValidationBoundary {
    pub const ALL: [ValidationBoundary; 9] = [
        Self::CliRuntimeConfig,
        Self::CliProfile,
        Self::CliFlags,
        Self::HostMountArgs,
        Self::HostWireInput,
        Self::WiringEdge,
        Self::EventPayload,
        Self::PortSignal,
        Self::ModuleManifest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CliRuntimeConfig => "cli.runtimeConfig",
            Self::CliProfile => "cli.profile",
            Self::CliFlags => "cli.flags",
            Self::HostMountArgs => "host.mountArgs",
            Self::HostWireInput => "host.wireInput",
            Self::WiringEdge => "conductor.wiringEdge",
            Self::EventPayload => "conductor.eventPayload",
            Self::PortSignal => "conductor.portSignal",
            Self::ModuleManifest => "conductor.moduleManifest",
        }
    }
}

impl fmt::Display for ValidationBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enforce() -> ValidationMode {
    ValidationMode::Enforce
}

fn warn() -> ValidationMode {
    ValidationMode::Warn
}

/// Per-boundary enforcement modes. Missing keys take their defaults, so a
/// partial policy document merges over [`ValidationPolicy::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    #[serde(rename = "cli.runtimeConfig", default = "enforce")]
    pub cli_runtime_config: ValidationMode,
    #[serde(rename = "cli.profile", default = "enforce")]
    pub cli_profile: ValidationMode,
    #[serde(rename = "cli.flags", default = "enforce")]
    pub cli_flags: ValidationMode,
    #[serde(rename = "host.mountArgs", default = "enforce")]
    pub host_mount_args: ValidationMode,
    #[serde(rename = "host.wireInput", default = "enforce")]
    pub host_wire_input: ValidationMode,
    #[serde(rename = "conductor.wiringEdge", default = "enforce")]
    pub wiring_edge: ValidationMode,
    #[serde(rename = "conductor.eventPayload", default = "warn")]
    pub event_payload: ValidationMode,
    #[serde(rename = "conductor.portSignal", default = "warn")]
    pub port_signal: ValidationMode,
    #[serde(rename = "conductor.moduleManifest", default = "enforce")]
    pub module_manifest: ValidationMode,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            cli_runtime_config: enforce(),
            cli_profile: enforce(),
            cli_flags: enforce(),
            host_mount_args: enforce(),
            host_wire_input: enforce(),
            wiring_edge: enforce(),
            event_payload: warn(),
            port_signal: warn(),
            module_manifest: enforce(),
        }
    }
}

impl ValidationPolicy {
    /// Every boundary set to the same mode.
    pub fn uniform(mode: ValidationMode) -> Self {
        let mut policy = Self::default();
        for boundary in ValidationBoundary::ALL {
            policy.set(boundary, mode);
        }
        policy
    }

    pub fn mode(&self, boundary: ValidationBoundary) -> ValidationMode {
        match boundary {
            ValidationBoundary::CliRuntimeConfig => self.cli_runtime_config,
            ValidationBoundary::CliProfile => self.cli_profile,
            ValidationBoundary::CliFlags => self.cli_flags,
            ValidationBoundary::HostMountArgs => self.host_mount_args,
            ValidationBoundary::HostWireInput => self.host_wire_input,
            ValidationBoundary::WiringEdge => self.wiring_edge,
            ValidationBoundary::EventPayload => self.event_payload,
            ValidationBoundary::PortSignal => self.port_signal,
            ValidationBoundary::ModuleManifest => self.module_manifest,
        }
    }

    pub fn set(&mut self, boundary: ValidationBoundary, mode: ValidationMode) {
        let slot = match boundary {
            ValidationBoundary::CliRuntimeConfig => &mut self.cli_runtime_config,
            ValidationBoundary::CliProfile => &mut self.cli_profile,
            ValidationBoundary::CliFlags => &mut self.cli_flags,
            ValidationBoundary::HostMountArgs => &mut self.host_mount_args,
            ValidationBoundary::HostWireInput => &mut self.host_wire_input,
            ValidationBoundary::WiringEdge => &mut self.wiring_edge,
            ValidationBoundary::EventPayload => &mut self.event_payload,
            ValidationBoundary::PortSignal => &mut self.port_signal,
            ValidationBoundary::ModuleManifest => &mut self.module_manifest,
        };
        *slot = mode;
    }

    pub fn with_mode(mut self, boundary: ValidationBoundary, mode: ValidationMode) -> Self {
        self.set(boundary, mode);
        self
    }
}

/// One precise finding: where, what, and a machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub code: String,
}

impl ValidationIssue {
    pub fn new(
        path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Result of one check at one boundary. Always recorded as an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub boundary: ValidationBoundary,
    pub mode: ValidationMode,
    pub ok: bool,
    pub message: String,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn failure(
        boundary: ValidationBoundary,
        mode: ValidationMode,
        message: impl Into<String>,
        issues: Vec<ValidationIssue>,
    ) -> Self {
        Self {
            boundary,
            mode,
            ok: false,
            message: message.into(),
            issues,
        }
    }

    pub fn success(
        boundary: ValidationBoundary,
        mode: ValidationMode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            boundary,
            mode,
            ok: true,
            message: message.into(),
            issues: Vec::new(),
        }
    }

    /// A failed outcome recorded under `enforce`.
    pub fn is_blocking(&self) -> bool {
        !self.ok && self.mode.blocks()
    }
}

/// Runtime data emitted on a module's output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSignal {
    pub module_id: ModuleId,
    pub port: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
}

impl PortSignal {
    pub fn new(module_id: impl Into<ModuleId>, port: impl Into<String>, data: Value) -> Self {
        Self {
            module_id: module_id.into(),
            port: port.into(),
            data,
            trace_id: None,
        }
    }

    pub fn with_trace(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_policy_warns_on_payload_and_signal() {
        let policy = ValidationPolicy::default();
        assert_eq!(
            policy.mode(ValidationBoundary::EventPayload),
            ValidationMode::Warn
        );
        assert_eq!(
            policy.mode(ValidationBoundary::PortSignal),
            ValidationMode::Warn
        );
        assert_eq!(
            policy.mode(ValidationBoundary::WiringEdge),
            ValidationMode::Enforce
        );
    }

    #[test]
    fn partial_policy_merges_over_defaults() {
        let policy: ValidationPolicy =
            serde_json::from_value(json!({ "conductor.wiringEdge": "observe" })).unwrap();
        assert_eq!(policy.wiring_edge, ValidationMode::Observe);
        assert_eq!(policy.event_payload, ValidationMode::Warn);
        assert_eq!(policy.cli_flags, ValidationMode::Enforce);
    }

    #[test]
    fn uniform_policy_sets_every_boundary() {
        let policy = ValidationPolicy::uniform(ValidationMode::Observe);
        for boundary in ValidationBoundary::ALL {
            assert_eq!(policy.mode(boundary), ValidationMode::Observe);
        }
    }

    #[test]
    fn boundary_serializes_as_dotted_name() {
        let json = serde_json::to_string(&ValidationBoundary::PortSignal).unwrap();
        assert_eq!(json, "\"conductor.portSignal\"");
        assert_eq!(ValidationBoundary::PortSignal.to_string(), "conductor.portSignal");
    }
}
