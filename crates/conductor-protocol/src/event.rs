//! Event envelope and the closed event-type taxonomy.
//!
//! Forward-compatible: a `type` string the engine does not know deserializes
//! into [`EventType::Other`] and is folded as a no-op instead of failing.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::ids::{EventId, ModuleId, TraceId, ViewId};

pub const CONTRACT_VERSION: &str = "1.0.0";
pub const EVENT_KIND: &str = "conductor.event";

fn default_contract_version() -> String {
    CONTRACT_VERSION.to_owned()
}

fn default_kind() -> String {
    EVENT_KIND.to_owned()
}

/// The unit of the conductor log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default = "default_contract_version")]
    pub contract_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub trace_id: TraceId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl EventEnvelope {
    /// Create an envelope with a fresh event id and the current timestamp.
    pub fn new(
        event_type: EventType,
        payload: Value,
        source: EventSource,
        trace_id: TraceId,
    ) -> Self {
        Self {
            contract_version: default_contract_version(),
            kind: default_kind(),
            event_id: EventId::generate(),
            timestamp: Utc::now(),
            trace_id,
            event_type,
            source,
            payload,
            extensions: Map::new(),
        }
    }

    /// Create an envelope from a typed payload body.
    pub fn typed<P: Serialize>(
        event_type: EventType,
        payload: &P,
        source: EventSource,
        trace_id: TraceId,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            event_type,
            serde_json::to_value(payload)?,
            source,
            trace_id,
        ))
    }

    /// Decode the payload into its typed body.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        P::deserialize(&self.payload)
    }
}

/// Who produced an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Conductor,
    Host,
    Module,
    Agent,
    #[default]
    System,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<ModuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_id: Option<ViewId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl EventSource {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            ..Self::default()
        }
    }

    pub fn conductor(operation: impl Into<String>) -> Self {
        Self::new(Actor::Conductor).with_operation(operation)
    }

    pub fn with_module(mut self, module_id: &ModuleId) -> Self {
        self.module_id = Some(module_id.clone());
        self
    }

    pub fn with_view(mut self, view_id: &ViewId) -> Self {
        self.view_id = Some(view_id.clone());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

macro_rules! event_types {
    ($($variant:ident => $tag:literal),+ $(,)?) => {
        /// Closed set of event types the engine understands.
        ///
        /// Serialized as its dotted tag string; unknown tags map to `Other`.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum EventType {
            $($variant,)+
            Other(String),
        }

        impl EventType {
            /// Every known (non-`Other`) event type.
            pub const KNOWN: &'static [EventType] = &[$(EventType::$variant,)+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $tag,)+
                    Self::Other(tag) => tag.as_str(),
                }
            }

            pub fn parse(tag: &str) -> Self {
                match tag {
                    $($tag => Self::$variant,)+
                    other => Self::Other(other.to_owned()),
                }
            }
        }
    };
}

event_types! {
    ModuleRegistered => "module.registered",
    ModuleRejected => "module.rejected",
    ModuleError => "module.error",
    ModuleCapabilities => "module.capabilities",
    ViewMounted => "view.mounted",
    WiringConnected => "wiring.connected",
    WiringValidate => "wiring.validate",
    WiringReject => "wiring.reject",
    WiringWarn => "wiring.warn",
    WiringAccept => "wiring.accept",
    PortEvent => "port.event",
    ToolCall => "tool.call",
    ToolResult => "tool.result",
    ToolError => "tool.error",
    SwapPlan => "swap.plan",
    SwapFallback => "swap.fallback",
    SwapApplied => "swap.applied",
    SwapReject => "swap.reject",
    ValidationOutcome => "validation.outcome",
}

impl EventType {
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        Self::parse(tag)
    }
}
