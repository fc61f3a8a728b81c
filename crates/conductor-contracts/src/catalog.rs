//! Shape catalog: the wire contracts of every conductor record and the
//! event-type to payload-shape dispatch table.

use std::sync::LazyLock;

use conductor_protocol::EventType;

use crate::shape::{Shape, optional, required};

const MOUNT_POINTS: &[&str] = &["main", "sidebar", "overlay", "pip", "fullscreen"];
const MODULE_STATUSES: &[&str] = &["registered", "connected", "rejected", "error"];
const ACTORS: &[&str] = &["conductor", "host", "module", "agent", "system"];
const MODES: &[&str] = &["observe", "warn", "enforce"];
const SWAP_MODES: &[&str] = &["auto", "hot", "warm", "cold"];
const SWAP_TIERS: &[&str] = &["hot", "warm", "cold"];
const BOUNDARIES: &[&str] = &[
    "cli.runtimeConfig",
    "cli.profile",
    "cli.flags",
    "host.mountArgs",
    "host.wireInput",
    "conductor.wiringEdge",
    "conductor.eventPayload",
    "conductor.portSignal",
    "conductor.moduleManifest",
];

pub struct Catalog {
    pub runtime_profile: Shape,
    pub registration: Shape,
    pub wiring_edge: Shape,
    pub port_signal: Shape,
    pub validation_outcome: Shape,
    pub envelope: Shape,
    pub conductor_state: Shape,
    module_registered: Shape,
    module_failure: Shape,
    module_capabilities: Shape,
    view_mounted: Shape,
    wiring_connected: Shape,
    wiring_decision: Shape,
    port_event: Shape,
    tool_call: Shape,
    tool_result: Shape,
    tool_error: Shape,
    swap_planned: Shape,
    swap_applied: Shape,
    swap_rejected: Shape,
}

pub static CATALOG: LazyLock<Catalog> = LazyLock::new(Catalog::build);

impl Catalog {
    /// Payload contract registered for an event type.
    ///
    /// Unknown types have no contract and are accepted as-is.
    pub fn payload_shape(&self, event_type: &EventType) -> Option<&Shape> {
        let shape = match event_type {
            EventType::ModuleRegistered => &self.module_registered,
            EventType::ModuleRejected | EventType::ModuleError => &self.module_failure,
            EventType::ModuleCapabilities => &self.module_capabilities,
            EventType::ViewMounted => &self.view_mounted,
            EventType::WiringConnected => &self.wiring_connected,
            EventType::WiringValidate
            | EventType::WiringReject
            | EventType::WiringWarn
            | EventType::WiringAccept => &self.wiring_decision,
            EventType::PortEvent => &self.port_event,
            EventType::ToolCall => &self.tool_call,
            EventType::ToolResult => &self.tool_result,
            EventType::ToolError => &self.tool_error,
            EventType::SwapPlan | EventType::SwapFallback => &self.swap_planned,
            EventType::SwapApplied => &self.swap_applied,
            EventType::SwapReject => &self.swap_rejected,
            EventType::ValidationOutcome => &self.validation_outcome,
            EventType::Other(_) => return None,
        };
        Some(shape)
    }

    fn build() -> Self {
        let runtime_profile = runtime_profile(Text::NonEmpty);
        let registration = Shape::object([
            required("id", Shape::non_empty()),
            required("url", Shape::non_empty()),
            required("manifest", manifest(Text::NonEmpty)),
            optional("profile", runtime_profile.clone()),
            optional("transportAdapterId", Shape::non_empty()),
        ]);
        // Content rules belong to `conductor.moduleManifest`; a module admitted
        // under warn or observe must still fold into state.
        let registered_module = Shape::object([
            required("id", Shape::string()),
            required("url", Shape::string()),
            required("manifest", manifest(Text::Any)),
            optional("profile", self::runtime_profile(Text::Any)),
            optional("transportAdapterId", Shape::string()),
            required("status", Shape::OneOf(MODULE_STATUSES)),
            optional("lastError", Shape::string()),
        ]);
        let inventory = Shape::object([
            required(
                "tools",
                Shape::array(Shape::object([
                    required("name", Shape::non_empty()),
                    optional("inputSchema", Shape::any_object()),
                    optional("outputSchema", Shape::any_object()),
                    optional("_meta", Shape::any_object()),
                ])),
            ),
            required(
                "resources",
                Shape::array(Shape::object([
                    required("uri", Shape::non_empty()),
                    optional("mimeType", Shape::string()),
                    optional("_meta", Shape::any_object()),
                ])),
            ),
            required(
                "prompts",
                Shape::array(Shape::object([
                    required("name", Shape::non_empty()),
                    optional("description", Shape::string()),
                ])),
            ),
            required("discoveredAt", Shape::non_empty()),
        ]);
        let wiring_edge = Shape::object([
            required("id", Shape::non_empty()),
            required(
                "from",
                Shape::object([
                    required("moduleId", Shape::non_empty()),
                    required("port", Shape::non_empty()),
                    optional("schema", Shape::any_object()),
                ]),
            ),
            required(
                "to",
                Shape::object([
                    required("moduleId", Shape::non_empty()),
                    required("tool", Shape::non_empty()),
                    required("arg", Shape::non_empty()),
                    optional("schema", Shape::any_object()),
                ]),
            ),
            optional("enabled", Shape::Boolean),
        ]);
        let mounted_view = Shape::object([
            required("id", Shape::non_empty()),
            required("moduleId", Shape::non_empty()),
            required("toolName", Shape::non_empty()),
            required("resourceUri", Shape::non_empty()),
            required("mountPoint", Shape::OneOf(MOUNT_POINTS)),
            required("createdAt", Shape::non_empty()),
        ]);
        let validation_outcome = Shape::object([
            required("boundary", Shape::OneOf(BOUNDARIES)),
            required("mode", Shape::OneOf(MODES)),
            required("ok", Shape::Boolean),
            required("message", Shape::non_empty()),
            optional(
                "issues",
                Shape::array(Shape::object([
                    required("path", Shape::non_empty()),
                    required("message", Shape::non_empty()),
                    required("code", Shape::non_empty()),
                ])),
            ),
        ]);
        let envelope = Shape::object([
            required("eventId", Shape::non_empty()),
            required("timestamp", Shape::non_empty()),
            required("traceId", Shape::non_empty()),
            required("type", Shape::non_empty()),
            optional(
                "source",
                Shape::object([
                    optional("actor", Shape::OneOf(ACTORS)),
                    optional("moduleId", Shape::string()),
                    optional("viewId", Shape::string()),
                    optional("operation", Shape::string()),
                ]),
            ),
            optional("payload", Shape::Any),
        ]);
        let conductor_state = Shape::object([
            required("modules", Shape::record(registered_module.clone())),
            required("capabilityInventory", Shape::record(inventory.clone())),
            required("wiring", Shape::array(wiring_edge.clone())),
            required("views", Shape::array(mounted_view.clone())),
            required("events", Shape::array(envelope.clone())),
        ]);
        let port_signal = Shape::object([
            required("moduleId", Shape::non_empty()),
            required("port", Shape::non_empty()),
            optional("data", Shape::Any),
            optional("traceId", Shape::non_empty()),
        ]);
        let module_pair = || {
            [
                required("fromModuleId", Shape::non_empty()),
                required("toModuleId", Shape::non_empty()),
            ]
        };

        Self {
            module_registered: Shape::object([required("module", registered_module)]),
            module_failure: Shape::object([
                required("moduleId", Shape::non_empty()),
                required("reason", Shape::non_empty()),
            ]),
            module_capabilities: Shape::object([
                required("moduleId", Shape::non_empty()),
                required("capabilities", inventory),
            ]),
            view_mounted: Shape::object([required("view", mounted_view)]),
            wiring_connected: Shape::object([required("edge", wiring_edge.clone())]),
            wiring_decision: Shape::object([
                required("edge", wiring_edge.clone()),
                required("outcomes", Shape::array(validation_outcome.clone())),
            ]),
            port_event: Shape::object([
                required("moduleId", Shape::non_empty()),
                required("port", Shape::non_empty()),
                optional("data", Shape::Any),
            ]),
            tool_call: Shape::object([
                required("moduleId", Shape::non_empty()),
                required("toolName", Shape::non_empty()),
                required("args", Shape::any_object()),
                optional("edgeId", Shape::non_empty()),
            ]),
            tool_result: Shape::object([
                required("moduleId", Shape::non_empty()),
                required("toolName", Shape::non_empty()),
                optional("result", Shape::Any),
                optional("edgeId", Shape::non_empty()),
            ]),
            tool_error: Shape::object([
                required("moduleId", Shape::non_empty()),
                required("toolName", Shape::non_empty()),
                required("error", Shape::non_empty()),
                optional("edgeId", Shape::non_empty()),
            ]),
            swap_planned: Shape::object(module_pair().into_iter().chain([
                required("requested", Shape::OneOf(SWAP_MODES)),
                required("resolved", Shape::OneOf(SWAP_TIERS)),
                required("reasons", Shape::array(Shape::string())),
                required("fallbackUsed", Shape::Boolean),
            ])),
            swap_applied: Shape::object(module_pair().into_iter().chain([
                optional("resolved", Shape::OneOf(SWAP_TIERS)),
                required("edgeIds", Shape::array(Shape::non_empty())),
            ])),
            swap_rejected: Shape::object(
                module_pair()
                    .into_iter()
                    .chain([required("reason", Shape::non_empty())]),
            ),
            runtime_profile,
            registration,
            wiring_edge,
            port_signal,
            validation_outcome,
            envelope,
            conductor_state,
        }
    }
}

/// Whether text fields must be non-empty or only strings.
#[derive(Clone, Copy)]
enum Text {
    NonEmpty,
    Any,
}

impl Text {
    fn shape(self) -> Shape {
        match self {
            Self::NonEmpty => Shape::non_empty(),
            Self::Any => Shape::string(),
        }
    }
}

fn manifest(text: Text) -> Shape {
    let display_modes = match text {
        Text::NonEmpty => Shape::non_empty_array(Shape::OneOf(MOUNT_POINTS)),
        Text::Any => Shape::array(Shape::OneOf(MOUNT_POINTS)),
    };
    Shape::object([
        required("id", text.shape()),
        required("version", text.shape()),
        required("displayName", text.shape()),
        optional(
            "views",
            Shape::array(Shape::object([
                required("resourceUri", text.shape()),
                required("displayModes", display_modes),
            ])),
        ),
        optional("outputs", Shape::array(port(text))),
        optional("inputs", Shape::array(port(text))),
        optional("stateResources", Shape::array(Shape::string())),
        optional("runtime", runtime_profile(text)),
    ])
}

fn runtime_profile(text: Text) -> Shape {
    Shape::object([
        optional("transportMode", Shape::OneOf(&["stateless", "session"])),
        optional("stateModel", Shape::OneOf(&["none", "ephemeral", "durable"])),
        optional("affinity", Shape::OneOf(&["none", "session", "instance"])),
        optional(
            "swapSupport",
            Shape::object([
                optional("hot", Shape::Boolean),
                optional("warm", Shape::Boolean),
                optional("cold", Shape::Boolean),
            ]),
        ),
        optional("snapshotTool", text.shape()),
        optional("restoreTool", text.shape()),
    ])
}

fn port(text: Text) -> Shape {
    Shape::object([
        required("name", text.shape()),
        optional("schema", Shape::any_object()),
        optional("description", Shape::string()),
    ])
}
