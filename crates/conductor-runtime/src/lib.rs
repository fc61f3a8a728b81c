//! Conductor runtime: swap planning, wiring checks, port-event routing, and
//! the [`ConductorRuntime`] facade that ties them to the event store and to
//! remote module transports.

pub mod conductor;
pub mod router;
pub mod selection;
pub mod swap;
pub mod wiring;

pub use conductor::{ConductorRuntime, DEFAULT_TRACE_LIMIT};
pub use router::{RoutedAction, route_port_event};
pub use selection::{extract_pdf_selection, extract_selection_from_model_context};
pub use swap::resolve_swap_plan;
pub use wiring::{resolve_edge_schemas, validate_wiring_edge};
