//! Wiring edge checks against the current snapshot.

use conductor_contracts::{schema_type, types_compatible};
use conductor_protocol::{
    ConductorSnapshot, ValidationBoundary, ValidationIssue, ValidationMode, ValidationOutcome,
    WiringEdge,
};

fn outcome(mode: ValidationMode, message: String, issue: ValidationIssue) -> ValidationOutcome {
    ValidationOutcome::failure(ValidationBoundary::WiringEdge, mode, message, vec![issue])
}

/// Check `edge` against `state`.
///
/// Missing endpoints (source module, target module, target tool) stop the
/// check with a single `enforce` outcome. The other findings accumulate.
/// `mode` is the configured `conductor.wiringEdge` boundary mode and governs
/// the port and schema findings. No events are recorded.
pub fn validate_wiring_edge(
    edge: &WiringEdge,
    state: &ConductorSnapshot,
    mode: ValidationMode,
) -> Vec<ValidationOutcome> {
    let mut outcomes = Vec::new();

    let Some(source) = state.module(&edge.from.module_id) else {
        outcomes.push(outcome(
            ValidationMode::Enforce,
            format!("Source module \"{}\" is not registered.", edge.from.module_id),
            ValidationIssue::new("from.moduleId", "Unknown source module.", "source_module_missing"),
        ));
        return outcomes;
    };

    if state.module(&edge.to.module_id).is_none() {
        outcomes.push(outcome(
            ValidationMode::Enforce,
            format!("Target module \"{}\" is not registered.", edge.to.module_id),
            ValidationIssue::new("to.moduleId", "Unknown target module.", "target_module_missing"),
        ));
        return outcomes;
    }

    let source_port = source.manifest.output(&edge.from.port);
    if source_port.is_none() {
        outcomes.push(outcome(
            mode,
            format!(
                "Source port \"{}\" is not declared by module \"{}\".",
                edge.from.port, edge.from.module_id
            ),
            ValidationIssue::new(
                "from.port",
                "Unknown output port in source module manifest.",
                "source_port_missing",
            ),
        ));
    }

    let inventory = state.inventory(&edge.to.module_id);
    let target_tool = match inventory {
        None => {
            outcomes.push(outcome(
                ValidationMode::Warn,
                format!(
                    "Target module \"{}\" has no discovered capability inventory.",
                    edge.to.module_id
                ),
                ValidationIssue::new(
                    "to.moduleId",
                    "Run capability discovery before wiring this edge.",
                    "target_inventory_missing",
                ),
            ));
            None
        }
        Some(inventory) => {
            let Some(tool) = inventory.tool(&edge.to.tool) else {
                outcomes.push(outcome(
                    ValidationMode::Enforce,
                    format!(
                        "Target tool \"{}\" is not available on module \"{}\".",
                        edge.to.tool, edge.to.module_id
                    ),
                    ValidationIssue::new(
                        "to.tool",
                        "Unknown target tool in discovered capability inventory.",
                        "target_tool_missing",
                    ),
                ));
                return outcomes;
            };
            Some(tool)
        }
    };

    let source_schema = edge
        .from
        .schema
        .as_ref()
        .or_else(|| source_port.and_then(|port| port.schema.as_ref()));
    let target_schema = edge
        .to
        .schema
        .as_ref()
        .or_else(|| target_tool.and_then(|tool| tool.argument_schema(&edge.to.arg)));

    let source_type = schema_type(source_schema);
    let target_type = schema_type(target_schema);
    if !types_compatible(source_type, target_type) {
        outcomes.push(outcome(
            mode,
            format!("Schema mismatch for edge \"{}\" from {}.", edge.id, edge.describe()),
            ValidationIssue::new(
                "from.schema",
                format!(
                    "Source type \"{}\" does not match target type \"{}\".",
                    source_type.unwrap_or("unknown"),
                    target_type.unwrap_or("unknown")
                ),
                "schema_mismatch",
            ),
        ));
    }

    outcomes
}

/// Fill the edge's missing endpoint schemas from the source port declaration
/// and the target tool's argument schema, so routing checks data against them.
pub fn resolve_edge_schemas(mut edge: WiringEdge, state: &ConductorSnapshot) -> WiringEdge {
    if edge.from.schema.is_none() {
        edge.from.schema = state
            .module(&edge.from.module_id)
            .and_then(|module| module.manifest.output(&edge.from.port))
            .and_then(|port| port.schema.clone());
    }
    if edge.to.schema.is_none() {
        edge.to.schema = state
            .inventory(&edge.to.module_id)
            .and_then(|inventory| inventory.tool(&edge.to.tool))
            .and_then(|tool| tool.argument_schema(&edge.to.arg))
            .cloned();
    }
    edge
}
