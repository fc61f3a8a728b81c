use conductor_contracts::ContractValidator;
use conductor_protocol::{
    ConductorError, ConductorResult, EdgeId, EventEnvelope, EventType, ModuleId, PortEvent,
    ValidationBoundary, ValidationMode, ValidationOutcome, WiringEdge,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// One remote tool invocation produced by routing a port event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedAction {
    pub edge_id: EdgeId,
    pub module_id: ModuleId,
    pub tool_name: String,
    pub args: Map<String, Value>,
}

/// Map a `port.event` onto the enabled edges leaving its port.
///
/// Each matching edge yields one action, in edge order. Signal data is checked
/// against both endpoint schemas of every edge; a mismatch is reported
/// through `report` and the edge is skipped unless `mode` is `observe`.
/// Other event types route nowhere.
pub fn route_port_event(
    event: &EventEnvelope,
    edges: &[WiringEdge],
    mode: ValidationMode,
    validator: &dyn ContractValidator,
    report: &mut dyn FnMut(ValidationOutcome) -> ConductorResult<()>,
) -> ConductorResult<Vec<RoutedAction>> {
    if event.event_type != EventType::PortEvent {
        return Ok(Vec::new());
    }

    let issues = validator
        .event_payload(&EventType::PortEvent, &event.payload)
        .unwrap_or_default();
    if !issues.is_empty() {
        report(ValidationOutcome::failure(
            ValidationBoundary::PortSignal,
            mode,
            "Port event payload failed validation.",
            issues,
        ))?;
        if mode.blocks() {
            return Err(ConductorError::Validation {
                boundary: ValidationBoundary::PortSignal,
                message: "Port event payload failed validation.".to_owned(),
            });
        }
        return Ok(Vec::new());
    }
    let signal: PortEvent = event.decode()?;

    let mut actions = Vec::new();
    for edge in edges
        .iter()
        .filter(|edge| edge.matches_source(&signal.module_id, &signal.port))
    {
        let source_label = format!("{}:{}", edge.from.module_id, edge.from.port);
        let target_label = format!("{}:{}:{}", edge.to.module_id, edge.to.tool, edge.to.arg);
        let mut issues = validator.data(edge.from.schema.as_ref(), &signal.data, &source_label);
        issues.extend(validator.data(edge.to.schema.as_ref(), &signal.data, &target_label));

        if !issues.is_empty() {
            report(ValidationOutcome::failure(
                ValidationBoundary::PortSignal,
                mode,
                format!("Signal data does not match schema for edge \"{}\".", edge.id),
                issues,
            ))?;
            if mode != ValidationMode::Observe {
                debug!(edge_id = %edge.id, "edge skipped on schema mismatch");
                continue;
            }
        }

        let mut args = Map::new();
        args.insert(edge.to.arg.clone(), signal.data.clone());
        actions.push(RoutedAction {
            edge_id: edge.id.clone(),
            module_id: edge.to.module_id.clone(),
            tool_name: edge.to.tool.clone(),
            args,
        });
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_contracts::ShapeValidator;
    use conductor_protocol::{EventSource, PortRef, ToolTarget, TraceId};
    use serde_json::json;

    fn port_event(data: Value) -> EventEnvelope {
        EventEnvelope::new(
            EventType::PortEvent,
            json!({ "moduleId": "pdf", "port": "selectionText", "data": data }),
            EventSource::default(),
            TraceId::generate(),
        )
    }

    fn edge(id: &str, target: &str, schema: Option<Value>) -> WiringEdge {
        let mut to = ToolTarget::new(target, "say", "text");
        to.schema = schema;
        WiringEdge::new(id, PortRef::new("pdf", "selectionText"), to)
    }

    fn route(
        event: &EventEnvelope,
        edges: &[WiringEdge],
        mode: ValidationMode,
    ) -> (ConductorResult<Vec<RoutedAction>>, Vec<ValidationOutcome>) {
        let mut reported = Vec::new();
        let result = route_port_event(event, edges, mode, &ShapeValidator, &mut |outcome| {
            reported.push(outcome);
            Ok(())
        });
        (result, reported)
    }

    #[test]
    fn fans_out_in_edge_order() -> anyhow::Result<()> {
        let mut disabled = edge("e3", "mute", None);
        disabled.enabled = false;
        let mut other_port = edge("e4", "other", None);
        other_port.from.port = "pageNumber".to_owned();
        let edges = vec![
            edge("e1", "say", None),
            edge("e2", "speak", None),
            disabled,
            other_port,
        ];

        let (actions, reported) = route(&port_event(json!("hello")), &edges, ValidationMode::Enforce);
        let actions = actions?;
        assert!(reported.is_empty());
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].edge_id, "e1");
        assert_eq!(actions[0].module_id, "say");
        assert_eq!(actions[0].args["text"], "hello");
        assert_eq!(actions[1].module_id, "speak");
        Ok(())
    }

    #[test]
    fn schema_mismatch_skips_unless_observing() -> anyhow::Result<()> {
        let edges = vec![edge("e1", "say", Some(json!({ "type": "number" })))];
        let event = port_event(json!("hello"));

        for mode in [ValidationMode::Enforce, ValidationMode::Warn] {
            let (actions, reported) = route(&event, &edges, mode);
            assert!(actions?.is_empty());
            assert_eq!(reported.len(), 1);
            assert_eq!(
                reported[0].issues[0].message,
                "say:say:text expects number, received string"
            );
        }

        let (actions, reported) = route(&event, &edges, ValidationMode::Observe);
        assert_eq!(actions?.len(), 1);
        assert_eq!(reported.len(), 1);
        Ok(())
    }

    #[test]
    fn malformed_payload_raises_only_under_enforce() -> anyhow::Result<()> {
        let event = EventEnvelope::new(
            EventType::PortEvent,
            json!({ "moduleId": "pdf" }),
            EventSource::default(),
            TraceId::generate(),
        );
        let edges = vec![edge("e1", "say", None)];

        let (result, reported) = route(&event, &edges, ValidationMode::Enforce);
        assert!(matches!(result, Err(ConductorError::Validation { .. })));
        assert_eq!(reported.len(), 1);

        let (result, _) = route(&event, &edges, ValidationMode::Warn);
        assert!(result?.is_empty());
        Ok(())
    }

    #[test]
    fn other_event_types_route_nowhere() -> anyhow::Result<()> {
        let mut event = port_event(json!("hello"));
        event.event_type = EventType::ToolCall;
        let (actions, _) = route(&event, &[edge("e1", "say", None)], ValidationMode::Enforce);
        assert!(actions?.is_empty());
        Ok(())
    }
}
