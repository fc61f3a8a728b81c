use std::collections::HashSet;

use conductor_protocol::{
    ConductorSnapshot, EventEnvelope, EventType, ModuleRegistration, PortSignal, ValidationIssue,
};
use serde::Serialize;
use serde_json::Value;

use crate::catalog::CATALOG;
use crate::schema;
use crate::shape::{ROOT_PATH, Shape};

/// Shape-checking capability consumed by the engine.
///
/// Every method returns the ordered list of issues; an empty list means the
/// value conforms. Implementations must be pure.
pub trait ContractValidator: Send + Sync {
    /// `None` when no payload contract is registered for the event type.
    fn event_payload(
        &self,
        event_type: &EventType,
        payload: &Value,
    ) -> Option<Vec<ValidationIssue>>;

    fn envelope(&self, envelope: &EventEnvelope) -> Vec<ValidationIssue>;

    fn registration(&self, registration: &ModuleRegistration) -> Vec<ValidationIssue>;

    fn port_signal(&self, signal: &PortSignal) -> Vec<ValidationIssue>;

    /// Full public-state contract, used by the reducer self-check.
    fn snapshot(&self, snapshot: &ConductorSnapshot) -> Vec<ValidationIssue>;

    /// Primitive `type` check of runtime data against a declared schema.
    fn data(&self, schema: Option<&Value>, data: &Value, label: &str) -> Vec<ValidationIssue> {
        schema::check_value(schema, data, label).into_iter().collect()
    }
}

/// Default validator backed by the [`CATALOG`] shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeValidator;

impl ShapeValidator {
    fn check_typed<T: Serialize>(shape: &Shape, value: &T) -> Vec<ValidationIssue> {
        match serde_json::to_value(value) {
            Ok(value) => shape.check(&value),
            Err(error) => vec![ValidationIssue::new(
                ROOT_PATH,
                format!("value is not serializable: {error}"),
                "custom",
            )],
        }
    }
}

impl ContractValidator for ShapeValidator {
    fn event_payload(
        &self,
        event_type: &EventType,
        payload: &Value,
    ) -> Option<Vec<ValidationIssue>> {
        CATALOG
            .payload_shape(event_type)
            .map(|shape| shape.check(payload))
    }

    fn envelope(&self, envelope: &EventEnvelope) -> Vec<ValidationIssue> {
        Self::check_typed(&CATALOG.envelope, envelope)
    }

    fn registration(&self, registration: &ModuleRegistration) -> Vec<ValidationIssue> {
        Self::check_typed(&CATALOG.registration, registration)
    }

    fn port_signal(&self, signal: &PortSignal) -> Vec<ValidationIssue> {
        Self::check_typed(&CATALOG.port_signal, signal)
    }

    fn snapshot(&self, snapshot: &ConductorSnapshot) -> Vec<ValidationIssue> {
        let mut issues = Self::check_typed(&CATALOG.conductor_state, snapshot);

        for (key, module) in &snapshot.modules {
            if key != &module.id {
                issues.push(ValidationIssue::new(
                    format!("modules.{key}.id"),
                    format!("module keyed as {key} carries id {}", module.id),
                    "custom",
                ));
            }
        }

        let mut seen = HashSet::new();
        for (index, edge) in snapshot.wiring.iter().enumerate() {
            if !seen.insert(edge.id.as_str()) {
                issues.push(ValidationIssue::new(
                    format!("wiring.{index}.id"),
                    format!("duplicate wiring edge id {}", edge.id),
                    "custom",
                ));
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_protocol::{
        ModuleManifest, ModuleRegistration, PortRef, ToolTarget, WiringEdge,
    };
    use serde_json::json;

    #[test]
    fn registration_requires_non_empty_manifest_fields() {
        let manifest = ModuleManifest::new("pdf", "", "PDF");
        let registration = ModuleRegistration::new("pdf", "http://localhost:3001/mcp", manifest);
        let issues = ShapeValidator.registration(&registration);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "manifest.version");
        assert_eq!(issues[0].code, "too_small");
    }

    #[test]
    fn port_signal_requires_module_and_port() {
        let signal = PortSignal::new("", "selectionText", json!("hello"));
        let issues = ShapeValidator.port_signal(&signal);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "moduleId");
    }

    #[test]
    fn snapshot_check_flags_duplicate_edges() {
        let edge = WiringEdge::new(
            "e1",
            PortRef::new("pdf", "selectionText"),
            ToolTarget::new("say", "say", "text"),
        );
        let snapshot = ConductorSnapshot {
            wiring: vec![edge.clone(), edge],
            ..ConductorSnapshot::default()
        };
        let issues = ShapeValidator.snapshot(&snapshot);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "wiring.1.id");
        assert!(ShapeValidator.snapshot(&ConductorSnapshot::default()).is_empty());
    }

    #[test]
    fn data_check_uses_primitive_types() {
        let schema = json!({ "type": "number" });
        assert_eq!(ShapeValidator.data(Some(&schema), &json!("x"), "edge").len(), 1);
        assert!(ShapeValidator.data(None, &json!("x"), "edge").is_empty());
    }
}
