//! Wiring edges: bindings from an output port to a tool argument.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EdgeId, ModuleId};
use crate::validation::ValidationIssue;

/// Source side of an edge: `module:port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRef {
    pub module_id: ModuleId,
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl PortRef {
    pub fn new(module_id: impl Into<ModuleId>, port: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            port: port.into(),
            schema: None,
        }
    }

    /// Parse a `module:port` specifier.
    pub fn parse(spec: &str) -> Result<Self, ValidationIssue> {
        match split_specifier(spec, 2).as_deref() {
            Some([module_id, port]) => Ok(Self::new(*module_id, *port)),
            _ => Err(ValidationIssue::new(
                "<root>",
                "Expected module:port",
                "invalid_string",
            )),
        }
    }
}

/// Target side of an edge: `module:tool:arg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolTarget {
    pub module_id: ModuleId,
    pub tool: String,
    pub arg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ToolTarget {
    pub fn new(
        module_id: impl Into<ModuleId>,
        tool: impl Into<String>,
        arg: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            tool: tool.into(),
            arg: arg.into(),
            schema: None,
        }
    }

    /// Parse a `module:tool:arg` specifier.
    pub fn parse(spec: &str) -> Result<Self, ValidationIssue> {
        match split_specifier(spec, 3).as_deref() {
            Some([module_id, tool, arg]) => Ok(Self::new(*module_id, *tool, *arg)),
            _ => Err(ValidationIssue::new(
                "<root>",
                "Expected module:tool:arg",
                "invalid_string",
            )),
        }
    }
}

fn split_specifier(spec: &str, parts: usize) -> Option<Vec<&str>> {
    let pieces: Vec<&str> = spec.split(':').collect();
    (pieces.len() == parts && pieces.iter().all(|piece| !piece.trim().is_empty()))
        .then_some(pieces)
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WiringEdge {
    /// Blank ids are replaced with a generated one on connect.
    #[serde(default)]
    pub id: EdgeId,
    pub from: PortRef,
    pub to: ToolTarget,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl WiringEdge {
    pub fn new(id: impl Into<EdgeId>, from: PortRef, to: ToolTarget) -> Self {
        Self {
            id: id.into(),
            from,
            to,
            enabled: true,
        }
    }

    pub fn matches_source(&self, module_id: &ModuleId, port: &str) -> bool {
        self.enabled && &self.from.module_id == module_id && self.from.port == port
    }

    /// `module:port -> module:tool:arg`, used in logs and CLI output.
    pub fn describe(&self) -> String {
        format!(
            "{}:{} -> {}:{}:{}",
            self.from.module_id, self.from.port, self.to.module_id, self.to.tool, self.to.arg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn specifiers_parse() {
        let from = PortRef::parse("pdf:selectionText").unwrap();
        assert_eq!(from.module_id, "pdf");
        assert_eq!(from.port, "selectionText");

        let to = ToolTarget::parse("say:say:text").unwrap();
        assert_eq!(to.module_id, "say");
        assert_eq!(to.tool, "say");
        assert_eq!(to.arg, "text");
    }

    #[test]
    fn malformed_specifiers_report_issue() {
        let issue = PortRef::parse("pdf").unwrap_err();
        assert_eq!(issue.message, "Expected module:port");
        assert!(ToolTarget::parse("say::text").is_err());
        assert!(ToolTarget::parse("a:b:c:d").is_err());
    }

    #[test]
    fn edge_defaults_to_enabled() {
        let edge: WiringEdge = serde_json::from_value(json!({
            "id": "e1",
            "from": { "moduleId": "pdf", "port": "selectionText" },
            "to": { "moduleId": "say", "tool": "say", "arg": "text" }
        }))
        .unwrap();
        assert!(edge.enabled);
        assert!(edge.matches_source(&ModuleId::from("pdf"), "selectionText"));
        assert_eq!(edge.describe(), "pdf:selectionText -> say:say:text");
    }
}
