//! Remotely discovered capabilities of a module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            output_schema: None,
            meta: None,
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// The UI resource this tool renders into, if it declares one.
    ///
    /// Reads `_meta.ui.resourceUri`, falling back to the legacy flat
    /// `_meta["ui/resourceUri"]` key.
    pub fn ui_resource_uri(&self) -> Option<&str> {
        let meta = self.meta.as_ref()?;
        meta.get("ui")
            .and_then(|ui| ui.get("resourceUri"))
            .and_then(Value::as_str)
            .or_else(|| meta.get("ui/resourceUri").and_then(Value::as_str))
            .filter(|uri| !uri.is_empty())
    }

    /// Schema declared for one argument in `inputSchema.properties`.
    pub fn argument_schema(&self, arg: &str) -> Option<&Value> {
        self.input_schema
            .as_ref()?
            .get("properties")?
            .get(arg)
            .filter(|schema| schema.is_object())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Snapshot of one module's tools, resources and prompts.
///
/// Replaced wholesale on every successful discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInventory {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub prompts: Vec<PromptDescriptor>,
    pub discovered_at: DateTime<Utc>,
}

impl CapabilityInventory {
    pub fn new(tools: Vec<ToolDescriptor>, resources: Vec<ResourceDescriptor>) -> Self {
        Self {
            tools,
            resources,
            prompts: Vec::new(),
            discovered_at: Utc::now(),
        }
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ui_resource_uri_prefers_nested_key() {
        let tool = ToolDescriptor::new("display_pdf").with_meta(json!({
            "ui": { "resourceUri": "ui://pdf/viewer" },
            "ui/resourceUri": "ui://pdf/legacy"
        }));
        assert_eq!(tool.ui_resource_uri(), Some("ui://pdf/viewer"));
    }

    #[test]
    fn ui_resource_uri_falls_back_to_legacy_key() {
        let tool = ToolDescriptor::new("say").with_meta(json!({ "ui/resourceUri": "ui://say" }));
        assert_eq!(tool.ui_resource_uri(), Some("ui://say"));
        assert_eq!(ToolDescriptor::new("plain").ui_resource_uri(), None);
    }

    #[test]
    fn argument_schema_reads_input_properties() {
        let tool = ToolDescriptor::new("say").with_input_schema(json!({
            "type": "object",
            "properties": { "text": { "type": "string" } }
        }));
        assert_eq!(
            tool.argument_schema("text"),
            Some(&json!({ "type": "string" }))
        );
        assert!(tool.argument_schema("voice").is_none());
    }
}
