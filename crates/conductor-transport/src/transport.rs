use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use conductor_protocol::{CapabilityInventory, RegisteredModule};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mcp::{McpClientConfig, McpHttpClient};

/// One content block returned by `resources/read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ResourceContents {
    /// `_meta.ui.<key>` of this content block.
    pub fn ui_meta(&self, key: &str) -> Option<&Value> {
        self.meta.as_ref()?.get("ui")?.get(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
}

/// Connection to one remote module.
///
/// Implementations connect lazily: every remote operation connects first if
/// needed. `close` must be idempotent and tolerate a failed connection.
#[async_trait]
pub trait ModuleTransport: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    async fn discover_capabilities(&self) -> Result<CapabilityInventory>;
    async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Value>;
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult>;
}

/// Builds a transport for a registered module.
pub trait TransportConnector: Send + Sync {
    fn client_for(&self, module: &RegisteredModule) -> Result<Arc<dyn ModuleTransport>>;
}

/// Default connector: one MCP Streamable-HTTP client per module url.
#[derive(Debug, Clone, Default)]
pub struct HttpTransportConnector {
    config: McpClientConfig,
}

impl HttpTransportConnector {
    pub fn new(config: McpClientConfig) -> Self {
        Self { config }
    }
}

impl TransportConnector for HttpTransportConnector {
    fn client_for(&self, module: &RegisteredModule) -> Result<Arc<dyn ModuleTransport>> {
        Ok(Arc::new(McpHttpClient::new(&module.url, self.config.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_contents_decode_ui_meta() {
        let result: ReadResourceResult = serde_json::from_value(json!({
            "contents": [{
                "uri": "ui://pdf/viewer",
                "mimeType": "text/html;profile=mcp-app",
                "text": "<html></html>",
                "_meta": { "ui": { "csp": { "connectDomains": ["https://cdn"] } } }
            }]
        }))
        .unwrap();
        let first = &result.contents[0];
        assert_eq!(first.text.as_deref(), Some("<html></html>"));
        assert_eq!(
            first.ui_meta("csp"),
            Some(&json!({ "connectDomains": ["https://cdn"] }))
        );
        assert!(first.ui_meta("permissions").is_none());
    }
}
