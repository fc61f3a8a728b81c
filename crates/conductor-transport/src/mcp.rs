//! MCP client over the Streamable-HTTP transport, built on `rmcp`.
//!
//! The session is opened lazily by the first remote operation and kept until
//! [`ModuleTransport::close`]. Every request is bounded by the configured timeout.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use conductor_protocol::CapabilityInventory;
use rmcp::model::{CallToolRequestParams, ClientInfo, ReadResourceRequestParams};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::transport::{ModuleTransport, ReadResourceResult};

type ClientService = RunningService<RoleClient, ClientInfo>;

#[derive(Debug, Clone)]
pub struct McpClientConfig {
    pub timeout: Duration,
    pub client_name: String,
    pub client_version: String,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            client_name: "mcp-app-conductor".to_owned(),
            client_version: "0.1.0".to_owned(),
        }
    }
}

pub struct McpHttpClient {
    url: String,
    config: McpClientConfig,
    service: Mutex<Option<ClientService>>,
}

impl fmt::Debug for McpHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpHttpClient")
            .field("url", &self.url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl McpHttpClient {
    pub fn new(url: impl Into<String>, config: McpClientConfig) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            bail!("module url is empty");
        }
        Ok(Self {
            url,
            config,
            service: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn is_connected(&self) -> bool {
        self.service.lock().await.is_some()
    }

    fn client_info(&self) -> ClientInfo {
        let mut info = ClientInfo::default();
        info.client_info.name = self.config.client_name.clone();
        info.client_info.version = self.config.client_version.clone();
        info
    }

    /// Peer handle of the open session, initializing it on first use.
    ///
    /// The lock is held across initialization so concurrent callers share
    /// one session.
    async fn peer(&self) -> Result<Peer<RoleClient>> {
        let mut service = self.service.lock().await;
        if let Some(running) = service.as_ref() {
            return Ok(running.peer().clone());
        }

        let transport = StreamableHttpClientTransport::from_uri(self.url.as_str());
        let running = self
            .bounded("initialize", self.client_info().serve(transport))
            .await?;
        debug!(url = %self.url, "mcp session initialized");
        let peer = running.peer().clone();
        *service = Some(running);
        Ok(peer)
    }

    async fn bounded<T, E>(
        &self,
        method: &str,
        request: impl Future<Output = Result<T, E>>,
    ) -> Result<T>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        tokio::time::timeout(self.config.timeout, request)
            .await
            .with_context(|| format!("{method} to {} timed out", self.url))?
            .with_context(|| format!("{method} to {} failed", self.url))
    }
}

/// Re-shape `rmcp` model values into the conductor's wire descriptors.
///
/// Both sides share the MCP JSON encoding, so `_meta` and schemas carry over
/// untouched.
fn descriptors<S, T>(items: Vec<S>, kind: &str) -> Result<Vec<T>>
where
    S: Serialize,
    T: DeserializeOwned,
{
    items
        .into_iter()
        .map(|item| {
            serde_json::to_value(item)
                .and_then(serde_json::from_value)
                .with_context(|| format!("malformed {kind} entry"))
        })
        .collect()
}

#[async_trait]
impl ModuleTransport for McpHttpClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> Result<()> {
        self.peer().await.map(|_| ())
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn close(&self) -> Result<()> {
        let Some(running) = self.service.lock().await.take() else {
            return Ok(());
        };
        match running.cancel().await {
            Ok(reason) => debug!(?reason, "mcp session closed"),
            Err(error) => warn!(%error, "failed shutting down mcp session"),
        }
        Ok(())
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn discover_capabilities(&self) -> Result<CapabilityInventory> {
        let peer = self.peer().await?;
        let tools = self.bounded("tools/list", peer.list_all_tools()).await?;
        let resources = self
            .bounded("resources/list", peer.list_all_resources())
            .await?;
        let prompts = match self.bounded("prompts/list", peer.list_all_prompts()).await {
            Ok(prompts) => prompts,
            Err(error) => {
                debug!(error = %format!("{error:#}"), "prompts unavailable");
                Vec::new()
            }
        };

        let mut inventory = CapabilityInventory::new(
            descriptors(tools, "tools/list")?,
            descriptors(resources, "resources/list")?,
        );
        inventory.prompts = descriptors(prompts, "prompts/list")?;
        Ok(inventory)
    }

    #[instrument(skip(self, args), fields(url = %self.url))]
    async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        let peer = self.peer().await?;
        let result = self
            .bounded(
                "tools/call",
                peer.call_tool(CallToolRequestParams {
                    meta: None,
                    name: name.to_owned().into(),
                    arguments: Some(args),
                    task: None,
                }),
            )
            .await?;
        serde_json::to_value(result).context("failed encoding tools/call result")
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        let peer = self.peer().await?;
        let params: ReadResourceRequestParams =
            serde_json::from_value(json!({ "uri": uri })).context("invalid resource uri")?;
        let result = self
            .bounded("resources/read", peer.read_resource(params))
            .await?;
        serde_json::to_value(result)
            .and_then(serde_json::from_value)
            .context("malformed resources/read response")
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use conductor_protocol::{PromptDescriptor, ResourceDescriptor, ToolDescriptor};
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_descriptors_keep_ui_meta_and_schema() -> Result<()> {
        let tools: Vec<rmcp::model::Tool> = vec![serde_json::from_value(json!({
            "name": "display_pdf",
            "description": "Show a PDF",
            "inputSchema": {
                "type": "object",
                "properties": { "url": { "type": "string" } }
            },
            "_meta": { "ui": { "resourceUri": "ui://pdf/viewer" } }
        }))?];

        let tools: Vec<ToolDescriptor> = descriptors(tools, "tools/list")?;
        assert_eq!(tools[0].name, "display_pdf");
        assert_eq!(tools[0].ui_resource_uri(), Some("ui://pdf/viewer"));
        assert_eq!(
            tools[0]
                .input_schema
                .as_ref()
                .and_then(|schema| schema.pointer("/properties/url/type")),
            Some(&json!("string"))
        );
        Ok(())
    }

    #[test]
    fn resource_and_prompt_descriptors_carry_over() -> Result<()> {
        let resources: Vec<rmcp::model::Resource> = vec![serde_json::from_value(json!({
            "uri": "ui://pdf/viewer",
            "name": "viewer",
            "mimeType": "text/html;profile=mcp-app"
        }))?];
        let prompts: Vec<rmcp::model::Prompt> = vec![serde_json::from_value(json!({
            "name": "summarize",
            "description": "Summarize the open document"
        }))?];

        let resources: Vec<ResourceDescriptor> = descriptors(resources, "resources/list")?;
        let prompts: Vec<PromptDescriptor> = descriptors(prompts, "prompts/list")?;
        assert_eq!(resources[0].uri, "ui://pdf/viewer");
        assert_eq!(resources[0].mime_type.as_deref(), Some("text/html;profile=mcp-app"));
        assert_eq!(prompts[0].name, "summarize");
        assert_eq!(
            prompts[0].description.as_deref(),
            Some("Summarize the open document")
        );
        Ok(())
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(McpHttpClient::new("  ", McpClientConfig::default()).is_err());
    }

    #[tokio::test]
    async fn unreachable_module_is_an_error() -> Result<()> {
        let config = McpClientConfig {
            timeout: Duration::from_secs(5),
            ..McpClientConfig::default()
        };
        let client = McpHttpClient::new("http://127.0.0.1:9/mcp", config)?;
        assert!(client.discover_capabilities().await.is_err());
        assert!(!client.is_connected().await);
        client.close().await?;
        client.close().await?;
        Ok(())
    }
}
