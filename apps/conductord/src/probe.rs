//! Protocol conformance probe against one or more module endpoints.

use conductor_transport::{McpClientConfig, McpHttpClient, ModuleTransport};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

pub const DEFAULT_PROBE_URLS: [&str; 2] = ["http://localhost:3001/mcp", "http://localhost:3002/mcp"];

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub url: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_tool: Option<String>,
    pub call_ok: bool,
    pub resource_read_ok: bool,
    pub errors: Vec<String>,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        self.connected && self.call_ok && self.resource_read_ok
    }
}

fn preferred_tool(names: &[String]) -> Option<&str> {
    ["display_pdf", "say", "list_voices"]
        .into_iter()
        .find(|preferred| names.iter().any(|name| name == preferred))
        .or_else(|| names.first().map(String::as_str))
}

fn probe_args(tool: &str) -> Map<String, Value> {
    match tool {
        "say" => json!({ "text": "Conformance probe.", "autoPlay": false }),
        _ => json!({}),
    }
    .as_object()
    .cloned()
    .unwrap_or_default()
}

pub async fn run_probe(url: &str) -> ProbeReport {
    let mut report = ProbeReport {
        url: url.to_owned(),
        ..ProbeReport::default()
    };
    let config = McpClientConfig {
        client_name: "mcp-canvas-probe".to_owned(),
        ..McpClientConfig::default()
    };
    let client = match McpHttpClient::new(url, config) {
        Ok(client) => client,
        Err(error) => {
            report.errors.push(format!("connect failed: {error:#}"));
            return report;
        }
    };

    if let Err(error) = client.connect().await {
        report.errors.push(format!("connect failed: {error:#}"));
        return report;
    }
    report.connected = true;

    match client.discover_capabilities().await {
        Ok(inventory) => {
            let tools: Vec<String> = inventory.tools.iter().map(|tool| tool.name.clone()).collect();
            let resources: Vec<String> = inventory
                .resources
                .iter()
                .map(|resource| resource.uri.clone())
                .collect();

            match resources.first() {
                Some(uri) => match client.read_resource(uri).await {
                    Ok(_) => report.resource_read_ok = true,
                    Err(error) => report
                        .errors
                        .push(format!("resources/read failed: {error:#}")),
                },
                None => report
                    .errors
                    .push("No resources available for resources/read probe.".to_owned()),
            }

            match preferred_tool(&tools) {
                Some(tool) => {
                    report.probe_tool = Some(tool.to_owned());
                    match client.call_tool(tool, probe_args(tool)).await {
                        Ok(_) => report.call_ok = true,
                        Err(error) => report
                            .errors
                            .push(format!("tools/call failed ({tool}): {error:#}")),
                    }
                }
                None => report
                    .errors
                    .push("No tools available for tools/call probe.".to_owned()),
            }

            report.prompts = Some(inventory.prompts.into_iter().map(|prompt| prompt.name).collect());
            report.tools = Some(tools);
            report.resources = Some(resources);
        }
        Err(error) => report.errors.push(format!("discovery failed: {error:#}")),
    }

    if let Err(error) = client.close().await {
        warn!(url, %error, "probe client close failed");
    }
    info!(url, passed = report.passed(), "probe finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_known_ui_tools() {
        let names = vec!["list_voices".to_owned(), "say".to_owned()];
        assert_eq!(preferred_tool(&names), Some("say"));
        assert_eq!(preferred_tool(&["other".to_owned()]), Some("other"));
        assert_eq!(preferred_tool(&[]), None);
    }

    #[test]
    fn say_probe_disables_autoplay() {
        assert_eq!(probe_args("say")["autoPlay"], false);
        assert!(probe_args("display_pdf").is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_the_probe() {
        let report = run_probe("http://127.0.0.1:9/mcp").await;
        assert!(!report.connected);
        assert!(!report.passed());
        assert!(report.errors[0].starts_with("connect failed"));
    }
}
