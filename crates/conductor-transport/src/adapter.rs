use std::sync::Arc;

use conductor_protocol::{Affinity, RuntimeProfile};
use indexmap::IndexMap;

/// Gate for modules whose runtime profile needs more than stateless calls.
pub trait TransportAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn supports(&self, profile: &RuntimeProfile) -> bool;
}

/// Streamable-HTTP with a server-issued session id. It keeps one session per
/// module but cannot pin requests to a single server instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamableHttpSessionAdapter;

impl StreamableHttpSessionAdapter {
    pub const ID: &'static str = "streamable-http-session";
}

impl TransportAdapter for StreamableHttpSessionAdapter {
    fn id(&self) -> &str {
        Self::ID
    }

    fn description(&self) -> Option<&str> {
        Some("MCP Streamable-HTTP transport with mcp-session-id affinity")
    }

    fn supports(&self, profile: &RuntimeProfile) -> bool {
        profile.affinity != Affinity::Instance
    }
}

#[derive(Clone, Default)]
pub struct TransportAdapterRegistry {
    adapters: IndexMap<String, Arc<dyn TransportAdapter>>,
}

impl TransportAdapterRegistry {
    pub fn register(&mut self, adapter: Arc<dyn TransportAdapter>) {
        self.adapters.insert(adapter.id().to_owned(), adapter);
    }

    pub fn get(&self, id: Option<&str>) -> Option<&Arc<dyn TransportAdapter>> {
        self.adapters.get(id?)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn with_builtin_adapters() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(StreamableHttpSessionAdapter));
        registry
    }
}

impl std::fmt::Debug for TransportAdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapterRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
