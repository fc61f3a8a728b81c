//! Remote module transports.
//!
//! [`ModuleTransport`] is the capability the engine consumes; [`McpHttpClient`]
//! implements it over MCP Streamable-HTTP using `rmcp`. [`TransportAdapter`]s gate
//! registration of session-mode modules.

pub mod adapter;
pub mod mcp;
pub mod transport;

pub use adapter::{StreamableHttpSessionAdapter, TransportAdapter, TransportAdapterRegistry};
pub use mcp::{McpClientConfig, McpHttpClient};
pub use transport::{
    HttpTransportConnector, ModuleTransport, ReadResourceResult, ResourceContents,
    TransportConnector,
};
