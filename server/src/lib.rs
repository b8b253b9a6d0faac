//! AgentMem MCP Server Library
//!
//! Serves the `agentmem-graph` memory engine to coding agents over the Model
//! Context Protocol, on stdio or HTTP.

pub mod config;
pub mod error;
pub mod mcp;

pub use config::{Config, TransportType};
pub use error::{ServerError, ServerResult, ToolError};
pub use mcp::McpServer;
