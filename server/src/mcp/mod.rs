//! MCP (Model Context Protocol) Server Module
//!
//! Exposes the memory graph to AI agents as MCP tools. Every tool call is
//! checked against the tool's input schema before it reaches the graph.
//!
//! ## Usage
//!
//! ```bash
//! agentmem-mcp --transport stdio
//! agentmem-mcp --transport http --bind 127.0.0.1:8765
//! ```
//!
//! Both transports speak JSON-RPC 2.0; stdio uses one message per line.

pub mod handlers;
pub mod http;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::*;
pub use server::McpServer;
