//! Error types for the AgentMem MCP server.

use std::path::PathBuf;

use agentmem_graph::GraphError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors that stop the server: configuration, transport and startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// A failed tool call, reported to the client inside the tool result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{reason}: {message}")]
pub struct ToolError {
    pub reason: &'static str,
    pub message: String,
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            reason: "validation_error",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            reason: "not_found",
            message: message.into(),
        }
    }

    /// `{"error": {"reason": .., "message": ..}}`
    pub fn to_structured(&self) -> Value {
        json!({ "error": self })
    }
}

impl From<GraphError> for ToolError {
    fn from(err: GraphError) -> Self {
        Self {
            reason: err.reason(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("Invalid arguments: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_errors_keep_their_reason() {
        let err: ToolError = GraphError::isolation("plan is outside zone").into();
        assert_eq!(err.reason, "isolation_violation");
        assert!(err.message.contains("outside zone"));

        let err: ToolError = GraphError::not_found("task 1").into();
        assert_eq!(err.reason, "not_found");
    }

    #[test]
    fn test_structured_shape() {
        let value = ToolError::validation("name is required").to_structured();
        assert_eq!(value["error"]["reason"], "validation_error");
        assert_eq!(value["error"]["message"], "name is required");
    }

    #[test]
    fn test_invalid_config_display() {
        let err = ServerError::InvalidConfig("retry.max_attempts must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid config: retry.max_attempts must be > 0"
        );
    }
}
