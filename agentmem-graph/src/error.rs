//! Error types for agentmem-graph

use thiserror::Error;

/// Errors that can occur in the graph memory engine
#[derive(Debug, Error)]
pub enum GraphError {
    /// Backing store unreachable after the retry budget was spent
    #[error("Connection failed after {attempts} attempt(s): {last_error}")]
    Connection { attempts: u32, last_error: String },

    /// Connection setup aborted by the caller's cancellation signal
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Schema bootstrap failed; fatal for connection setup
    #[error("Schema bootstrap failed: {0}")]
    SchemaBootstrap(String),

    /// Missing or malformed field, bad enum value, incompatible endpoints
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation crossed a zone boundary
    #[error("Isolation violation: {0}")]
    IsolationViolation(String),

    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UUID parsing error
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl GraphError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create an isolation violation
    pub fn isolation(msg: impl Into<String>) -> Self {
        Self::IsolationViolation(msg.into())
    }

    /// Create a schema bootstrap error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaBootstrap(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Machine-readable reason reported to protocol callers
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Connection { .. } | Self::Cancelled | Self::SchemaBootstrap(_) => {
                "connection_error"
            }
            Self::Validation(_) | Self::Uuid(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::IsolationViolation(_) => "isolation_violation",
            Self::Storage(_) | Self::Json(_) | Self::Other(_) => "storage_error",
        }
    }
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_names_attempts_and_cause() {
        let err = GraphError::Connection {
            attempts: 30,
            last_error: "lock held".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Connection failed after 30 attempt(s): lock held"
        );
        assert_eq!(err.reason(), "connection_error");
    }

    #[test]
    fn test_reasons() {
        assert_eq!(GraphError::validation("x").reason(), "validation_error");
        assert_eq!(GraphError::not_found("x").reason(), "not_found");
        assert_eq!(GraphError::isolation("x").reason(), "isolation_violation");
        assert_eq!(GraphError::other("x").reason(), "storage_error");
    }

    #[test]
    fn test_uuid_error_is_validation() {
        let err: GraphError = "not-a-uuid".parse::<uuid::Uuid>().unwrap_err().into();
        assert_eq!(err.reason(), "validation_error");
    }
}
