//! Error types for the Carnatic music assistant.

use thiserror::Error;

/// Result type alias using CarnaticError.
pub type Result<T> = std::result::Result<T, CarnaticError>;

/// Errors that can occur in the assistant.
#[derive(Error, Debug)]
pub enum CarnaticError {
    /// Vector index lookup failed.
    #[error("Index query failed: {message}")]
    IndexQuery { message: String },

    /// Cross-encoder scoring failed.
    #[error("Re-ranking failed: {message}")]
    Rerank { message: String },

    /// A tool failed for a reason other than index or re-rank failure.
    #[error("Tool {tool} failed: {message}")]
    ToolInvocation { tool: String, message: String },

    /// The language model call failed.
    #[error("Language model error: {message}")]
    UpstreamModel { message: String },

    /// A model or index call did not complete in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CarnaticError {
    /// Create an index query error.
    pub fn index_query(message: impl Into<String>) -> Self {
        Self::IndexQuery {
            message: message.into(),
        }
    }

    /// Create a re-rank error.
    pub fn rerank(message: impl Into<String>) -> Self {
        Self::Rerank {
            message: message.into(),
        }
    }

    /// Create a tool invocation error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a language model error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamModel {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for timeouts, which callers report separately from model failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::IndexQuery { .. } => "INDEX_QUERY_ERROR",
            Self::Rerank { .. } => "RERANK_ERROR",
            Self::ToolInvocation { .. } => "TOOL_INVOCATION_ERROR",
            Self::UpstreamModel { .. } => "UPSTREAM_MODEL_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
