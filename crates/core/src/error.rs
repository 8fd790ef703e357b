//! Error types for the Swarmloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each component has its own error enum, all of which fold into [`Error`].

use thiserror::Error;

/// The top-level error type for all Swarmloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Language model errors ---
    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Pipeline errors ---
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // --- Live configuration errors ---
    #[error("Live config error: {0}")]
    LiveConfig(#[from] LiveConfigError),

    // --- Extension errors ---
    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short, stable name of the error kind, recorded in `turn.metadata.error.name`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Llm(_) => "LlmError",
            Error::Tool(_) => "ToolError",
            Error::Pipeline(_) => "PipelineError",
            Error::LiveConfig(_) => "LiveConfigError",
            Error::Extension(_) => "ExtensionError",
            Error::Config { .. } => "ConfigError",
            Error::Serialization(_) => "SerializationError",
            Error::Internal(_) => "InternalError",
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Component errors ---

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Model request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Remote tool server {server} unavailable: {reason}")]
    RemoteUnavailable { server: String, reason: String },
}

impl ToolError {
    /// Machine-readable code carried in error tool results.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "E_TOOL_NOT_FOUND",
            ToolError::ExecutionFailed { .. } => "E_TOOL_EXECUTION",
            ToolError::Timeout { .. } => "E_TOOL_TIMEOUT",
            ToolError::InvalidArguments(_) => "E_TOOL_INVALID_ARGUMENTS",
            ToolError::RemoteUnavailable { .. } => "E_TOOL_REMOTE_UNAVAILABLE",
        }
    }

    /// Error class name carried in error tool results.
    pub fn name(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "ToolNotFoundError",
            ToolError::ExecutionFailed { .. } => "ToolExecutionError",
            ToolError::Timeout { .. } => "ToolTimeoutError",
            ToolError::InvalidArguments(_) => "ToolArgumentsError",
            ToolError::RemoteUnavailable { .. } => "RemoteToolError",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Cannot {operator} at {point}: wrong operator for this point")]
    WrongOperator { point: String, operator: &'static str },

    #[error("Unknown pipeline point: {0}")]
    UnknownPoint(String),

    #[error("Interceptor at {point} failed: {reason}")]
    InterceptorFailed { point: String, reason: String },
}

#[derive(Debug, Error)]
pub enum LiveConfigError {
    #[error("Invalid patch proposal: {0}")]
    InvalidProposal(String),

    #[error("Agent not initialized for live config: {0}")]
    UnknownAgent(String),

    #[error("Live config storage failed at {path}: {source}")]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Live config document could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Extension {name} could not be resolved: {reason}")]
    Unresolved { name: String, reason: String },

    #[error("Extension {name} failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("Extension {name} failed to register: {reason}")]
    RegisterFailed { name: String, reason: String },

    #[error("Remote tool server {name} failed to attach: {reason}")]
    RemoteSyncFailed { name: String, reason: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
