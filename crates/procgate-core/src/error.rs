//! Error types for procgate.
//!
//! Remote callers only ever distinguish two failure families: methods that are
//! not on the allowlist, and failures raised by the invoked handler. Everything
//! else in this enum exists for construction, transport, or the process manager.

use thiserror::Error;

/// Main error type for the procgate crates.
#[derive(Debug, Error)]
pub enum ProcgateError {
    // Dispatch errors
    #[error("method \"{method}\" is not supported")]
    MethodNotSupported { method: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Construction errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Process manager errors
    #[error("Process not found: {name}")]
    ProcessNotFound { name: String },

    #[error("Process already running: {name}")]
    ProcessAlreadyRunning { name: String },

    #[error("Process launch failed for {name}: {message}")]
    LaunchFailed { name: String, message: String },

    // File system errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Client-side errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// A fault returned by a remote server, carried back verbatim.
    #[error("{message}")]
    Fault { code: i32, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for procgate operations.
pub type Result<T> = std::result::Result<T, ProcgateError>;

impl From<std::io::Error> for ProcgateError {
    fn from(err: std::io::Error) -> Self {
        ProcgateError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ProcgateError {
    fn from(err: serde_json::Error) -> Self {
        ProcgateError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ProcgateError {
    /// Shorthand for an [`ProcgateError::InvalidParams`] error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        ProcgateError::InvalidParams {
            message: message.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32601: Method not found (not on the allowlist)
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network/connectivity error
    /// - -32001: Process already running
    /// - -32002: Process not found
    /// - -32003: Process launch failed
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            ProcgateError::MethodNotSupported { .. } => -32601,
            ProcgateError::InvalidParams { .. } => -32602,
            ProcgateError::Network { .. } => -32000,
            ProcgateError::ProcessAlreadyRunning { .. } => -32001,
            ProcgateError::ProcessNotFound { .. } => -32002,
            ProcgateError::LaunchFailed { .. } => -32003,
            ProcgateError::Fault { code, .. } => *code,

            // All other errors are internal errors
            _ => -32603,
        }
    }
}
