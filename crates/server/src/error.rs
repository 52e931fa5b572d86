//! Structured errors raised by the tool layer itself.
//!
//! Core failures arrive as `offgrid_core::Error` and convert directly; these
//! cover argument problems caught before the worker is involved.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ProxyToolError {
    /// Invalid input parameters (e.g., an unparsable header name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Output could not be serialized.
    #[error("SERIALIZE_FAILED: {0}")]
    Serialize(String),
}

impl From<ProxyToolError> for McpError {
    fn from(err: ProxyToolError) -> Self {
        let (code, message) = match &err {
            ProxyToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ProxyToolError::Serialize(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

impl From<offgrid_core::ConfigError> for ProxyToolError {
    fn from(err: offgrid_core::ConfigError) -> Self {
        ProxyToolError::InvalidInput(err.to_string())
    }
}
