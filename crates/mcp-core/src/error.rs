//! Error taxonomy for the MCP protocol runtime.
//!
//! Mirrors the `thiserror`-based layering the rest of the corpus uses:
//! one enum per concern, each convertible into the wire-level JSON-RPC error
//! envelope via [`McpError::code`] / [`McpError::message`].

use crate::protocol::error_codes;

/// Errors surfaced by the dispatch engine, registries, session manager, and
/// operation manager.
///
/// Every handler invocation funnels its failure through this type at the
/// dispatcher boundary; nothing ever propagates out of the dispatch loop as
/// a panic or bare `Result::Err`.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    /// The inbound payload was not a JSON object, or was not valid JSON at all.
    #[error("parse error: {0}")]
    Parse(String),

    /// The request was missing `method`, referenced an unknown/expired
    /// session, or otherwise violated the JSON-RPC envelope.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler is installed for the given method name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Required parameters were missing or malformed.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// A registered handler raised an error, or panicked/failed in a way the
    /// dispatcher caught.
    #[error("internal error: {0}")]
    Internal(String),

    /// `resources/read` named a URI with no registered handler.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// `tools/call` named a tool with no registered handler.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// `prompts/get` named a prompt with no registered handler.
    #[error("prompt not found: {0}")]
    PromptNotFound(String),
}

impl McpError {
    /// The JSON-RPC error code this error maps to on the wire.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
            Self::ResourceNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            Self::ToolNotFound(_) => error_codes::TOOL_NOT_FOUND,
            Self::PromptNotFound(_) => error_codes::PROMPT_NOT_FOUND,
        }
    }

    /// The message to place in `error.message` on the wire.
    #[must_use]
    pub fn wire_message(&self) -> String {
        self.to_string()
    }

    /// Build an internal error from any handler failure, the way the
    /// dispatcher boundary catches uncaught handler errors.
    pub fn from_handler_error(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Errors raised by a `Transport` implementation.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("no response sink registered for request id {0}")]
    NoResponseSink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the engine and registries.
pub type McpResult<T> = Result<T, McpError>;
