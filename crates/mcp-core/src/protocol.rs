//! Wire-level constants: method names, the protocol version string, and the
//! JSON-RPC / MCP error-code table.

/// JSON-RPC version string carried on every request, response, and notification.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version this server advertises during `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Method names, grouped by the component that owns them.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const OPERATIONS_CANCEL: &str = "operations/cancel";
    pub const PROGRESS_NOTIFICATION: &str = "notifications/progress";

    /// Every request/notification method the engine must route. Used at
    /// startup to assert dispatch is total over the method table.
    pub const ALL: &[&str] = &[
        INITIALIZE,
        INITIALIZED,
        PING,
        TOOLS_LIST,
        TOOLS_CALL,
        RESOURCES_LIST,
        RESOURCES_READ,
        PROMPTS_LIST,
        PROMPTS_GET,
        OPERATIONS_CANCEL,
    ];
}

/// JSON-RPC / MCP error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const RESOURCE_NOT_FOUND: i64 = -32100;
    pub const TOOL_NOT_FOUND: i64 = -32101;
    pub const PROMPT_NOT_FOUND: i64 = -32102;
}

/// HTTP header carrying the session id.
pub const SESSION_HEADER: &str = "mcp-session-id";
