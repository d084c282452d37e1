//! Protocol runtime for a Model Context Protocol server: registries for
//! tools, resources, and prompts; session and operation lifecycle tracking;
//! a transport abstraction with streamable-HTTP and stdio realizations; and
//! the dispatch engine that ties them together.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod operation;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use engine::Engine;
pub use error::{McpError, McpResult, TransportError};
pub use model::{
    CallToolResult, Content, PromptArgument, PromptDescriptor, PromptMessage, PromptResult,
    ReadResourceResult, ResourceContent, ResourceDescriptor, ServerCapabilities, ServerInfo,
    ToolDescriptor,
};
pub use operation::{OperationHandle, OperationId, ProgressNotice, ProgressToken};
pub use registry::{PromptHandler, ResourceHandler, RequestContext, ToolContext, ToolHandler};
pub use session::{Session, SessionId, SessionManager};
pub use transport::{Transport, TransportMessage};
