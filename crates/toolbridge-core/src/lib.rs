pub mod ids;
pub mod tools;

pub use ids::SessionId;
pub use tools::{Tool, ToolDefinition, ToolError, ToolExecutor, ToolOutput};
