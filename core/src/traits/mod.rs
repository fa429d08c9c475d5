pub mod decision;
pub mod provider;
pub mod tool;

pub use decision::{Decision, DecisionProvider, DecisionRequest};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider};
pub use tool::{Tool, ToolResult, ToolSpec};
