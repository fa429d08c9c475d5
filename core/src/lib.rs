pub mod agent;
pub mod config;
pub mod decision;
pub mod error;
pub mod providers;
pub mod tools;
pub mod traits;

pub use agent::{AgentLoop, LoopState, TaskContext, ToolRegistry};
pub use config::*;
pub use decision::*;
pub use error::*;
pub use providers::*;
pub use tools::*;
pub use traits::*;
