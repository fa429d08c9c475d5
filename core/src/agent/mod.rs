pub mod context;
pub mod history;
pub mod loop_;
pub mod registry;

pub use context::{LoopState, TaskContext};
pub use history::{ERROR_MARKER, Event, History, Observation, ObservationKind};
pub use loop_::{AgentLoop, CANCELLED_MESSAGE};
pub use registry::ToolRegistry;
