use crate::agent::History;
use crate::tools::ToolKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Selecting,
    AwaitingInput,
    Executing,
    Recording,
    Deciding,
    /// The provider signalled completion.
    Finished,
    /// The step budget ran out.
    Exhausted,
    /// No usable input could be produced for the chosen tool.
    Failed,
    Cancelled,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Exhausted | Self::Failed | Self::Cancelled
        )
    }
}

/// Everything one task run reads and produces. Handed to the loop and handed
/// back when it stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub id: Uuid,
    pub task: String,
    pub uploaded_files: Vec<String>,
    pub history: History,
    /// Tool executions completed so far.
    pub step_count: usize,
    pub current_tool: Option<ToolKind>,
    pub last_result: String,
    pub state: LoopState,
}

impl TaskContext {
    pub fn new(task: impl Into<String>, window: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            uploaded_files: vec![],
            history: History::new(window),
            step_count: 0,
            current_tool: None,
            last_result: String::new(),
            state: LoopState::Selecting,
        }
    }

    pub fn with_uploaded_files(mut self, files: Vec<String>) -> Self {
        self.uploaded_files = files;
        self
    }

    /// Clears everything a previous run left behind, keeping the task.
    pub fn reset(&mut self) {
        self.history.clear();
        self.step_count = 0;
        self.current_tool = None;
        self.last_result.clear();
        self.state = LoopState::Selecting;
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn stop(&mut self, state: LoopState, result: impl Into<String>) -> LoopState {
        self.last_result = result.into();
        state
    }
}
