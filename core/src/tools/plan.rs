use crate::tools::{ToolInput, ToolKind, mismatched_input};
use crate::traits::{ChatMessage, ChatRequest, Provider, Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Asks the chat model for a plan of next steps.
pub struct PlanTool {
    provider: Arc<dyn Provider>,
    temperature: f64,
}

impl PlanTool {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn prompt(task: &str, progress: &str) -> String {
        let tools: Vec<&str> = ToolKind::ALL
            .iter()
            .filter(|k| !k.is_control() && **k != ToolKind::Plan)
            .map(|k| k.as_str())
            .collect();

        format!(
            "Task: {}\n{}\nGenerate a plan for the next steps, including which tools to use ({}).",
            task,
            progress,
            tools.join(", ")
        )
    }
}

#[async_trait]
impl Tool for PlanTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Plan
    }

    fn description(&self) -> &str {
        "Draft a step-by-step plan for the task when the next action is unclear"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What to plan for (defaults to the current task)"
                }
            }
        })
    }

    async fn execute(&self, input: ToolInput) -> anyhow::Result<ToolResult> {
        let ToolInput::Plan { task, progress } = input else {
            return Err(mismatched_input(self.kind(), &input));
        };

        let messages = [ChatMessage::user(Self::prompt(&task, &progress))];
        let response = self
            .provider
            .chat(ChatRequest::new(&messages).with_temperature(self.temperature))
            .await?;

        let plan = response.text_or_empty().trim();
        if plan.is_empty() {
            return Ok(ToolResult::error("Planner returned an empty plan"));
        }

        info!(chars = plan.len(), "Plan generated");
        Ok(ToolResult::success(plan))
    }
}
