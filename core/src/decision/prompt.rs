use crate::tools::ToolKind;
use crate::traits::{DecisionRequest, ToolSpec};
use std::fmt::Write;
use std::path::Path;

const BOOTSTRAP_MAX_CHARS: usize = 20_000;

const BOOTSTRAP_FILES: &[(&str, &str)] = &[("AGENT.md", "## Operator Notes (AGENT.md)")];

/// Builds the prompts sent to the chat model when it acts as the decision
/// provider.
pub struct PromptBuilder {
    pub workspace: std::path::PathBuf,
}

impl PromptBuilder {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }

    pub fn decision_system_prompt(&self, tools: &[ToolSpec]) -> String {
        let mut parts = vec![];

        if let Some(bootstrap) = self.load_bootstrap_files() {
            parts.push(bootstrap);
        }

        parts.push(Self::decision_protocol());
        parts.push(Self::tool_catalog(tools));
        parts.push(self.get_runtime_context());

        parts.join("\n\n---\n\n")
    }

    pub fn decision_user_prompt(&self, request: &DecisionRequest<'_>) -> String {
        let mut prompt = format!("Task: {}\n", request.task);

        if !request.uploaded_files.is_empty() {
            let _ = writeln!(prompt, "Uploaded files: {}", request.uploaded_files.join(", "));
        }

        prompt.push('\n');
        prompt.push_str(&request.history.summary(request.step));
        prompt.push_str("\nSelect the most appropriate tool for the next step and reply with the JSON object only.");
        prompt
    }

    pub fn arguments_prompt(&self, tool: ToolKind, spec: Option<&ToolSpec>, request: &DecisionRequest<'_>) -> String {
        let mut prompt = format!("Task: {}\nTool: {}\n", request.task, tool);

        if let Some(spec) = spec {
            let _ = writeln!(prompt, "Parameters: {}", spec.parameters_schema);
        }
        if !request.uploaded_files.is_empty() {
            let _ = writeln!(prompt, "Uploaded files: {}", request.uploaded_files.join(", "));
        }

        prompt.push('\n');
        prompt.push_str(&request.history.summary(request.step));
        prompt.push_str(
            "\nGenerate the input for this tool (e.g. bash command, Python code, file path, search query) \
             as a JSON object matching its parameters.",
        );
        prompt
    }

    fn decision_protocol() -> String {
        let mut protocol = String::new();
        protocol.push_str("## Decision Protocol\n\n");
        protocol.push_str("You control a tool-using agent. Each turn, choose exactly one tool and reply with a single JSON object:\n\n");
        protocol.push_str("```\n{\"tool\": \"tool_name\", \"arguments\": {\"param\": \"value\"}}\n```\n\n");
        protocol.push_str("All argument values are strings. Reply with JSON only, no commentary.\n");
        protocol.push_str("When the task is complete, reply with ");
        protocol.push_str("{\"tool\": \"finish\", \"arguments\": {\"message\": \"<final answer for the user>\"}}.\n");
        protocol
    }

    fn tool_catalog(tools: &[ToolSpec]) -> String {
        let mut catalog = String::from("### Available Tools\n\n");

        for tool in tools {
            let _ = writeln!(
                catalog,
                "**{}**: {}\nParameters: `{}`\n",
                tool.name, tool.description, tool.parameters_schema
            );
        }

        let _ = writeln!(
            catalog,
            "**{}**: End the task and report the final answer\nParameters: `{}`",
            ToolKind::Finish,
            serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}})
        );

        catalog
    }

    fn get_runtime_context(&self) -> String {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");

        format!(
            "## Runtime Context

### Current Time
{}

### Workspace
{}",
            timestamp,
            self.workspace.display()
        )
    }

    fn load_bootstrap_files(&self) -> Option<String> {
        let mut parts = vec![];

        for (filename, section_header) in BOOTSTRAP_FILES {
            if let Ok(content) = std::fs::read_to_string(self.workspace.join(filename)) {
                let trimmed = content.trim();

                if !trimmed.is_empty() {
                    let content = if trimmed.chars().count() > BOOTSTRAP_MAX_CHARS {
                        let truncated: String = trimmed.chars().take(BOOTSTRAP_MAX_CHARS).collect();
                        format!("{}\n\n[... truncated at {} chars]\n", truncated, BOOTSTRAP_MAX_CHARS)
                    } else {
                        trimmed.to_string()
                    };

                    parts.push(format!("{}\n\n{}", section_header, content));
                }
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n---\n\n"))
        }
    }
}
