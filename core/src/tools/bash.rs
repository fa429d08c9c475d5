use crate::tools::mismatched_input;
use crate::tools::{ToolInput, ToolKind};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::info;

pub struct BashTool {
    workspace: std::path::PathBuf,
}

impl BashTool {
    pub fn new(workspace: impl AsRef<std::path::Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Bash
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: ToolInput) -> anyhow::Result<ToolResult> {
        let ToolInput::Bash { command } = input else {
            return Err(mismatched_input(self.kind(), &input));
        };

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&self.workspace)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let combined = format!("stdout: {}\nstderr: {}", stdout.trim_end(), stderr.trim_end());
                info!(command = %command, status = %output.status, "Bash command executed");

                if output.status.success() {
                    Ok(ToolResult::success(combined))
                } else {
                    Ok(ToolResult::error(format!(
                        "Command failed with {}\n{}",
                        output.status, combined
                    )))
                }
            }
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to execute command: {}",
                e
            ))),
        }
    }
}
