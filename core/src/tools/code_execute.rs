use crate::tools::mismatched_input;
use crate::tools::{ToolInput, ToolKind};
use crate::traits::{Tool, ToolResult};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::io::Write;
use tokio::process::Command;
use tracing::info;

const DEFAULT_INTERPRETER: &str = "python3";

/// Runs a snippet through an interpreter from a temporary script file.
pub struct CodeExecuteTool {
    workspace: std::path::PathBuf,
    interpreter: String,
}

impl CodeExecuteTool {
    pub fn new(workspace: impl AsRef<std::path::Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }
}

#[async_trait]
impl Tool for CodeExecuteTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CodeExecute
    }

    fn description(&self) -> &str {
        "Execute Python code and return its output"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source to run"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, input: ToolInput) -> anyhow::Result<ToolResult> {
        let ToolInput::CodeExecute { code } = input else {
            return Err(mismatched_input(self.kind(), &input));
        };

        // Removed when `script` drops, on every path out of this function.
        let mut script = tempfile::Builder::new()
            .prefix("versa_code_")
            .suffix(".py")
            .tempfile()
            .context("Failed to create temporary script")?;
        script
            .write_all(code.as_bytes())
            .context("Failed to write temporary script")?;
        script.flush()?;

        let output = Command::new(&self.interpreter)
            .arg(script.path())
            .current_dir(&self.workspace)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                info!(interpreter = %self.interpreter, status = %output.status, "Code executed");

                if output.status.success() {
                    let result = if stdout.is_empty() { stderr } else { stdout };
                    Ok(ToolResult::success(result))
                } else {
                    let error = if stderr.is_empty() {
                        format!("Code exited with status: {}", output.status)
                    } else {
                        stderr
                    };
                    Ok(ToolResult::error(error))
                }
            }
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to start {}: {}",
                self.interpreter, e
            ))),
        }
    }
}
