use crate::tools::{ToolInput, ToolKind, mismatched_input, workspace_path};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

pub struct FileEditTool {
    workspace: std::path::PathBuf,
}

impl FileEditTool {
    pub fn new(workspace: impl AsRef<std::path::Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for FileEditTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FileEdit
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, replacing what was there"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full new content of the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: ToolInput) -> anyhow::Result<ToolResult> {
        let ToolInput::FileEdit { path, content } = input else {
            return Err(mismatched_input(self.kind(), &input));
        };
        let full_path = workspace_path(&self.workspace, &path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::write(&full_path, &content).await {
            Ok(()) => Ok(ToolResult::success(format!(
                "Wrote {} bytes to {}",
                content.len(),
                path
            ))),
            Err(e) => Ok(ToolResult::error(format!("Failed to write file: {}", e))),
        }
    }
}
