use crate::tools::{ToolInput, ToolKind, mismatched_input, workspace_path};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

pub struct FileViewTool {
    workspace: std::path::PathBuf,
}

impl FileViewTool {
    pub fn new(workspace: impl AsRef<std::path::Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for FileViewTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FileView
    }

    fn description(&self) -> &str {
        "Read the contents of a text file from the workspace"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: ToolInput) -> anyhow::Result<ToolResult> {
        let ToolInput::FileView { path } = input else {
            return Err(mismatched_input(self.kind(), &input));
        };
        let full_path = workspace_path(&self.workspace, &path);

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(ToolResult::error(format!("File {} not found", path)))
            }
            Err(e) => Ok(ToolResult::error(format!("Failed to read file: {}", e))),
        }
    }
}
