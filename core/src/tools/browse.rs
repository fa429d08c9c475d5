use crate::tools::{ToolInput, ToolKind, mismatched_input, workspace_path};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::info;

/// Tags that carry their label as element content.
const CONTENT_TAGS: &[&str] = &["button", "a"];

/// Lists the interactable elements of a local HTML page.
pub struct BrowseTool {
    workspace: std::path::PathBuf,
}

impl BrowseTool {
    pub fn new(workspace: impl AsRef<std::path::Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }
}

fn interactable_elements(html: &str) -> anyhow::Result<Vec<String>> {
    let inner_tags = Regex::new(r"<[^>]+>")?;
    let whitespace = Regex::new(r"\s+")?;
    let clean = |text: &str| {
        let text = inner_tags.replace_all(text, " ");
        whitespace.replace_all(text.trim(), " ").trim().to_string()
    };

    let mut elements = Vec::new();

    for tag in CONTENT_TAGS {
        let pattern = Regex::new(&format!(r"(?is)<{tag}\b[^>]*>(.*?)</{tag}>"))?;
        for (i, captures) in pattern.captures_iter(html).enumerate() {
            elements.push(format!("{}_{}: {}", tag, i, clean(&captures[1])));
        }
    }

    let input = Regex::new(r"(?is)<input\b([^>]*?)/?>")?;
    for (i, captures) in input.captures_iter(html).enumerate() {
        elements.push(format!("input_{}: {}", i, clean(&captures[1])));
    }

    Ok(elements)
}

#[async_trait]
impl Tool for BrowseTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Browse
    }

    fn description(&self) -> &str {
        "List the buttons, links and inputs of a local HTML file"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the HTML file"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: ToolInput) -> anyhow::Result<ToolResult> {
        let ToolInput::Browse { path } = input else {
            return Err(mismatched_input(self.kind(), &input));
        };

        let full_path = workspace_path(&self.workspace, &path);
        if !full_path.exists() {
            return Ok(ToolResult::error(format!("File {} not found", path)));
        }

        let html = match tokio::fs::read_to_string(&full_path).await {
            Ok(html) => html,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read {}: {}", path, e))),
        };

        let elements = interactable_elements(&html)?;
        info!(path = %path, elements = elements.len(), "Browsed page");

        if elements.is_empty() {
            Ok(ToolResult::success("No interactable elements found."))
        } else {
            Ok(ToolResult::success(format!(
                "Webpage elements:\n{}",
                elements.join("\n")
            )))
        }
    }
}
