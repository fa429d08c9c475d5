use crate::tools::{ToolInput, ToolKind, mismatched_input};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

const NO_RESULTS: &str = "No information found.";

/// Keyword lookup over a small local knowledge base.
pub struct SearchTool {
    entries: BTreeMap<String, String>,
}

impl SearchTool {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .collect(),
        }
    }

    fn lookup(&self, query: &str) -> Vec<&str> {
        let query = query.trim().to_lowercase();
        if let Some(exact) = self.entries.get(&query) {
            return vec![exact.as_str()];
        }

        self.entries
            .iter()
            .filter(|(key, _)| query.contains(key.as_str()) || key.contains(&query))
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    fn description(&self) -> &str {
        "Look up information in the local knowledge base by keyword"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: ToolInput) -> anyhow::Result<ToolResult> {
        let ToolInput::Search { query } = input else {
            return Err(mismatched_input(self.kind(), &input));
        };

        let hits = self.lookup(&query);
        info!(query = %query, hits = hits.len(), "Knowledge base searched");

        if hits.is_empty() {
            Ok(ToolResult::success(NO_RESULTS))
        } else {
            Ok(ToolResult::success(hits.join("\n\n")))
        }
    }
}
