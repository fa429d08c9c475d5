use crate::agent::History;
use crate::error::ProviderError;
use crate::tools::{Arguments, ToolKind};
use crate::traits::ToolSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The provider's choice for the next step: a tool name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(alias = "tool_name")]
    pub tool: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl Decision {
    pub fn new(tool: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn finish(message: impl Into<String>) -> Self {
        Self::new(ToolKind::Finish.as_str(), Arguments::new()).with_arg("message", message)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub task: &'a str,
    pub uploaded_files: &'a [String],
    pub history: &'a History,
    pub step: usize,
    pub tools: &'a [ToolSpec],
}

#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, ProviderError>;

    /// Produces concrete arguments for `tool` when the decision carried none
    /// that were usable.
    async fn materialize_arguments(
        &self,
        _tool: ToolKind,
        _request: DecisionRequest<'_>,
    ) -> Result<Arguments, ProviderError> {
        Ok(Arguments::new())
    }
}
