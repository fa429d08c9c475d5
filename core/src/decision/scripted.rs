use crate::error::ProviderError;
use crate::traits::{Decision, DecisionProvider, DecisionRequest};
use anyhow::Context;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// Replays a fixed list of decisions in order. Once the list runs out every
/// further request is answered with an empty `finish`, so the task ends on
/// its last observation.
pub struct ScriptedDecisions {
    decisions: Mutex<VecDeque<Decision>>,
}

impl ScriptedDecisions {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
        }
    }

    /// Reads a JSON array of `{"tool": ..., "arguments": {...}}` objects.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read decisions from {}", path.display()))?;
        let decisions: Vec<Decision> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse decisions in {}", path.display()))?;
        Ok(Self::new(decisions))
    }

    pub fn remaining(&self) -> usize {
        self.decisions.lock().map(|d| d.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisions {
    async fn decide(&self, _request: DecisionRequest<'_>) -> Result<Decision, ProviderError> {
        let next = self
            .decisions
            .lock()
            .map_err(|_| ProviderError::Exhausted)?
            .pop_front();
        Ok(next.unwrap_or_else(|| Decision::finish("")))
    }
}
