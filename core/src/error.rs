use crate::tools::ToolKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateName(ToolKind),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("'{0}' is a control signal and cannot be registered as a tool")]
    Reserved(ToolKind),
}

/// Failures of the decision source. Timeouts and transport failures are
/// worth retrying; a malformed answer is not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("decision provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("decision provider unreachable: {0}")]
    Transport(String),

    #[error("malformed decision: {0}")]
    Malformed(String),

    #[error("no more scripted decisions")]
    Exhausted,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("missing '{field}' argument for {tool}")]
    Missing { tool: ToolKind, field: &'static str },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
