use crate::agent::ToolRegistry;
use crate::config::Config;
use crate::error::{ArgumentError, RegistryError};
use crate::traits::Provider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub mod bash;
pub mod browse;
pub mod code_execute;
pub mod file_edit;
pub mod file_view;
pub mod plan;
pub mod search;

pub use bash::BashTool;
pub use browse::BrowseTool;
pub use code_execute::CodeExecuteTool;
pub use file_edit::FileEditTool;
pub use file_view::FileViewTool;
pub use plan::PlanTool;
pub use search::SearchTool;

/// Flat string-keyed tool arguments. Ordered so serialized actions are stable.
pub type Arguments = BTreeMap<String, String>;

/// Generic key a provider may use instead of a tool's own field name.
const INPUT_ALIAS: &str = "input";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Bash,
    CodeExecute,
    Browse,
    Search,
    FileView,
    FileEdit,
    Plan,
    Finish,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::Bash,
        ToolKind::CodeExecute,
        ToolKind::Browse,
        ToolKind::Search,
        ToolKind::FileView,
        ToolKind::FileEdit,
        ToolKind::Plan,
        ToolKind::Finish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::CodeExecute => "code_execute",
            Self::Browse => "browse",
            Self::Search => "search",
            Self::FileView => "file_view",
            Self::FileEdit => "file_edit",
            Self::Plan => "plan",
            Self::Finish => "finish",
        }
    }

    /// `finish` ends the task; it is never dispatched to a tool.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Finish)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_matches(|c| c == '`' || c == '"').to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| RegistryError::UnknownTool(s.trim().to_string()))
    }
}

/// Typed input for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInput {
    Bash { command: String },
    CodeExecute { code: String },
    Browse { path: String },
    Search { query: String },
    FileView { path: String },
    FileEdit { path: String, content: String },
    Plan { task: String, progress: String },
    Finish { message: String },
}

impl ToolInput {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Bash { .. } => ToolKind::Bash,
            Self::CodeExecute { .. } => ToolKind::CodeExecute,
            Self::Browse { .. } => ToolKind::Browse,
            Self::Search { .. } => ToolKind::Search,
            Self::FileView { .. } => ToolKind::FileView,
            Self::FileEdit { .. } => ToolKind::FileEdit,
            Self::Plan { .. } => ToolKind::Plan,
            Self::Finish { .. } => ToolKind::Finish,
        }
    }

    pub fn from_arguments(kind: ToolKind, args: &Arguments) -> Result<Self, ArgumentError> {
        let input = match kind {
            ToolKind::Bash => Self::Bash {
                command: primary_arg(kind, args, "command")?,
            },
            ToolKind::CodeExecute => Self::CodeExecute {
                code: primary_arg(kind, args, "code")?,
            },
            ToolKind::Browse => Self::Browse {
                path: primary_arg(kind, args, "path")?,
            },
            ToolKind::Search => Self::Search {
                query: primary_arg(kind, args, "query")?,
            },
            ToolKind::FileView => Self::FileView {
                path: primary_arg(kind, args, "path")?,
            },
            ToolKind::FileEdit => Self::FileEdit {
                path: required_arg(kind, args, "path")?,
                content: args.get("content").cloned().ok_or(ArgumentError::Missing {
                    tool: kind,
                    field: "content",
                })?,
            },
            ToolKind::Plan => Self::Plan {
                task: primary_arg(kind, args, "task")?,
                progress: optional_arg(args, "progress"),
            },
            ToolKind::Finish => Self::Finish {
                message: optional_arg(args, "message"),
            },
        };
        Ok(input)
    }

    /// Serialized arguments, without the tool tag.
    pub fn describe(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(object) = value.as_object_mut() {
            object.remove("tool");
        }
        value.to_string()
    }
}

fn required_arg(kind: ToolKind, args: &Arguments, field: &'static str) -> Result<String, ArgumentError> {
    args.get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ArgumentError::Missing { tool: kind, field })
}

fn primary_arg(kind: ToolKind, args: &Arguments, field: &'static str) -> Result<String, ArgumentError> {
    required_arg(kind, args, field).or_else(|err| {
        args.get(INPUT_ALIAS)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(err)
    })
}

fn optional_arg(args: &Arguments, field: &str) -> String {
    args.get(field).map(|v| v.trim().to_string()).unwrap_or_default()
}

pub(crate) fn mismatched_input(expected: ToolKind, input: &ToolInput) -> anyhow::Error {
    anyhow::anyhow!(
        "{} tool received input for {}",
        expected,
        input.kind()
    )
}

pub(crate) fn workspace_path(workspace: &Path, path: &str) -> PathBuf {
    workspace.join(path)
}

/// Builds the standard tool set. `plan` needs a chat provider and is left out
/// when none is available.
pub fn default_registry(
    config: &Config,
    planner: Option<Arc<dyn Provider>>,
) -> Result<ToolRegistry, RegistryError> {
    let workspace = &config.workspace_dir;
    let mut registry = ToolRegistry::new();

    registry.register(BashTool::new(workspace))?;
    registry.register(CodeExecuteTool::new(workspace).with_interpreter(&config.python))?;
    registry.register(BrowseTool::new(workspace))?;
    registry.register(SearchTool::new(config.knowledge_base.clone()))?;
    registry.register(FileViewTool::new(workspace))?;
    registry.register(FileEditTool::new(workspace))?;

    if let Some(provider) = planner {
        registry.register(PlanTool::new(provider).with_temperature(config.temperature))?;
    }

    Ok(registry)
}
