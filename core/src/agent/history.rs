use crate::tools::{ToolInput, ToolKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write;

/// Prefix carried by every failed observation.
pub const ERROR_MARKER: &str = "Error: ";

/// Longest observation excerpt handed back to the decision provider.
const SUMMARY_MAX_CHARS: usize = 4_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Output,
    ToolError,
    /// The tool or provider did not answer in time; trying again may succeed.
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub kind: ObservationKind,
    pub text: String,
}

impl Observation {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            kind: ObservationKind::Output,
            text: text.into(),
        }
    }

    pub fn tool_error(message: impl AsRef<str>) -> Self {
        Self {
            kind: ObservationKind::ToolError,
            text: format!("{}{}", ERROR_MARKER, message.as_ref()),
        }
    }

    pub fn timeout(message: impl AsRef<str>) -> Self {
        Self {
            kind: ObservationKind::Timeout,
            text: format!("{}{} (retryable)", ERROR_MARKER, message.as_ref()),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self.kind, ObservationKind::Output)
    }
}

/// One recorded action and what came of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub tool: ToolKind,
    /// Name the provider asked for when it was replaced by a fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_tool: Option<String>,
    pub action: String,
    pub observation: Observation,
}

impl Event {
    pub fn new(input: &ToolInput, requested_tool: Option<String>, observation: Observation) -> Self {
        let tool = input.kind();
        let action = match &requested_tool {
            Some(requested) => format!("{} (requested: {}): {}", tool, requested, input.describe()),
            None => format!("{}: {}", tool, input.describe()),
        };

        Self {
            tool,
            requested_tool,
            action,
            observation,
        }
    }

    pub fn was_substituted(&self) -> bool {
        self.requested_tool.is_some()
    }
}

/// Most recent events, oldest first, never more than `window` of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    window: usize,
    events: VecDeque<Event>,
}

impl History {
    /// A zero window is raised to one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            events: VecDeque::with_capacity(window),
        }
    }

    /// Appends `event` and returns how many old events were evicted.
    pub fn push(&mut self, event: Event) -> usize {
        self.events.push_back(event);
        let mut evicted = 0;
        while self.events.len() > self.window {
            self.events.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&Event> {
        self.events.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn to_vec(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    pub fn summary(&self, steps: usize) -> String {
        let mut summary = format!("Progress after {} steps:\n", steps);
        for event in &self.events {
            let _ = writeln!(
                summary,
                "Action: {}, Observation: {}",
                event.action,
                truncate(&event.observation.text, SUMMARY_MAX_CHARS)
            );
        }
        summary
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}... [truncated]", truncated)
}
