pub mod llm;
pub mod prompt;
pub mod scripted;

pub use llm::LlmDecisionProvider;
pub use prompt::PromptBuilder;
pub use scripted::ScriptedDecisions;
