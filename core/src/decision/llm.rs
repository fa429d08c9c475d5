use crate::decision::PromptBuilder;
use crate::error::ProviderError;
use crate::tools::{Arguments, ToolKind};
use crate::traits::{ChatMessage, ChatRequest, Decision, DecisionProvider, DecisionRequest, Provider};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Uses a chat model as the decision source. Replies are expected to hold a
/// `{"tool": ..., "arguments": {...}}` object, possibly wrapped in prose or a
/// code fence.
pub struct LlmDecisionProvider {
    provider: Arc<dyn Provider>,
    prompt_builder: PromptBuilder,
    temperature: f64,
}

impl LlmDecisionProvider {
    pub fn new(provider: Arc<dyn Provider>, prompt_builder: PromptBuilder) -> Self {
        Self {
            provider,
            prompt_builder,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    async fn ask(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let request = ChatRequest::new(messages)
            .with_temperature(self.temperature)
            .json();
        let response = self
            .provider
            .chat(request)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let text = response.text_or_empty().trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Malformed("empty response".to_string()));
        }
        debug!(response = %text, "Model replied");
        Ok(text)
    }
}

#[async_trait]
impl DecisionProvider for LlmDecisionProvider {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, ProviderError> {
        let messages = [
            ChatMessage::system(self.prompt_builder.decision_system_prompt(request.tools)),
            ChatMessage::user(self.prompt_builder.decision_user_prompt(&request)),
        ];
        let text = self.ask(&messages).await?;
        parse_decision(&text)
    }

    async fn materialize_arguments(
        &self,
        tool: ToolKind,
        request: DecisionRequest<'_>,
    ) -> Result<Arguments, ProviderError> {
        let spec = request.tools.iter().find(|s| s.name == tool.as_str());
        let messages = [ChatMessage::user(
            self.prompt_builder.arguments_prompt(tool, spec, &request),
        )];
        let text = self.ask(&messages).await?;
        Ok(parse_arguments(&text))
    }
}

pub fn parse_decision(text: &str) -> Result<Decision, ProviderError> {
    let value = extract_json_values(text)
        .into_iter()
        .find(|v| v.get("tool").or_else(|| v.get("tool_name")).is_some_and(Value::is_string))
        .ok_or_else(|| ProviderError::Malformed(format!("no tool field in: {}", text)))?;

    let tool = value
        .get("tool")
        .or_else(|| value.get("tool_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let arguments = match value.get("arguments") {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(map)) => flatten_arguments(map),
        Some(other) => {
            return Err(ProviderError::Malformed(format!(
                "arguments must be an object, got {}",
                other
            )));
        }
    };

    Ok(Decision { tool, arguments })
}

/// Arguments from the first JSON object in `text`, or the whole reply as the
/// generic `input` argument when there is none.
pub fn parse_arguments(text: &str) -> Arguments {
    let object = extract_json_values(text).into_iter().find_map(|v| match v {
        Value::Object(map) => Some(map),
        _ => None,
    });

    match object {
        Some(map) => match map.get("arguments") {
            Some(Value::Object(inner)) => flatten_arguments(inner),
            _ => flatten_arguments(&map),
        },
        None => Arguments::from([("input".to_string(), strip_code_fence(text))]),
    }
}

fn flatten_arguments(map: &serde_json::Map<String, Value>) -> Arguments {
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// Top-level JSON objects embedded anywhere in `text`.
fn extract_json_values(text: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start
                        && let Ok(value) = serde_json::from_str::<Value>(&text[s..=i])
                    {
                        values.push(value);
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::History;
    use crate::traits::ChatResponse;
    use std::sync::Mutex;

    #[test]
    fn parses_plain_decision() {
        let decision = parse_decision(r#"{"tool": "bash", "arguments": {"command": "ls"}}"#).unwrap();
        assert_eq!(decision, Decision::new("bash", Arguments::new()).with_arg("command", "ls"));
    }

    #[test]
    fn parses_fenced_decision_with_prose() {
        let text = "Sure!\n```json\n{\"tool\": \"search\", \"arguments\": {\"query\": \"python {syntax}\"}}\n```";
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.tool, "search");
        assert_eq!(decision.arguments["query"], "python {syntax}");
    }

    #[test]
    fn stringifies_non_string_arguments() {
        let decision =
            parse_decision(r#"{"tool_name": "file_view", "arguments": {"path": "a.txt", "limit": 5, "x": null}}"#)
                .unwrap();
        assert_eq!(decision.tool, "file_view");
        assert_eq!(decision.arguments["limit"], "5");
        assert!(!decision.arguments.contains_key("x"));
    }

    #[test]
    fn skips_objects_without_tool() {
        let text = r#"{"note": "thinking"} {"tool": "finish", "arguments": {"message": "done"}}"#;
        assert_eq!(parse_decision(text).unwrap(), Decision::finish("done"));
    }

    #[test]
    fn rejects_missing_tool() {
        assert!(matches!(
            parse_decision("I think you should run ls"),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"tool": "bash", "arguments": "ls"}"#),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn handles_escaped_quotes_and_backslashes() {
        let text = r#"{"tool": "code_execute", "arguments": {"code": "print(\"a\\\\\"); x = {}"}}"#;
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.arguments["code"], r#"print("a\\"); x = {}"#);
    }

    #[test]
    fn arguments_from_object_or_raw_text() {
        assert_eq!(
            parse_arguments(r#"{"command": "ls -la"}"#),
            Arguments::from([("command".to_string(), "ls -la".to_string())])
        );
        assert_eq!(
            parse_arguments(r#"{"tool": "bash", "arguments": {"command": "pwd"}}"#)["command"],
            "pwd"
        );
        assert_eq!(
            parse_arguments("```bash\nls -la\n```"),
            Arguments::from([("input".to_string(), "ls -la".to_string())])
        );
    }

    struct Canned {
        reply: Result<String, String>,
        seen: Mutex<Vec<ChatMessage>>,
        json_mode: Mutex<bool>,
    }

    impl Canned {
        fn new(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                seen: Mutex::new(vec![]),
                json_mode: Mutex::new(false),
            })
        }
    }

    #[async_trait]
    impl Provider for Canned {
        async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
            self.seen.lock().unwrap().extend(request.messages.iter().cloned());
            *self.json_mode.lock().unwrap() = request.json_mode;
            match &self.reply {
                Ok(text) => Ok(ChatResponse {
                    text: Some(text.clone()),
                }),
                Err(e) => Err(anyhow::anyhow!(e.clone())),
            }
        }
    }

    fn request(history: &History) -> DecisionRequest<'_> {
        DecisionRequest {
            task: "list files",
            uploaded_files: &[],
            history,
            step: 0,
            tools: &[],
        }
    }

    #[tokio::test]
    async fn decides_through_chat_model() {
        let canned = Canned::new(Ok(r#"{"tool":"bash","arguments":{"command":"ls"}}"#));
        let provider = LlmDecisionProvider::new(canned.clone(), PromptBuilder::new("."));
        let history = History::new(1);

        let decision = provider.decide(request(&history)).await.unwrap();

        assert_eq!(decision.tool, "bash");
        assert!(*canned.json_mode.lock().unwrap());
        let seen = canned.seen.lock().unwrap();
        assert_eq!(seen[0].role, "system");
        assert!(seen[1].content.starts_with("Task: list files\n"));
    }

    #[tokio::test]
    async fn transport_failure_is_retryable() {
        let canned = Canned::new(Err("connection reset"));
        let provider = LlmDecisionProvider::new(canned, PromptBuilder::new("."));
        let history = History::new(1);

        let err = provider.decide(request(&history)).await.unwrap_err();
        assert_eq!(err, ProviderError::Transport("connection reset".into()));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn materializes_raw_reply_as_input() {
        let canned = Canned::new(Ok("ls -la"));
        let provider = LlmDecisionProvider::new(canned, PromptBuilder::new("."));
        let history = History::new(1);

        let args = provider
            .materialize_arguments(ToolKind::Bash, request(&history))
            .await
            .unwrap();
        assert_eq!(args["input"], "ls -la");
    }
}
