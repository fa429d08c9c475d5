use crate::agent::history::ERROR_MARKER;
use crate::agent::{Event, LoopState, Observation, TaskContext, ToolRegistry};
use crate::config::Config;
use crate::error::{ArgumentError, ProviderError};
use crate::tools::{Arguments, ToolInput, ToolKind};
use crate::traits::{Decision, DecisionProvider, DecisionRequest, ToolResult, ToolSpec};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_MAX_STEPS: usize = 10;
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROVIDER_RETRIES: u32 = 1;

pub const CANCELLED_MESSAGE: &str = "Task cancelled";
const FINISHED_MESSAGE: &str = "Task finished";

/// Where one step currently is, with the data the next state needs.
enum Phase {
    Selecting,
    AwaitingInput {
        kind: ToolKind,
        requested_tool: Option<String>,
        arguments: Arguments,
    },
    Executing {
        input: ToolInput,
        requested_tool: Option<String>,
    },
    Recording(Event),
    Deciding,
    Stopped(LoopState),
}

impl Phase {
    /// Cancellation is honored before these; an executed tool's event is
    /// always recorded.
    fn starts_work(&self) -> bool {
        matches!(
            self,
            Self::Selecting | Self::AwaitingInput { .. } | Self::Executing { .. }
        )
    }

    fn state(&self) -> LoopState {
        match self {
            Self::Selecting => LoopState::Selecting,
            Self::AwaitingInput { .. } => LoopState::AwaitingInput,
            Self::Executing { .. } => LoopState::Executing,
            Self::Recording(_) => LoopState::Recording,
            Self::Deciding => LoopState::Deciding,
            Self::Stopped(state) => *state,
        }
    }
}

/// Drives one task: ask for a decision, run the tool, record the event,
/// repeat until `finish`, the step budget, a failed input or cancellation.
pub struct AgentLoop {
    provider: Arc<dyn DecisionProvider>,
    tool_registry: Arc<ToolRegistry>,
    tool_specs: Vec<ToolSpec>,
    max_steps: usize,
    fallback_tool: ToolKind,
    provider_timeout: Duration,
    tool_timeout: Duration,
    provider_retries: u32,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn DecisionProvider>, tool_registry: Arc<ToolRegistry>) -> Self {
        let tool_specs = tool_registry.get_specs();
        Self {
            provider,
            tool_registry,
            tool_specs,
            max_steps: DEFAULT_MAX_STEPS,
            fallback_tool: ToolKind::Plan,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            provider_retries: DEFAULT_PROVIDER_RETRIES,
        }
    }

    pub fn with_config(self, config: &Config) -> Self {
        self.with_max_steps(config.max_steps)
            .with_fallback_tool(config.fallback_tool)
            .with_provider_timeout(Duration::from_secs(config.provider_timeout_secs))
            .with_tool_timeout(Duration::from_secs(config.tool_timeout_secs))
            .with_provider_retries(config.provider_retries)
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub fn with_fallback_tool(mut self, kind: ToolKind) -> Self {
        self.fallback_tool = kind;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_provider_retries(mut self, retries: u32) -> Self {
        self.provider_retries = retries;
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.tool_specs
    }

    /// Runs `ctx.task` from a clean slate and hands the context back in a
    /// terminal state. Never fails: every outcome is a result string.
    pub async fn run(&self, mut ctx: TaskContext, cancel: &CancellationToken) -> TaskContext {
        ctx.reset();
        info!(task_id = %ctx.id, task = %ctx.task, max_steps = self.max_steps, "Starting task");

        let mut phase = Phase::Selecting;
        loop {
            ctx.state = phase.state();
            if ctx.state.is_terminal() {
                break;
            }
            if cancel.is_cancelled() && phase.starts_work() {
                warn!(task_id = %ctx.id, state = ?ctx.state, "Task cancelled");
                ctx.state = ctx.stop(LoopState::Cancelled, CANCELLED_MESSAGE);
                break;
            }

            phase = match phase {
                Phase::Selecting => self.select(&mut ctx).await,
                Phase::AwaitingInput {
                    kind,
                    requested_tool,
                    arguments,
                } => self.await_input(&mut ctx, kind, requested_tool, arguments).await,
                Phase::Executing {
                    input,
                    requested_tool,
                } => {
                    let observation = self.execute(input.clone()).await;
                    Phase::Recording(Event::new(&input, requested_tool, observation))
                }
                Phase::Recording(event) => self.record(&mut ctx, event),
                Phase::Deciding => self.decide_next(&mut ctx),
                Phase::Stopped(state) => Phase::Stopped(state),
            };
        }

        info!(
            task_id = %ctx.id,
            state = ?ctx.state,
            steps = ctx.step_count,
            "Task stopped"
        );
        ctx
    }

    fn request<'a>(&'a self, ctx: &'a TaskContext) -> DecisionRequest<'a> {
        DecisionRequest {
            task: &ctx.task,
            uploaded_files: &ctx.uploaded_files,
            history: &ctx.history,
            step: ctx.step_count,
            tools: &self.tool_specs,
        }
    }

    async fn select(&self, ctx: &mut TaskContext) -> Phase {
        let decision = match self.request_decision(ctx).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(task_id = %ctx.id, error = %e, "No usable decision, finishing task");
                Decision::finish(format!("Stopping: {}", e))
            }
        };
        debug!(tool = %decision.tool, arguments = ?decision.arguments, "Decision received");

        let (kind, requested_tool) = self.resolve_tool(&decision.tool);
        ctx.current_tool = Some(kind);

        if kind.is_control() {
            return self.finish(ctx, decision.arguments, requested_tool);
        }

        Phase::AwaitingInput {
            kind,
            requested_tool,
            arguments: decision.arguments,
        }
    }

    async fn request_decision(&self, ctx: &TaskContext) -> Result<Decision, ProviderError> {
        let mut attempt = 0;
        loop {
            let result =
                match tokio::time::timeout(self.provider_timeout, self.provider.decide(self.request(ctx)))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
                };

            match result {
                Err(e) if e.is_retryable() && attempt < self.provider_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Decision provider failed, retrying");
                }
                other => return other,
            }
        }
    }

    /// Maps the provider's tool name to a dispatchable kind. Anything not
    /// registered becomes the fallback, and the original name is kept so
    /// the substitution shows up in the recorded event.
    fn resolve_tool(&self, name: &str) -> (ToolKind, Option<String>) {
        match name.parse::<ToolKind>() {
            Ok(kind) if kind.is_control() || self.tool_registry.contains(kind) => (kind, None),
            _ => {
                let fallback = if self.fallback_tool.is_control()
                    || self.tool_registry.contains(self.fallback_tool)
                {
                    self.fallback_tool
                } else {
                    ToolKind::Finish
                };
                warn!(requested = %name, fallback = %fallback, "Unknown tool requested, using fallback");
                (fallback, Some(name.trim().to_string()))
            }
        }
    }

    fn finish(
        &self,
        ctx: &mut TaskContext,
        arguments: Arguments,
        requested_tool: Option<String>,
    ) -> Phase {
        let message = arguments
            .get("message")
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        if let Some(requested) = requested_tool {
            let observation =
                Observation::tool_error(format!("Unknown tool '{}' requested, finishing task", requested));
            let result = observation.text.clone();
            let input = ToolInput::Finish {
                message: message.unwrap_or_default(),
            };
            ctx.history.push(Event::new(&input, Some(requested), observation));
            return Phase::Stopped(ctx.stop(LoopState::Finished, result));
        }

        let result = message
            .or_else(|| (!ctx.last_result.is_empty()).then(|| ctx.last_result.clone()))
            .unwrap_or_else(|| FINISHED_MESSAGE.to_string());
        Phase::Stopped(ctx.stop(LoopState::Finished, result))
    }

    async fn await_input(
        &self,
        ctx: &mut TaskContext,
        kind: ToolKind,
        requested_tool: Option<String>,
        mut arguments: Arguments,
    ) -> Phase {
        if kind == ToolKind::Plan {
            arguments
                .entry("task".to_string())
                .or_insert_with(|| ctx.task.clone());
            arguments
                .entry("progress".to_string())
                .or_insert_with(|| ctx.history.summary(ctx.step_count));
        }

        let input = match ToolInput::from_arguments(kind, &arguments) {
            Ok(input) => Ok(input),
            Err(missing) => {
                debug!(tool = %kind, error = %missing, "Asking provider for tool input");
                match self.materialize(ctx, kind).await {
                    Ok(generated) => {
                        arguments.extend(generated);
                        ToolInput::from_arguments(kind, &arguments)
                    }
                    Err(e) => Err(ArgumentError::from(e)),
                }
            }
        };

        match input {
            Ok(input) => Phase::Executing {
                input,
                requested_tool,
            },
            Err(e) => {
                warn!(task_id = %ctx.id, tool = %kind, error = %e, "Could not produce tool input");
                let result = format!("{}Failed to generate input for {}: {}", ERROR_MARKER, kind, e);
                Phase::Stopped(ctx.stop(LoopState::Failed, result))
            }
        }
    }

    async fn materialize(&self, ctx: &TaskContext, kind: ToolKind) -> Result<Arguments, ProviderError> {
        let request = self.request(ctx);
        match tokio::time::timeout(
            self.provider_timeout,
            self.provider.materialize_arguments(kind, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
        }
    }

    /// Runs the tool on its own task so a panic or a hang stays contained.
    async fn execute(&self, input: ToolInput) -> Observation {
        let kind = input.kind();
        let tool = match self.tool_registry.resolve(kind) {
            Ok(tool) => tool,
            Err(e) => return Observation::tool_error(e.to_string()),
        };

        let mut handle = tokio::spawn(async move { tool.execute(input).await });

        match tokio::time::timeout(self.tool_timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => observation_from(result),
            Ok(Ok(Err(e))) => Observation::tool_error(format!("Execution failed: {}", e)),
            Ok(Err(e)) => Observation::tool_error(format!("{} tool crashed: {}", kind, e)),
            Err(_) => {
                handle.abort();
                warn!(tool = %kind, timeout = ?self.tool_timeout, "Tool timed out");
                Observation::timeout(format!("{} timed out after {:?}", kind, self.tool_timeout))
            }
        }
    }

    fn record(&self, ctx: &mut TaskContext, event: Event) -> Phase {
        ctx.last_result = event.observation.text.clone();
        let evicted = ctx.history.push(event);
        if evicted > 0 {
            debug!(evicted, window = ctx.history.window(), "Dropped oldest events");
        }
        Phase::Deciding
    }

    fn decide_next(&self, ctx: &mut TaskContext) -> Phase {
        ctx.step_count += 1;
        if ctx.step_count >= self.max_steps {
            info!(task_id = %ctx.id, steps = ctx.step_count, "Step budget exhausted");
            let result = ctx.last_result.clone();
            return Phase::Stopped(ctx.stop(LoopState::Exhausted, result));
        }
        Phase::Selecting
    }
}

fn observation_from(result: ToolResult) -> Observation {
    if result.success {
        Observation::output(result.output)
    } else {
        Observation::tool_error(result.error.unwrap_or_else(|| "tool reported failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ObservationKind;
    use crate::decision::ScriptedDecisions;
    use crate::traits::Tool;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Reply {
        Output(&'static str),
        Failure(&'static str),
        Raise(&'static str),
        Panic,
        Hang,
        Cancel(CancellationToken),
    }

    struct StubTool {
        kind: ToolKind,
        reply: Reply,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn kind(&self) -> ToolKind {
            self.kind
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, _input: ToolInput) -> anyhow::Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Output(text) => Ok(ToolResult::success(*text)),
                Reply::Failure(text) => Ok(ToolResult::error(*text)),
                Reply::Raise(text) => Err(anyhow::anyhow!(*text)),
                Reply::Panic => panic!("stub tool panicked"),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(ToolResult::success("late"))
                }
                Reply::Cancel(token) => {
                    token.cancel();
                    Ok(ToolResult::success("cancelling"))
                }
            }
        }
    }

    struct Harness {
        registry: ToolRegistry,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: ToolRegistry::new(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn tool(mut self, kind: ToolKind, reply: Reply) -> Self {
            self.registry
                .register(StubTool {
                    kind,
                    reply,
                    calls: self.calls.clone(),
                })
                .unwrap();
            self
        }

        fn agent(self, provider: impl DecisionProvider + 'static) -> (AgentLoop, Arc<AtomicUsize>) {
            let agent = AgentLoop::new(Arc::new(provider), Arc::new(self.registry));
            (agent, self.calls)
        }
    }

    fn bash(command: &str) -> Decision {
        Decision::new("bash", Arguments::new()).with_arg("command", command)
    }

    async fn run(agent: &AgentLoop, task: &str, window: usize) -> TaskContext {
        agent
            .run(TaskContext::new(task, window), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn list_files_scenario() {
        let (agent, calls) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("stdout: a.txt b.txt\nstderr: "))
            .agent(ScriptedDecisions::new(vec![bash("ls")]));

        let ctx = run(&agent, "list files", 1).await;

        assert_eq!(ctx.state, LoopState::Finished);
        assert_eq!(ctx.last_result, "stdout: a.txt b.txt\nstderr: ");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.history.len(), 1);
        let event = ctx.history.latest().unwrap();
        assert_eq!(event.action, r#"bash: {"command":"ls"}"#);
        assert_eq!(event.observation, Observation::output("stdout: a.txt b.txt\nstderr: "));
    }

    #[tokio::test]
    async fn finish_now_scenario() {
        let (agent, calls) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("unused"))
            .agent(ScriptedDecisions::new(vec![Decision::finish("done")]));

        let ctx = run(&agent, "finish now", 1).await;

        assert_eq!(ctx.state, LoopState::Finished);
        assert_eq!(ctx.last_result, "done");
        assert_eq!(ctx.step_count, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(ctx.history.is_empty());
    }

    #[tokio::test]
    async fn finish_without_message_or_history() {
        let (agent, _) = Harness::new().agent(ScriptedDecisions::new(vec![]));
        let ctx = run(&agent, "nothing", 1).await;
        assert_eq!(ctx.state, LoopState::Finished);
        assert_eq!(ctx.last_result, FINISHED_MESSAGE);
    }

    #[tokio::test]
    async fn never_exceeds_step_budget() {
        for max_steps in 1..=5 {
            let script = (0..20).map(|i| bash(&i.to_string())).collect();
            let (agent, calls) = Harness::new()
                .tool(ToolKind::Bash, Reply::Output("ok"))
                .agent(ScriptedDecisions::new(script));
            let agent = agent.with_max_steps(max_steps);

            let ctx = run(&agent, "loop forever", 1).await;

            assert_eq!(ctx.state, LoopState::Exhausted);
            assert_eq!(ctx.step_count, max_steps);
            assert_eq!(calls.load(Ordering::SeqCst), max_steps);
            assert_eq!(ctx.last_result, "ok");
        }
    }

    #[tokio::test]
    async fn zero_step_budget_still_allows_one_step() {
        let (agent, calls) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("ok"))
            .agent(ScriptedDecisions::new(vec![bash("a"), bash("b")]));
        let agent = agent.with_max_steps(0);

        let ctx = run(&agent, "t", 1).await;
        assert_eq!(agent.max_steps(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.state, LoopState::Exhausted);
    }

    #[tokio::test]
    async fn history_keeps_latest_window() {
        let script = (0..8).map(|i| bash(&i.to_string())).collect();
        let (agent, _) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("ok"))
            .agent(ScriptedDecisions::new(script));
        let agent = agent.with_max_steps(8);

        let ctx = run(&agent, "t", 3).await;

        let actions: Vec<_> = ctx.history.iter().map(|e| e.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                r#"bash: {"command":"5"}"#,
                r#"bash: {"command":"6"}"#,
                r#"bash: {"command":"7"}"#,
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tool_falls_back_visibly() {
        let (agent, _) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("unused"))
            .tool(ToolKind::Plan, Reply::Output("1. look around"))
            .agent(ScriptedDecisions::new(vec![
                Decision::new("browsex", Arguments::new()).with_arg("path", "x.html"),
            ]));
        let agent = agent.with_max_steps(1);

        let ctx = run(&agent, "browse x", 1).await;

        let event = ctx.history.latest().unwrap();
        assert_eq!(event.tool, ToolKind::Plan);
        assert_eq!(event.requested_tool.as_deref(), Some("browsex"));
        assert!(event.action.starts_with("plan (requested: browsex): "));
        assert!(event.action.contains(r#""task":"browse x""#));
        assert_eq!(ctx.last_result, "1. look around");
    }

    #[tokio::test]
    async fn unregistered_fallback_finishes_with_trace() {
        let (agent, calls) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("unused"))
            .agent(ScriptedDecisions::new(vec![Decision::new("browsex", Arguments::new())]));

        let ctx = run(&agent, "t", 1).await;

        assert_eq!(ctx.state, LoopState::Finished);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.last_result, "Error: Unknown tool 'browsex' requested, finishing task");
        let event = ctx.history.latest().unwrap();
        assert_eq!(event.tool, ToolKind::Finish);
        assert!(event.was_substituted());
    }

    #[tokio::test]
    async fn tool_failure_becomes_result() {
        let (agent, _) = Harness::new()
            .tool(ToolKind::Bash, Reply::Failure("disk full"))
            .agent(ScriptedDecisions::new(vec![bash("df")]));
        let agent = agent.with_max_steps(1);

        let ctx = run(&agent, "t", 1).await;

        assert_eq!(ctx.state, LoopState::Exhausted);
        assert_eq!(ctx.last_result, "Error: disk full");
        let observation = &ctx.history.latest().unwrap().observation;
        assert_eq!(observation.kind, ObservationKind::ToolError);
    }

    #[tokio::test]
    async fn raised_and_panicking_tools_are_contained() {
        let (agent, _) = Harness::new()
            .tool(ToolKind::Bash, Reply::Raise("boom"))
            .tool(ToolKind::Search, Reply::Panic)
            .agent(ScriptedDecisions::new(vec![
                bash("x"),
                Decision::new("search", Arguments::new()).with_arg("query", "q"),
            ]));
        let agent = agent.with_max_steps(2);

        let ctx = run(&agent, "t", 2).await;

        let observations: Vec<_> = ctx.history.iter().map(|e| e.observation.clone()).collect();
        assert_eq!(observations[0].text, "Error: Execution failed: boom");
        assert_eq!(observations[1].kind, ObservationKind::ToolError);
        assert!(observations[1].text.starts_with("Error: search tool crashed"));
        assert_eq!(ctx.state, LoopState::Exhausted);
    }

    #[tokio::test]
    async fn hanging_tool_times_out() {
        let (agent, _) = Harness::new()
            .tool(ToolKind::Bash, Reply::Hang)
            .agent(ScriptedDecisions::new(vec![bash("sleep 30")]));
        let agent = agent
            .with_max_steps(1)
            .with_tool_timeout(Duration::from_millis(50));

        let ctx = run(&agent, "t", 1).await;

        let observation = &ctx.history.latest().unwrap().observation;
        assert_eq!(observation.kind, ObservationKind::Timeout);
        assert_eq!(observation.text, "Error: bash timed out after 50ms (retryable)");
    }

    struct FailingProvider {
        attempts: AtomicUsize,
        error: ProviderError,
    }

    #[async_trait]
    impl DecisionProvider for FailingProvider {
        async fn decide(&self, _request: DecisionRequest<'_>) -> Result<Decision, ProviderError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    #[tokio::test]
    async fn provider_failure_finishes_with_explanation() {
        let provider = Arc::new(FailingProvider {
            attempts: AtomicUsize::new(0),
            error: ProviderError::Transport("connection refused".into()),
        });
        let agent = AgentLoop::new(provider.clone(), Arc::new(ToolRegistry::new()))
            .with_provider_retries(2);

        let ctx = run(&agent, "t", 1).await;

        assert_eq!(provider.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(ctx.state, LoopState::Finished);
        assert_eq!(
            ctx.last_result,
            "Stopping: decision provider unreachable: connection refused"
        );
    }

    #[tokio::test]
    async fn malformed_decision_is_not_retried() {
        let provider = Arc::new(FailingProvider {
            attempts: AtomicUsize::new(0),
            error: ProviderError::Malformed("no tool".into()),
        });
        let agent = AgentLoop::new(provider.clone(), Arc::new(ToolRegistry::new()))
            .with_provider_retries(3);

        let ctx = run(&agent, "t", 1).await;

        assert_eq!(provider.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.last_result, "Stopping: malformed decision: no tool");
    }

    struct SlowProvider;

    #[async_trait]
    impl DecisionProvider for SlowProvider {
        async fn decide(&self, _request: DecisionRequest<'_>) -> Result<Decision, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Decision::finish("late"))
        }
    }

    #[tokio::test]
    async fn provider_timeout_finishes_task() {
        let agent = AgentLoop::new(Arc::new(SlowProvider), Arc::new(ToolRegistry::new()))
            .with_provider_timeout(Duration::from_millis(20))
            .with_provider_retries(0);

        let ctx = run(&agent, "t", 1).await;

        assert_eq!(ctx.state, LoopState::Finished);
        assert!(ctx.last_result.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_input_fails_without_execution() {
        let (agent, calls) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("unused"))
            .agent(ScriptedDecisions::new(vec![Decision::new("bash", Arguments::new())]));

        let ctx = run(&agent, "t", 1).await;

        assert_eq!(ctx.state, LoopState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(ctx.history.is_empty());
        assert_eq!(
            ctx.last_result,
            "Error: Failed to generate input for bash: missing 'command' argument for bash"
        );
    }

    struct TwoPhaseProvider {
        requests: Mutex<Vec<ToolKind>>,
    }

    #[async_trait]
    impl DecisionProvider for TwoPhaseProvider {
        async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, ProviderError> {
            if request.history.is_empty() {
                Ok(Decision::new("bash", Arguments::new()))
            } else {
                Ok(Decision::finish(""))
            }
        }

        async fn materialize_arguments(
            &self,
            tool: ToolKind,
            _request: DecisionRequest<'_>,
        ) -> Result<Arguments, ProviderError> {
            self.requests.lock().unwrap().push(tool);
            Ok(Arguments::from([("input".to_string(), "ls".to_string())]))
        }
    }

    #[tokio::test]
    async fn materializes_missing_input() {
        let provider = Arc::new(TwoPhaseProvider {
            requests: Mutex::new(vec![]),
        });
        let harness = Harness::new().tool(ToolKind::Bash, Reply::Output("a.txt"));
        let agent = AgentLoop::new(provider.clone(), Arc::new(harness.registry));

        let ctx = run(&agent, "list files", 1).await;

        assert_eq!(*provider.requests.lock().unwrap(), vec![ToolKind::Bash]);
        assert_eq!(ctx.state, LoopState::Finished);
        assert_eq!(ctx.history.latest().unwrap().action, r#"bash: {"command":"ls"}"#);
        assert_eq!(ctx.last_result, "a.txt");
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (agent, calls) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("unused"))
            .agent(ScriptedDecisions::new(vec![bash("ls")]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ctx = agent.run(TaskContext::new("t", 1), &cancel).await;

        assert_eq!(ctx.state, LoopState::Cancelled);
        assert_eq!(ctx.last_result, CANCELLED_MESSAGE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_between_steps() {
        let cancel = CancellationToken::new();
        let (agent, calls) = Harness::new()
            .tool(ToolKind::Bash, Reply::Cancel(cancel.clone()))
            .agent(ScriptedDecisions::new(vec![bash("a"), bash("b"), bash("c")]));

        let ctx = agent.run(TaskContext::new("t", 5), &cancel).await;

        assert_eq!(ctx.state, LoopState::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.step_count, 1);
    }

    #[tokio::test]
    async fn replay_is_deterministic() {
        let script = vec![
            bash("ls"),
            Decision::new("nope", Arguments::new()),
            Decision::new("search", Arguments::new()).with_arg("query", "python"),
            bash(""),
        ];

        let mut runs = vec![];
        for _ in 0..2 {
            let (agent, _) = Harness::new()
                .tool(ToolKind::Bash, Reply::Output("a.txt"))
                .tool(ToolKind::Search, Reply::Failure("offline"))
                .tool(ToolKind::Plan, Reply::Output("plan"))
                .agent(ScriptedDecisions::new(script.clone()));
            let ctx = run(&agent, "replay", 4).await;
            runs.push((ctx.history.to_vec(), ctx.state, ctx.last_result));
        }

        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0].0.len(), 3);
        assert_eq!(runs[0].1, LoopState::Failed);
    }

    #[tokio::test]
    async fn rerun_starts_from_clean_history() {
        let (agent, _) = Harness::new()
            .tool(ToolKind::Bash, Reply::Output("ok"))
            .agent(ScriptedDecisions::new(vec![bash("a")]));

        let first = run(&agent, "t", 3).await;
        assert_eq!(first.history.len(), 1);

        let second = agent.run(first, &CancellationToken::new()).await;
        assert!(second.history.is_empty());
        assert_eq!(second.state, LoopState::Finished);
        assert_eq!(second.last_result, FINISHED_MESSAGE);
    }
}
