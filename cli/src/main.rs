use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use versa_core::traits::{DecisionProvider, Provider};
use versa_core::{
    AgentLoop, Config, LlmDecisionProvider, LoopState, PromptBuilder, ScriptedDecisions,
    TaskContext, config, providers, tools,
};

mod onboard;
mod render;

#[derive(Parser)]
#[command(name = "versa")]
#[command(about = "versa - a step-by-step tool-using agent", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct RunOptions {
    /// File names made available to the task; repeatable
    #[arg(short, long = "file")]
    files: Vec<String>,

    #[arg(long)]
    max_steps: Option<usize>,

    /// Number of past steps shown to the decision model
    #[arg(long)]
    window: Option<usize>,

    /// Print the final task context as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive setup
    Init,
    /// Run a single task
    Run {
        task: String,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Read tasks line by line
    Chat,
    /// Re-run a task from a recorded list of decisions
    Replay {
        decisions: PathBuf,
        #[arg(long)]
        task: String,
        #[command(flatten)]
        options: RunOptions,
    },
    /// List the registered tools
    Tools,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config() -> Result<Config> {
    let config = Config::load_or_init()?;
    onboard::ensure_workspace(&config.workspace_dir)?;
    Ok(config)
}

fn build_agent(
    config: &Config,
    decisions: Arc<dyn DecisionProvider>,
    planner: Option<Arc<dyn Provider>>,
    options: &RunOptions,
) -> Result<AgentLoop> {
    let registry = tools::default_registry(config, planner)?;
    let mut agent = AgentLoop::new(decisions, Arc::new(registry)).with_config(config);
    if let Some(max_steps) = options.max_steps {
        agent = agent.with_max_steps(max_steps);
    }
    Ok(agent)
}

fn live_agent(config: &Config, options: &RunOptions) -> Result<AgentLoop> {
    let provider = providers::create_provider(config)?;
    let decisions = LlmDecisionProvider::new(
        provider.clone(),
        PromptBuilder::new(&config.workspace_dir),
    )
    .with_temperature(config.temperature);

    build_agent(config, Arc::new(decisions), Some(provider), options)
}

fn new_context(task: String, config: &Config, options: &RunOptions) -> TaskContext {
    TaskContext::new(task, options.window.unwrap_or(config.context_window))
        .with_uploaded_files(options.files.clone())
}

/// Runs one task; Ctrl-C cancels it instead of killing the process.
async fn run_task(agent: &AgentLoop, ctx: TaskContext) -> TaskContext {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let ctx = agent.run(ctx, &cancel).await;
    watcher.abort();
    ctx
}

fn report(ctx: &TaskContext, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(ctx)?);
    } else {
        render::print_outcome(ctx);
    }

    Ok(match ctx.state {
        LoopState::Failed | LoopState::Cancelled => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

async fn chat(config: &Config) -> Result<()> {
    let agent = live_agent(config, &RunOptions::default())?;
    let history_path = config::get_versa_dir().join("history.txt");

    let mut editor = DefaultEditor::new().context("Failed to start line editor")?;
    if editor.load_history(&history_path).is_err() {
        debug!(path = %history_path.display(), "No previous chat history");
    }

    println!("{}", style("Versa").cyan().bold());
    println!("One task per line. Ctrl-C cancels a running task, Ctrl-D exits.\n");

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let task = line.trim();
                if task.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(task);

                let ctx = run_task(&agent, new_context(task.to_string(), config, &RunOptions::default())).await;
                render::print_outcome(&ctx);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = editor.save_history(&history_path) {
        warn!(error = %e, "Could not save chat history");
    }
    Ok(())
}

fn list_tools(config: &Config) -> Result<()> {
    let planner = match providers::create_provider(config) {
        Ok(provider) => Some(provider),
        Err(e) => {
            debug!(error = %e, "No chat provider, plan tool unavailable");
            None
        }
    };
    let registry = tools::default_registry(config, planner)?;

    for spec in registry.get_specs() {
        println!("{:<14} {}", style(&spec.name).cyan().bold(), spec.description);
    }
    println!(
        "{:<14} {}",
        style("finish").cyan().bold(),
        "End the task and report the final answer"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or_else(|| {
        if !config::config_exists() {
            Commands::Init
        } else {
            Commands::Chat
        }
    });

    match command {
        Commands::Init => {
            let config = onboard::run_onboard().context("Onboarding failed")?;
            config::save_config(&config)?;
        }
        Commands::Run { task, options } => {
            let config = load_config()?;
            let agent = live_agent(&config, &options)?;
            let ctx = run_task(&agent, new_context(task, &config, &options)).await;
            return report(&ctx, options.json);
        }
        Commands::Chat => {
            let config = load_config()?;
            chat(&config).await?;
        }
        Commands::Replay {
            decisions,
            task,
            options,
        } => {
            let config = load_config()?;
            let scripted = ScriptedDecisions::from_json_file(&decisions)?;
            let planner = providers::create_provider(&config).ok();
            let agent = build_agent(&config, Arc::new(scripted), planner, &options)?;
            let ctx = run_task(&agent, new_context(task, &config, &options)).await;
            return report(&ctx, options.json);
        }
        Commands::Tools => {
            let config = load_config()?;
            list_tools(&config)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
