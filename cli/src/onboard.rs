use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Password, Select};
use std::path::Path;
use versa_core::config::Config;
use versa_core::providers::provider_names;

pub const DEFAULT_AGENT_NOTES: &str = r#"# AGENT.md

Notes here are shown to the decision model before every step.

## Environment

- Python interpreter: python3
- Files the agent creates land in this workspace directory

## Preferences

- Prefer `file_view` over `cat` for reading files
- Finish as soon as the task is answered
"#;

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{}",
        style(format!("[{}/{}] {}", step, total, title))
            .cyan()
            .bold()
    );
    println!();
}

fn ensure_file(path: &Path, content: &str) -> Result<bool> {
    if !path.exists() {
        std::fs::write(path, content)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

pub fn ensure_workspace(workspace: &Path) -> Result<()> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("Could not create workspace at {}", workspace.display()))?;
    ensure_file(&workspace.join("AGENT.md"), DEFAULT_AGENT_NOTES)?;
    Ok(())
}

fn models_for(provider: &str) -> &'static [&'static str] {
    match provider {
        "gemini" => &["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"],
        "openrouter" => &["openai/gpt-4o-mini", "anthropic/claude-3.5-haiku", "google/gemini-2.0-flash-001"],
        "ollama" => &["llama3.1", "qwen2.5-coder", "mistral"],
        _ => &["gpt-4o-mini", "gpt-4o", "gpt-4.1-mini"],
    }
}

fn setup_provider() -> Result<String> {
    let providers = provider_names();

    let selection = Select::new()
        .with_prompt("Select your provider")
        .items(&providers)
        .default(0)
        .interact()
        .context("Failed to select provider")?;

    Ok(providers[selection].to_string())
}

fn setup_model(provider: &str) -> Result<String> {
    let models = models_for(provider);

    let selection = Select::new()
        .with_prompt("Select your model")
        .items(models)
        .default(0)
        .interact()
        .context("Failed to select model")?;

    Ok(models[selection].to_string())
}

fn setup_api_key(provider: &str) -> Result<String> {
    if provider == "ollama" {
        println!("  {} Ollama runs locally, no key needed", style("✓").green());
        return Ok(String::new());
    }

    println!(
        "  {} Prefer exporting the key in your shell (e.g. {}_API_KEY).",
        style("→").green(),
        provider.to_uppercase()
    );
    println!(
        "  {}",
        style("Leave empty to rely on the environment variable.").dim()
    );

    Password::new()
        .with_prompt("API key (stored in the config file)")
        .allow_empty_password(true)
        .interact()
        .context("Failed to read API key")
}

fn setup_max_steps() -> Result<usize> {
    Input::new()
        .with_prompt("Maximum tool steps per task")
        .default(10usize)
        .validate_with(|n: &usize| if *n == 0 { Err("must be at least 1") } else { Ok(()) })
        .interact_text()
        .context("Failed to read step budget")
}

pub fn run_onboard() -> Result<Config> {
    println!();
    println!("  {}", style("Welcome to Versa!").white().bold());
    println!(
        "  {}",
        style("This wizard writes your agent configuration.").dim()
    );

    print_step(1, 4, "Provider");
    let provider = setup_provider()?;

    print_step(2, 4, "Model Selection");
    let model = setup_model(&provider)?;

    print_step(3, 4, "API Key");
    let api_key = setup_api_key(&provider)?;

    print_step(4, 4, "Step Budget");
    let max_steps = setup_max_steps()?;

    let config = Config {
        provider: Some(provider),
        api_key,
        model,
        max_steps,
        ..Default::default()
    };

    if let Err(e) = ensure_workspace(&config.workspace_dir) {
        eprintln!(
            "  {} Warning: Could not prepare workspace: {}",
            style("!").yellow(),
            e
        );
    } else {
        println!();
        println!(
            "  {} Workspace ready at {}",
            style("✓").green(),
            style(config.workspace_dir.display()).cyan()
        );
        println!("  {} - AGENT.md", style("  ").dim());
    }

    println!();
    println!("  {} Configuration complete!", style("✓").green().bold());
    println!(
        "  {} Config saved to {}",
        style("→").green(),
        style(versa_core::config::get_config_path().display()).cyan()
    );
    println!(
        "  {} You can now run: {}",
        style("→").green(),
        style("versa run \"list files\"").cyan().bold()
    );
    println!();

    Ok(config)
}
