use crate::config::Config;
use crate::providers::OpenAIProvider;
use crate::traits::Provider;
use anyhow::{Result, anyhow};
use std::sync::Arc;

/// Backends reachable through the OpenAI-compatible client.
struct Preset {
    names: &'static [&'static str],
    base_url: &'static str,
    key_vars: &'static [&'static str],
    needs_key: bool,
}

const PRESETS: &[Preset] = &[
    Preset {
        names: &["openai"],
        base_url: "https://api.openai.com/v1",
        key_vars: &["OPENAI_API_KEY", "VERSA_OPENAI_API_KEY"],
        needs_key: true,
    },
    Preset {
        names: &["openrouter"],
        base_url: "https://openrouter.ai/api/v1",
        key_vars: &["OPENROUTER_API_KEY", "VERSA_OPENROUTER_API_KEY"],
        needs_key: true,
    },
    Preset {
        names: &["gemini", "google"],
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        key_vars: &["GEMINI_API_KEY", "GOOGLE_API_KEY", "VERSA_GEMINI_API_KEY"],
        needs_key: true,
    },
    Preset {
        names: &["ollama"],
        base_url: "http://localhost:11434/v1",
        key_vars: &[],
        needs_key: false,
    },
];

pub fn provider_names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.names[0]).collect()
}

pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    create_provider_with_env(config, |var| std::env::var(var).ok())
}

fn create_provider_with_env(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn Provider>> {
    let provider_name = config.provider.as_deref().unwrap_or("openai").to_lowercase();

    let preset = PRESETS
        .iter()
        .find(|p| p.names.contains(&provider_name.as_str()))
        .ok_or_else(|| {
            anyhow!(
                "Unknown provider: {}. Available: {}",
                provider_name,
                provider_names().join(", ")
            )
        })?;

    let api_key = resolve_api_key_with_fallback(preset.key_vars, &config.api_key, &env);
    if preset.needs_key && api_key.is_none() {
        return Err(anyhow!(
            "No API key found for {}. Set {} or api_key in the config file",
            provider_name,
            preset.key_vars.first().copied().unwrap_or("an API key")
        ));
    }

    let provider = OpenAIProvider::new(api_key)
        .with_model(config.model.clone())
        .with_base_url(config.base_url.as_deref().unwrap_or(preset.base_url));

    Ok(Arc::new(provider))
}

/// Environment first, so keys never have to live in a file.
fn resolve_api_key_with_fallback(
    env_vars: &[&str],
    config_key: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_vars
        .iter()
        .filter_map(|var| env(*var))
        .find(|key| !key.trim().is_empty())
        .or_else(|| (!config_key.is_empty()).then(|| config_key.to_string()))
}
