use crate::tools::ToolKind;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const VERSA_DIR: &str = ".versa";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    /// Prefer the provider's environment variable; this is only a fallback.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_steps: usize,
    pub context_window: usize,
    pub fallback_tool: ToolKind,
    pub provider_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub provider_retries: u32,
    pub python: String,
    pub knowledge_base: BTreeMap<String, String>,
    #[serde(skip)]
    pub workspace_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: None,
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_steps: 10,
            context_window: 1,
            fallback_tool: ToolKind::Plan,
            provider_timeout_secs: 60,
            tool_timeout_secs: 30,
            provider_retries: 1,
            python: "python3".to_string(),
            knowledge_base: default_knowledge_base(),
            workspace_dir: get_versa_dir().join("workspace"),
        }
    }
}

fn default_knowledge_base() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "python syntax".to_string(),
            "Python is a high-level programming language with clear syntax...".to_string(),
        ),
        (
            "html basics".to_string(),
            "HTML uses tags like <button>, <a>, <input> to structure web content...".to_string(),
        ),
    ])
}

pub fn get_versa_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(VERSA_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_versa_dir().join("config.toml")
}

pub fn ensure_versa_dir() -> Result<PathBuf> {
    let versa_dir = get_versa_dir();

    if !versa_dir.exists() {
        std::fs::create_dir_all(&versa_dir).with_context(|| {
            format!("Failed to create versa directory at {}", versa_dir.display())
        })?;
    }

    Ok(versa_dir)
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            bail!("max_steps must be at least 1");
        }
        if self.context_window == 0 {
            bail!("context_window must be at least 1");
        }
        if self.provider_timeout_secs == 0 || self.tool_timeout_secs == 0 {
            bail!("timeouts must be at least one second");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature must be between 0 and 2, got {}", self.temperature);
        }
        Ok(())
    }
}

pub fn load_config() -> Result<Config> {
    let mut config = load_config_from(&get_config_path())?;
    config.workspace_dir = get_versa_dir().join("workspace");
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!("Config file not found. Run 'versa init' to set up your configuration.")
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        }
    })?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;
    config.workspace_dir = path
        .parent()
        .map(|dir| dir.join("workspace"))
        .unwrap_or_else(|| PathBuf::from("workspace"));

    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_versa_dir()?;
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}
