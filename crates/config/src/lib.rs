//! Configuration management for reagent
//!
//! Loads and saves the JSON configuration file. Every field has a default, so
//! a missing file or a partial document is always usable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, conversations_dir, data_dir, expand_home};

/// Environment variables consulted for the API key, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["REAGENT_API_KEY", "DASHSCOPE_API_KEY"];

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("◆ CONFIG IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ CONFIG PARSE ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Agent persona and generation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: None,
            system_prompt: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tool_iterations: default_max_tool_iterations(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

fn default_name() -> String {
    "reagent".to_string()
}

fn default_model() -> String {
    "qwen-max".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tool_iterations() -> u32 {
    3
}

fn default_memory_capacity() -> usize {
    100
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

/// Model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Where conversations are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    #[default]
    File,
    Memory,
}

/// Memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackend,
    #[serde(default = "default_memory_dir")]
    pub dir: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::default(),
            dir: default_memory_dir(),
        }
    }
}

fn default_memory_dir() -> String {
    "~/.reagent/conversations".to_string()
}

/// Tool selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
        }
    }
}

fn default_enabled_tools() -> Vec<String> {
    [
        "finish",
        "math_calculator",
        "string_processor",
        "time_utils",
        "navigate_to_screen",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Signed-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
        }
    }
}

fn default_user_id() -> String {
    "default_user".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub user: UserConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ No config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("◆ Reading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ Writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Conversation directory with `~` expanded
    pub fn conversations_dir(&self) -> PathBuf {
        expand_home(&self.memory.dir)
    }

    /// API key from the config file, then the environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    /// API key resolution with an explicit environment lookup
    pub fn api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        let key = self.provider.api_key.trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }

        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Configured endpoint, if any
    pub fn api_base(&self) -> Option<String> {
        self.provider
            .api_base
            .as_ref()
            .filter(|base| !base.trim().is_empty())
            .cloned()
    }

    pub fn default_model(&self) -> String {
        self.agent.defaults.model.clone()
    }

    /// Whether a tool name is enabled (names compared trimmed)
    pub fn tool_enabled(&self, name: &str) -> bool {
        self.tools.enabled.iter().any(|t| t.trim() == name)
    }
}

/// Write the default config if missing and create the data directories
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ Config already exists at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ Config written to {:?}", config_path);
    }

    let config = Config::load().await?;
    let conversations = config.conversations_dir();
    paths::ensure_dir(&conversations).await?;
    info!("◆ Conversations stored in {:?}", conversations);

    Ok(config)
}
