use crate::error::{Result, VerbaError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerbaConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Custom path for the SQLite database. Defaults to `~/.config/verba/verba.db`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            host: default_web_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    /// (defaults to the provider's conventional one, e.g. `OPENAI_API_KEY`).
    #[serde(default)]
    pub env_var: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            env_var: None,
        }
    }
}

/// Knobs for the greeting and reply completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_greeting_prompt")]
    pub greeting_prompt: String,
    #[serde(default = "default_greeting_max_tokens")]
    pub greeting_max_tokens: u32,
    #[serde(default = "default_reply_max_tokens")]
    pub reply_max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            greeting_prompt: default_greeting_prompt(),
            greeting_max_tokens: default_greeting_max_tokens(),
            reply_max_tokens: default_reply_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_max_extract_chars")]
    pub max_extract_chars: usize,
    /// Also store attachments with the completion provider for the duration
    /// of one turn. The remote copy is deleted after the reply.
    #[serde(default)]
    pub remote_copy: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_upload_bytes(),
            max_extract_chars: default_max_extract_chars(),
            remote_copy: false,
        }
    }
}

/// Valid LLM provider names.
pub const VALID_LLM_PROVIDERS: &[&str] = &["openai", "ollama", "echo"];

// -- Defaults --

fn default_web_port() -> u16 {
    8000
}
fn default_web_host() -> String {
    "127.0.0.1".to_string()
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_greeting_prompt() -> String {
    "Greet the user in one or two friendly sentences and offer to help.".to_string()
}
fn default_greeting_max_tokens() -> u32 {
    50
}
fn default_reply_max_tokens() -> u32 {
    300
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_extract_chars() -> usize {
    20_000
}

impl VerbaConfig {
    /// Load configuration in layers, later layers winning:
    /// 1. ~/.config/verba/config.toml (global)
    /// 2. `explicit` file, if given (must exist)
    /// 3. `VERBA_*` environment variables, `__` between section and key
    ///    (e.g. `VERBA_WEB__PORT=9000`)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("VERBA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| VerbaError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| VerbaError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Validate config values, clamping out-of-range values and logging warnings.
    /// Bad values are fixed up rather than rejected.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            warnings.push(format!(
                "unknown LLM provider '{}', valid: {}",
                self.llm.provider,
                VALID_LLM_PROVIDERS.join(", ")
            ));
        }

        if self.chat.greeting_max_tokens == 0 {
            warnings.push("chat.greeting_max_tokens = 0, setting to 50".to_string());
            self.chat.greeting_max_tokens = default_greeting_max_tokens();
        }
        if self.chat.reply_max_tokens == 0 {
            warnings.push("chat.reply_max_tokens = 0, setting to 300".to_string());
            self.chat.reply_max_tokens = default_reply_max_tokens();
        }
        if self.chat.greeting_prompt.trim().is_empty() {
            warnings.push("chat.greeting_prompt is empty, using default".to_string());
            self.chat.greeting_prompt = default_greeting_prompt();
        }

        if self.uploads.max_bytes == 0 {
            warnings.push("uploads.max_bytes = 0, setting to 10 MiB".to_string());
            self.uploads.max_bytes = default_max_upload_bytes();
        }
        if self.uploads.max_extract_chars == 0 {
            warnings.push("uploads.max_extract_chars = 0, setting to 20000".to_string());
            self.uploads.max_extract_chars = default_max_extract_chars();
        }

        // Log warnings via tracing (if subscriber is set up)
        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }

    /// Path of the SQLite database: `storage.path` or `~/.config/verba/verba.db`.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.path {
            Some(p) => Ok(PathBuf::from(p)),
            None => dirs::config_dir()
                .map(|p| p.join("verba").join("verba.db"))
                .ok_or_else(|| VerbaError::Config("cannot determine config directory".to_string())),
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("verba").join("config.toml"))
}

/// Resolve an API key: check config field first, then environment variable.
pub fn resolve_api_key(
    api_key: Option<&str>,
    env_var_override: Option<&str>,
    default_env_var: &str,
    provider_name: &str,
) -> Result<String> {
    if let Some(key) = api_key {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    let env_var_name = env_var_override.unwrap_or(default_env_var);

    match std::env::var(env_var_name) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(VerbaError::Config(format!(
            "{provider_name} LLM provider requires an API key \
             (set llm.api_key or {env_var_name})"
        ))),
    }
}
