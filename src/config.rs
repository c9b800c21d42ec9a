//! Configuration loading and validation.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. A `.env` file is merged into the environment by
//! [`load_dotenv`] at startup. Validation reports every problem at once.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Discord's per-message character limit.
pub const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// Relaybot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (holds the conversation database).
    pub data_dir: PathBuf,

    /// Discord connection and trigger settings.
    pub discord: DiscordConfig,

    /// LLM provider configuration.
    pub llm: LlmConfig,

    /// Augmented-mode routing settings.
    pub routing: RoutingSettings,

    /// Conversation memory settings.
    pub history: HistoryConfig,

    /// Liveness endpoint settings.
    pub health: HealthConfig,
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    /// Also engage when a role the bot holds is mentioned.
    pub role_mention_trigger: bool,
    /// How many preceding channel messages to include as context.
    pub context_messages: usize,
    pub max_message_length: usize,
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    /// OpenAI-compatible base URL, without the `/v1` suffix.
    pub base_url: String,
    /// Model for regular requests.
    pub model: String,
    /// Search-capable model used in augmented mode.
    pub search_model: String,
    pub max_tokens: u32,
    pub system_prompt: String,
    /// Overrides `system_prompt` with the contents of this file when set.
    pub system_prompt_file: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub image_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RoutingSettings {
    pub web_search_enabled: bool,
    /// Replaces the built-in keyword list when set.
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryConfig {
    /// Retained user/assistant exchange pairs per conversation.
    pub depth: usize,
    pub dedup_window_secs: u64,
}

/// Retained exchanges when `MAX_HISTORY_LENGTH` is unset. Matches the value
/// existing deployments of the bot were started with.
pub const DEFAULT_HISTORY_DEPTH: usize = 20;

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_HISTORY_DEPTH,
            dedup_window_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "0.0.0.0".into(),
            port: 10000,
        }
    }
}

/// On-disk TOML layout. Every field is optional; env vars win over it.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlConfig {
    pub data_dir: Option<PathBuf>,
    pub discord: TomlDiscordConfig,
    pub llm: TomlLlmConfig,
    pub routing: TomlRoutingConfig,
    pub history: TomlHistoryConfig,
    pub health: TomlHealthConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlDiscordConfig {
    pub token: Option<String>,
    pub role_mention_trigger: Option<bool>,
    pub context_messages: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlLlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub search_model: Option<String>,
    pub system_prompt: Option<String>,
    pub system_prompt_file: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub image_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlRoutingConfig {
    pub web_search_enabled: Option<bool>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlHistoryConfig {
    pub depth: Option<usize>,
    pub dedup_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TomlHealthConfig {
    pub enabled: Option<bool>,
    pub bind: Option<String>,
    pub port: Option<u16>,
}

impl TomlConfig {
    pub fn parse(content: &str, path: &str) -> Result<Self> {
        toml::from_str(content).map_err(|error| {
            ConfigError::Parse {
                path: path.to_string(),
                message: error.to_string(),
            }
            .into()
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(error),
        })?;
        Self::parse(&content, &path.display().to_string())
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with_file(None)
    }

    /// Load from a specific config file path, with env overrides on top.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        Self::load_with_file(Some(path))
    }

    fn load_with_file(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => TomlConfig::load(path)?,
            None => TomlConfig::default(),
        };

        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(file, |key| env.get(key).cloned())
    }

    /// Merge defaults, file values and env values, then validate.
    pub fn from_sources(
        file: TomlConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut problems = Vec::new();
        let mut missing = Vec::new();

        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let token = non_empty(env("DISCORD_BOT_TOKEN")).or(non_empty(file.discord.token));
        if token.is_none() {
            missing.push("DISCORD_BOT_TOKEN".to_string());
        }

        let api_key = non_empty(env("OPENAI_API_KEY")).or(non_empty(file.llm.api_key));
        if api_key.is_none() {
            missing.push("OPENAI_API_KEY".to_string());
        }

        let role_mention_trigger = parse_env(&env, "ROLE_MENTION_TRIGGER", parse_bool, &mut problems)
            .or(file.discord.role_mention_trigger)
            .unwrap_or(false);

        let context_messages = file.discord.context_messages.unwrap_or(3);

        let history_defaults = HistoryConfig::default();
        let depth = parse_env(&env, "MAX_HISTORY_LENGTH", parse_usize, &mut problems)
            .or(file.history.depth)
            .unwrap_or(history_defaults.depth);
        if depth == 0 {
            problems.push("MAX_HISTORY_LENGTH must be at least 1".to_string());
        }
        let dedup_window_secs = file
            .history
            .dedup_window_secs
            .unwrap_or(history_defaults.dedup_window_secs);

        let web_search_enabled = parse_env(&env, "WEB_SEARCH_ENABLED", parse_bool, &mut problems)
            .or(file.routing.web_search_enabled)
            .unwrap_or(true);

        if let Some(keywords) = &file.routing.keywords
            && keywords.iter().any(|keyword| keyword.trim().is_empty())
        {
            problems.push("routing.keywords must not contain empty entries".to_string());
        }

        let health_defaults = HealthConfig::default();
        let health_enabled = parse_env(&env, "HEALTH_SERVER", parse_bool, &mut problems)
            .or(env("RENDER").map(|_| true))
            .or(file.health.enabled)
            .unwrap_or(health_defaults.enabled);
        let port = parse_env(&env, "PORT", parse_port, &mut problems)
            .or(file.health.port)
            .unwrap_or(health_defaults.port);

        let data_dir = env("DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(default_data_dir);

        if !missing.is_empty() {
            if problems.is_empty() {
                return Err(ConfigError::MissingKeys(missing).into());
            }
            problems.insert(0, format!("missing required config keys: {}", missing.join(", ")));
        }
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems.join("; ")).into());
        }

        Ok(Self {
            data_dir,
            discord: DiscordConfig {
                token: token.unwrap_or_default(),
                role_mention_trigger,
                context_messages,
                max_message_length: DISCORD_MAX_MESSAGE_LENGTH,
            },
            llm: LlmConfig {
                api_key: api_key.unwrap_or_default(),
                base_url: env("OPENAI_BASE_URL")
                    .or(file.llm.base_url)
                    .unwrap_or_else(|| "https://api.openai.com".into()),
                model: env("AI_MODEL")
                    .or(file.llm.model)
                    .unwrap_or_else(|| "gpt-4o".into()),
                search_model: env("SEARCH_MODEL")
                    .or(file.llm.search_model)
                    .unwrap_or_else(|| "gpt-4o-search-preview".into()),
                max_tokens: 2000,
                system_prompt: env("SYSTEM_PROMPT")
                    .or(file.llm.system_prompt)
                    .unwrap_or_else(|| crate::prompts::DEFAULT_SYSTEM_PROMPT.into()),
                system_prompt_file: env("SYSTEM_PROMPT_FILE")
                    .map(PathBuf::from)
                    .or(file.llm.system_prompt_file),
                request_timeout_secs: file.llm.request_timeout_secs.unwrap_or(120),
                image_timeout_secs: file.llm.image_timeout_secs.unwrap_or(30),
            },
            routing: RoutingSettings {
                web_search_enabled,
                keywords: file.routing.keywords,
            },
            history: HistoryConfig {
                depth,
                dedup_window_secs,
            },
            health: HealthConfig {
                enabled: health_enabled,
                bind: file.health.bind.unwrap_or(health_defaults.bind),
                port,
            },
        })
    }

    /// Resolve the effective system prompt, reading the prompt file if configured.
    pub async fn system_prompt(&self) -> Result<String> {
        match &self.llm.system_prompt_file {
            Some(path) => crate::prompts::load_prompt_file(path).await,
            None => Ok(self.llm.system_prompt.clone()),
        }
    }

    /// Get the conversation database path.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("conversations.redb")
    }
}

/// Load `.env` from the working directory (or a parent) into the process
/// environment. Existing variables win. Call before logging is initialized so
/// `RUST_LOG` can come from the file too.
///
/// A missing file is normal in deployed environments and returns `None`.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Load a specific env file into the process environment.
pub fn load_dotenv_file(path: &Path) -> Option<PathBuf> {
    dotenvy::from_path(path).ok().map(|()| path.to_path_buf())
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("relaybot"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn parse_env<T>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: fn(&str) -> Option<T>,
    problems: &mut Vec<String>,
) -> Option<T> {
    let raw = env(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        problems.push(format!("{key} has an invalid value: {raw:?}"));
    }
    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_usize(value: &str) -> Option<usize> {
    value.parse().ok()
}

fn parse_port(value: &str) -> Option<u16> {
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![("DISCORD_BOT_TOKEN", "token"), ("OPENAI_API_KEY", "sk-test")]
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let config = Config::from_sources(TomlConfig::default(), env_from(&required()))
            .expect("config should load");

        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.history.depth, DEFAULT_HISTORY_DEPTH);
        assert_eq!(config.history.depth, 20);
        assert_eq!(config.history.dedup_window_secs, 60);
        assert_eq!(config.discord.context_messages, 3);
        assert_eq!(config.discord.max_message_length, 2000);
        assert!(config.routing.web_search_enabled);
        assert!(!config.discord.role_mention_trigger);
        assert!(!config.health.enabled);
        assert_eq!(config.health.port, 10000);
    }

    #[test]
    fn reports_every_missing_credential() {
        let error = Config::from_sources(TomlConfig::default(), env_from(&[]))
            .expect_err("missing credentials must fail");

        let message = error.to_string();
        assert!(message.contains("DISCORD_BOT_TOKEN"));
        assert!(message.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let error = Config::from_sources(
            TomlConfig::default(),
            env_from(&[("DISCORD_BOT_TOKEN", "  "), ("OPENAI_API_KEY", "sk")]),
        )
        .expect_err("blank token must fail");

        assert!(error.to_string().contains("DISCORD_BOT_TOKEN"));
    }

    #[test]
    fn env_overrides_file_values() {
        let file = TomlConfig::parse(
            r#"
            [llm]
            model = "gpt-4o-mini"

            [history]
            depth = 4

            [routing]
            web_search_enabled = true
            "#,
            "test.toml",
        )
        .expect("toml should parse");

        let mut env = required();
        env.push(("MAX_HISTORY_LENGTH", "7"));
        env.push(("WEB_SEARCH_ENABLED", "false"));

        let config = Config::from_sources(file, env_from(&env)).expect("config should load");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.history.depth, 7);
        assert!(!config.routing.web_search_enabled);
    }

    #[test]
    fn render_environment_enables_health_server() {
        let mut env = required();
        env.push(("RENDER", "true"));
        env.push(("PORT", "8080"));

        let config = Config::from_sources(TomlConfig::default(), env_from(&env))
            .expect("config should load");
        assert!(config.health.enabled);
        assert_eq!(config.health.port, 8080);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut env = required();
        env.push(("MAX_HISTORY_LENGTH", "lots"));
        env.push(("ROLE_MENTION_TRIGGER", "maybe"));

        let error = Config::from_sources(TomlConfig::default(), env_from(&env))
            .expect_err("invalid values must fail");
        let message = error.to_string();
        assert!(message.contains("MAX_HISTORY_LENGTH"));
        assert!(message.contains("ROLE_MENTION_TRIGGER"));
    }

    #[test]
    fn missing_and_invalid_values_are_reported_together() {
        let error = Config::from_sources(
            TomlConfig::default(),
            env_from(&[("OPENAI_API_KEY", "sk"), ("PORT", "http")]),
        )
        .expect_err("must fail");

        let message = error.to_string();
        assert!(message.contains("DISCORD_BOT_TOKEN"));
        assert!(message.contains("PORT"));
    }

    #[test]
    fn env_file_values_reach_the_process_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".env");
        std::fs::write(&path, "RELAYBOT_DOTENV_CHECK=from-file\n").expect("write env file");

        let loaded = load_dotenv_file(&path).expect("env file should load");
        assert_eq!(loaded, path);
        assert_eq!(
            std::env::var("RELAYBOT_DOTENV_CHECK").expect("variable set"),
            "from-file"
        );
    }

    #[test]
    fn missing_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_dotenv_file(&dir.path().join(".env")).is_none());
    }

    #[test]
    fn zero_history_depth_is_rejected() {
        let mut env = required();
        env.push(("MAX_HISTORY_LENGTH", "0"));

        assert!(Config::from_sources(TomlConfig::default(), env_from(&env)).is_err());
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        assert!(TomlConfig::parse("[llm]\nmodle = \"typo\"\n", "test.toml").is_err());
    }

    #[test]
    fn file_keywords_replace_defaults() {
        let file = TomlConfig::parse("[routing]\nkeywords = [\"stock\", \"rain\"]\n", "t.toml")
            .expect("toml should parse");
        let config = Config::from_sources(file, env_from(&required())).expect("config");

        assert_eq!(
            config.routing.keywords,
            Some(vec!["stock".to_string(), "rain".to_string()])
        );
    }
}
