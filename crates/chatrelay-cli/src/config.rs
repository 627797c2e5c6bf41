//! `chatrelay.toml` loading.

use chatrelay_agent::ModelConfig;
use chatrelay_channels::DispatcherConfig;
use chatrelay_core::{RelayError, RelayResult};
use chatrelay_session::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variables checked for the bot token, in order.
const TOKEN_VARS: [&str; 2] = ["TELEGRAM_BOT_TOKEN", "bot_token"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    /// One JSON document per user under `path`.
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// Database file for `sqlite`, directory for `file`.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub markdown: bool,
    #[serde(default = "default_true")]
    pub show_token_usage: bool,
    #[serde(default = "default_true")]
    pub progress_notice: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_timeout_secs: default_poll_timeout(),
            markdown: true,
            show_token_usage: true,
            progress_notice: true,
        }
    }
}

impl TelegramConfig {
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            markdown: self.markdown,
            show_token_usage: self.show_token_usage,
            progress_notice: self.progress_notice,
        }
    }
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Sqlite
}
fn default_store_path() -> PathBuf {
    PathBuf::from("history.db")
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl RelayConfig {
    /// Read `path`, falling back to built-in defaults when it does not exist.
    pub async fn load(path: &Path) -> RelayResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RelayError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))),
        }
    }

    pub fn parse(raw: &str) -> RelayResult<Self> {
        toml::from_str(raw).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Fill the bot token from the environment when the file leaves it empty.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if !self.telegram.bot_token.is_empty() {
            return;
        }
        if let Some(token) = TOKEN_VARS
            .iter()
            .filter_map(|var| lookup(var))
            .find(|v| !v.trim().is_empty())
        {
            self.telegram.bot_token = token.trim().to_string();
        }
    }

    pub fn validate(&self) -> RelayResult<()> {
        self.session.validate()
    }

    /// Like [`validate`](Self::validate), plus what `serve` needs.
    pub fn validate_for_serve(&self) -> RelayResult<()> {
        self.validate()?;
        if self.telegram.bot_token.is_empty() {
            return Err(RelayError::Config(
                "telegram.bot_token is not set (or export TELEGRAM_BOT_TOKEN)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chatrelay_agent::LlmProvider;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = RelayConfig::parse("").unwrap();
        assert_eq!(config.model.provider, LlmProvider::Ollama);
        assert_eq!(config.session.window, 10);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.path, PathBuf::from("history.db"));
        assert_eq!(config.telegram.poll_timeout_secs, 30);
        assert_eq!(config.telegram.dispatcher(), DispatcherConfig::default());
    }

    #[test]
    fn test_full_file() {
        let config = RelayConfig::parse(
            r#"
            [model]
            provider = "openai"
            model_id = "gpt-4o-mini"
            api_key = "sk-test"
            timeout_secs = 60

            [session]
            window = 4
            default_role = "Be brief."

            [store]
            backend = "file"
            path = "./sessions"

            [telegram]
            bot_token = "123:abc"
            markdown = false
            "#,
        )
        .unwrap();
        assert_eq!(config.model.provider, LlmProvider::OpenAi);
        assert_eq!(config.model.timeout_secs, 60);
        assert_eq!(config.session.window, 4);
        assert_eq!(config.session.default_role, "Be brief.");
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert!(!config.telegram.dispatcher().markdown);
        assert!(config.telegram.show_token_usage);
        config.validate_for_serve().unwrap();
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = RelayConfig::parse("[store]\nbackend = \"redis\"").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_zero_window_fails_validation() {
        let config = RelayConfig::parse("[session]\nwindow = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_from_env() {
        let mut config = RelayConfig::default();
        config.apply_env(|var| (var == "bot_token").then(|| " legacy ".to_string()));
        assert_eq!(config.telegram.bot_token, "legacy");

        let mut config = RelayConfig::default();
        config.apply_env(|var| match var {
            "TELEGRAM_BOT_TOKEN" => Some("new".to_string()),
            _ => Some("legacy".to_string()),
        });
        assert_eq!(config.telegram.bot_token, "new");
    }

    #[test]
    fn test_file_token_wins_over_env() {
        let mut config = RelayConfig::parse("[telegram]\nbot_token = \"file\"").unwrap();
        config.apply_env(|_| Some("env".to_string()));
        assert_eq!(config.telegram.bot_token, "file");
    }

    #[test]
    fn test_serve_requires_token() {
        let config = RelayConfig::default();
        config.validate().unwrap();
        assert!(matches!(
            config.validate_for_serve(),
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file_defaults_and_reads_existing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = RelayConfig::load(&dir.path().join("nope.toml")).await.unwrap();
        assert_eq!(missing.session.window, 10);

        let path = dir.path().join("chatrelay.toml");
        tokio::fs::write(&path, "[session]\nwindow = 3\n").await.unwrap();
        let loaded = RelayConfig::load(&path).await.unwrap();
        assert_eq!(loaded.session.window, 3);
    }
}
