use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::flows::ConversationSettings;

/// Searched in order when no explicit path is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["chatcart.toml", "config/chatcart.toml"];

/// Environment variables and the dotted config key each one overrides. When two
/// variables target the same key, the one listed first wins.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("CHATCART_LINE_CHANNEL_SECRET", "line.channel_secret"),
    ("CHATCART_LINE_ACCESS_TOKEN", "line.access_token"),
    ("CHATCART_LINE_API_BASE_URL", "line.api_base_url"),
    ("CHATCART_LINE_STAFF_TARGET", "line.staff_target"),
    ("CHATCART_LLM_PROVIDER", "llm.provider"),
    ("CHATCART_LLM_API_KEY", "llm.api_key"),
    ("CHATCART_LLM_BASE_URL", "llm.base_url"),
    ("CHATCART_LLM_MODEL", "llm.model"),
    ("CHATCART_LLM_TEMPERATURE", "llm.temperature"),
    ("CHATCART_LLM_MAX_TOKENS", "llm.max_tokens"),
    ("CHATCART_LLM_TIMEOUT_SECS", "llm.timeout_secs"),
    ("CHATCART_CATALOG_PATH", "catalog.path"),
    ("CHATCART_CATALOG_REFRESH_SECS", "catalog.refresh_secs"),
    ("CHATCART_DATABASE_URL", "database.url"),
    ("CHATCART_DATABASE_MAX_CONNECTIONS", "database.max_connections"),
    ("CHATCART_DATABASE_TIMEOUT_SECS", "database.timeout_secs"),
    ("CHATCART_SERVER_BIND_ADDRESS", "server.bind_address"),
    ("CHATCART_SERVER_PORT", "server.port"),
    ("CHATCART_SERVER_GRACEFUL_SHUTDOWN_SECS", "server.graceful_shutdown_secs"),
    ("CHATCART_CONVERSATION_SESSION_IDLE_TIMEOUT_SECS", "conversation.session_idle_timeout_secs"),
    ("CHATCART_CONVERSATION_MIN_ADDRESS_CHARS", "conversation.min_address_chars"),
    ("CHATCART_CONVERSATION_MAX_DISAMBIGUATION_CHOICES", "conversation.max_disambiguation_choices"),
    ("CHATCART_CONVERSATION_MAX_QUANTITY", "conversation.max_quantity"),
    ("CHATCART_CONVERSATION_EXTERNAL_CALL_TIMEOUT_MS", "conversation.external_call_timeout_ms"),
    ("CHATCART_CONVERSATION_UTC_OFFSET_HOURS", "conversation.utc_offset_hours"),
    ("CHATCART_LOGGING_LEVEL", "logging.level"),
    ("CHATCART_LOG_LEVEL", "logging.level"),
    ("CHATCART_LOGGING_FORMAT", "logging.format"),
    ("CHATCART_LOG_FORMAT", "logging.format"),
];

/// Environment variables that override `key`, highest precedence first.
pub fn env_keys_for(key: &str) -> impl Iterator<Item = &'static str> + '_ {
    ENV_OVERRIDES.iter().filter(move |(_, target)| *target == key).map(|(env_key, _)| *env_key)
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub line: LineConfig,
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    #[serde(deserialize_with = "secret")]
    pub channel_secret: SecretString,
    #[serde(deserialize_with = "secret")]
    pub access_token: SecretString,
    pub api_base_url: String,
    /// User or group id that receives order summaries and error alerts.
    pub staff_target: Option<String>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: SecretString::from(String::new()),
            access_token: SecretString::from(String::new()),
            api_base_url: "https://api.line.me".to_owned(),
            staff_target: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    #[serde(deserialize_with = "optional_secret")]
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Disabled,
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_owned(),
            temperature: 0.4,
            max_tokens: 300,
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
    pub refresh_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("catalog.toml"), refresh_secs: 300 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://chatcart.db".to_owned(), max_connections: 5, timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_owned(), port: 8080, graceful_shutdown_secs: 15 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub session_idle_timeout_secs: u64,
    pub min_address_chars: usize,
    pub max_disambiguation_choices: usize,
    pub max_quantity: u32,
    pub external_call_timeout_ms: u64,
    /// Offset of the shop's wall clock; promotions are dated in shop-local days.
    pub utc_offset_hours: i32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            session_idle_timeout_secs: 1800,
            min_address_chars: 15,
            max_disambiguation_choices: 5,
            max_quantity: 999,
            external_call_timeout_ms: 5000,
            utc_offset_hours: 7,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    Disabled,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Programmatic overrides; these win over both the file and the environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub catalog_path: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub line_channel_secret: Option<String>,
    pub line_access_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl AppConfig {
    /// Layers defaults, the first config file found, `CHATCART_*` variables and
    /// `options.overrides`, then validates the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = match find_config_file(options.config_path.as_deref()) {
            Some(path) => read_file(&path)?,
            None if options.require_file => {
                let expected =
                    options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => Self::default(),
        };

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn conversation_settings(&self) -> ConversationSettings {
        ConversationSettings {
            min_address_chars: self.conversation.min_address_chars,
            max_disambiguation_choices: self.conversation.max_disambiguation_choices,
            max_quantity: self.conversation.max_quantity,
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        let mut applied: Vec<&str> = Vec::new();
        for (env_key, key) in ENV_OVERRIDES {
            if applied.contains(key) {
                continue;
            }
            if let Some(value) = read_env(env_key) {
                self.set(key, value, env_key)?;
                applied.push(*key);
            }
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: String, env_key: &str) -> Result<(), ConfigError> {
        match key {
            "line.channel_secret" => self.line.channel_secret = SecretString::from(value),
            "line.access_token" => self.line.access_token = SecretString::from(value),
            "line.api_base_url" => self.line.api_base_url = value,
            "line.staff_target" => self.line.staff_target = Some(value),
            "llm.provider" => self.llm.provider = value.parse()?,
            "llm.api_key" => self.llm.api_key = Some(SecretString::from(value)),
            "llm.base_url" => self.llm.base_url = Some(value),
            "llm.model" => self.llm.model = value,
            "llm.temperature" => self.llm.temperature = parse_env(env_key, &value)?,
            "llm.max_tokens" => self.llm.max_tokens = parse_env(env_key, &value)?,
            "llm.timeout_secs" => self.llm.timeout_secs = parse_env(env_key, &value)?,
            "catalog.path" => self.catalog.path = PathBuf::from(value),
            "catalog.refresh_secs" => self.catalog.refresh_secs = parse_env(env_key, &value)?,
            "database.url" => self.database.url = value,
            "database.max_connections" => {
                self.database.max_connections = parse_env(env_key, &value)?
            }
            "database.timeout_secs" => self.database.timeout_secs = parse_env(env_key, &value)?,
            "server.bind_address" => self.server.bind_address = value,
            "server.port" => self.server.port = parse_env(env_key, &value)?,
            "server.graceful_shutdown_secs" => {
                self.server.graceful_shutdown_secs = parse_env(env_key, &value)?
            }
            "conversation.session_idle_timeout_secs" => {
                self.conversation.session_idle_timeout_secs = parse_env(env_key, &value)?
            }
            "conversation.min_address_chars" => {
                self.conversation.min_address_chars = parse_env(env_key, &value)?
            }
            "conversation.max_disambiguation_choices" => {
                self.conversation.max_disambiguation_choices = parse_env(env_key, &value)?
            }
            "conversation.max_quantity" => {
                self.conversation.max_quantity = parse_env(env_key, &value)?
            }
            "conversation.external_call_timeout_ms" => {
                self.conversation.external_call_timeout_ms = parse_env(env_key, &value)?
            }
            "conversation.utc_offset_hours" => {
                self.conversation.utc_offset_hours = parse_env(env_key, &value)?
            }
            "logging.level" => self.logging.level = value,
            "logging.format" => self.logging.format = value.parse()?,
            other => {
                return Err(ConfigError::Validation(format!("unknown config key `{other}`")));
            }
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            database_url,
            log_level,
            llm_provider,
            llm_model,
            catalog_path,
            server_port,
            line_channel_secret,
            line_access_token,
        } = overrides;

        replace(&mut self.database.url, database_url);
        replace(&mut self.logging.level, log_level);
        replace(&mut self.llm.provider, llm_provider);
        replace(&mut self.llm.model, llm_model);
        replace(&mut self.catalog.path, catalog_path);
        replace(&mut self.server.port, server_port);
        replace(&mut self.line.channel_secret, line_channel_secret.map(SecretString::from));
        replace(&mut self.line.access_token, line_access_token.map(SecretString::from));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_line()?;
        self.validate_llm()?;

        let catalog = &self.catalog;
        check(!catalog.path.as_os_str().is_empty(), "catalog.path must not be empty")?;
        check(catalog.refresh_secs > 0, "catalog.refresh_secs must be greater than zero")?;

        let database = &self.database;
        let url = database.url.trim();
        check(
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        check(database.max_connections > 0, "database.max_connections must be greater than zero")?;
        check(
            (1..=300).contains(&database.timeout_secs),
            "database.timeout_secs must be in range 1..=300",
        )?;

        check(self.server.port > 0, "server.port must be greater than zero")?;
        check(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be greater than zero",
        )?;

        let conversation = &self.conversation;
        check(
            conversation.session_idle_timeout_secs > 0,
            "conversation.session_idle_timeout_secs must be greater than zero",
        )?;
        check(
            (1..=13).contains(&conversation.max_disambiguation_choices),
            "conversation.max_disambiguation_choices must be in range 1..=13",
        )?;
        check(conversation.max_quantity > 0, "conversation.max_quantity must be greater than zero")?;
        check(
            conversation.external_call_timeout_ms > 0,
            "conversation.external_call_timeout_ms must be greater than zero",
        )?;
        check(
            (-12..=14).contains(&conversation.utc_offset_hours),
            "conversation.utc_offset_hours must be in range -12..=14",
        )?;

        check(
            matches!(
                self.logging.level.trim().to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }

    fn validate_line(&self) -> Result<(), ConfigError> {
        let line = &self.line;
        let base = line.api_base_url.trim();
        check(
            base.starts_with("http://") || base.starts_with("https://"),
            "line.api_base_url must start with http:// or https://",
        )?;
        check(
            is_blank(&line.channel_secret) == is_blank(&line.access_token),
            "line.channel_secret and line.access_token must be configured together",
        )?;
        check(
            !line.staff_target.as_deref().is_some_and(|target| target.trim().is_empty()),
            "line.staff_target must not be blank when set",
        )
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        check((1..=300).contains(&llm.timeout_secs), "llm.timeout_secs must be in range 1..=300")?;
        check((0.0..=2.0).contains(&llm.temperature), "llm.temperature must be in range 0.0..=2.0")?;
        check(llm.max_tokens > 0, "llm.max_tokens must be greater than zero")?;

        match llm.provider {
            LlmProvider::OpenAi => check(
                !llm.api_key.as_ref().map_or(true, is_blank),
                "llm.api_key is required for the openai provider",
            ),
            LlmProvider::Ollama => check(
                !llm.base_url.as_deref().map_or(true, |url| url.trim().is_empty()),
                "llm.base_url is required for the ollama provider",
            ),
            LlmProvider::Disabled => Ok(()),
        }
    }

    /// The webhook server cannot verify or answer events without both LINE
    /// credentials; local tooling runs without them.
    pub fn require_line_credentials(&self) -> Result<(), ConfigError> {
        check(
            !is_blank(&self.line.channel_secret),
            "line.channel_secret is required. Find it in the LINE Developers console > Your Channel > Basic settings",
        )?;
        check(
            !is_blank(&self.line.access_token),
            "line.access_token is required. Issue a long-lived channel access token under Messaging API settings",
        )
    }
}

/// The explicit path when it exists, otherwise the first default location present.
pub fn find_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let expanded = expand_env_references(&raw)?;
    toml::from_str(&expanded)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of the environment variable `NAME`.
fn expand_env_references(raw: &str) -> Result<String, ConfigError> {
    let mut pieces = raw.split("${");
    let mut expanded = pieces.next().unwrap_or_default().to_owned();
    for piece in pieces {
        let (name, rest) = piece.split_once('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_owned() })?;
        expanded.push_str(&value);
        expanded.push_str(rest);
    }
    Ok(expanded)
}

fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn check(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_owned()))
    }
}

fn is_blank(secret: &SecretString) -> bool {
    secret.expose_secret().trim().is_empty()
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

fn optional_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SecretString>, D::Error> {
    Option::<String>::deserialize(deserializer).map(|value| value.map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        env_keys_for, AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat,
        ENV_OVERRIDES,
    };

    /// Runs `test` with only `vars` set among the `CHATCART_*` overrides.
    fn with_env<T>(vars: &[(&str, &str)], test: impl FnOnce() -> T) -> T {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (key, _) in ENV_OVERRIDES {
            env::remove_var(key);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let outcome = test();
        for (key, _) in vars {
            env::remove_var(key);
        }
        outcome
    }

    fn load_file(dir: &TempDir, contents: &str) -> Result<AppConfig, ConfigError> {
        let path = dir.path().join("chatcart.toml");
        fs::write(&path, contents).expect("write config file");
        AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
    }

    fn missing_file(dir: &TempDir) -> LoadOptions {
        LoadOptions { config_path: Some(dir.path().join("missing.toml")), ..LoadOptions::default() }
    }

    #[test]
    fn defaults_are_valid_without_any_file() {
        let dir = TempDir::new().expect("tempdir");
        let config = with_env(&[], || AppConfig::load(missing_file(&dir))).expect("defaults load");

        assert_eq!(config.llm.provider, LlmProvider::Disabled);
        assert_eq!(config.conversation.utc_offset_hours, 7);
        assert_eq!(config.logging.format, LogFormat::Compact);
        let settings = config.conversation_settings();
        assert_eq!(settings.min_address_chars, 15);
        assert_eq!(settings.max_disambiguation_choices, 5);
        assert!(config.require_line_credentials().is_err());
    }

    #[test]
    fn required_file_must_exist() {
        let dir = TempDir::new().expect("tempdir");
        let options = LoadOptions { require_file: true, ..missing_file(&dir) };

        let error = with_env(&[], || AppConfig::load(options)).expect_err("file is required");

        assert!(matches!(error, ConfigError::MissingConfigFile(ref path) if path.ends_with("missing.toml")));
    }

    #[test]
    fn file_sections_merge_over_defaults_and_expand_env_references() {
        let dir = TempDir::new().expect("tempdir");
        let contents = r#"
[line]
channel_secret = "${TEST_LINE_CHANNEL_SECRET}"
access_token = "${TEST_LINE_ACCESS_TOKEN}"
staff_target = "C0ffee"

[catalog]
path = "shop/catalog.json"
"#;

        let config = with_env(
            &[("TEST_LINE_CHANNEL_SECRET", "secret-from-env"), ("TEST_LINE_ACCESS_TOKEN", "token-from-env")],
            || load_file(&dir, contents),
        )
        .expect("file loads");

        assert_eq!(config.line.channel_secret.expose_secret(), "secret-from-env");
        assert_eq!(config.line.access_token.expose_secret(), "token-from-env");
        assert_eq!(config.line.api_base_url, "https://api.line.me");
        assert_eq!(config.catalog.path, PathBuf::from("shop/catalog.json"));
        assert_eq!(config.catalog.refresh_secs, 300);
        assert!(config.require_line_credentials().is_ok());
    }

    #[test]
    fn env_references_must_be_set_and_closed() {
        let dir = TempDir::new().expect("tempdir");

        let unset = with_env(&[], || {
            load_file(&dir, "[line]\nchannel_secret = \"${CHATCART_TEST_UNSET_SECRET}\"\n")
        })
        .expect_err("unset variable");
        let unterminated =
            with_env(&[], || load_file(&dir, "[llm]\nmodel = \"${OPEN\"\n")).expect_err("unterminated");

        assert!(matches!(
            unset,
            ConfigError::MissingEnvInterpolation { ref var } if var == "CHATCART_TEST_UNSET_SECRET"
        ));
        assert!(matches!(unterminated, ConfigError::UnterminatedInterpolation));
    }

    #[test]
    fn precedence_is_defaults_then_file_then_env_then_overrides() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("chatcart.toml");
        fs::write(
            &path,
            r#"
[database]
url = "sqlite://from-file.db"

[conversation]
max_quantity = 20
min_address_chars = 10

[server]
port = 9000

[logging]
level = "warn"
"#,
        )
        .expect("write config file");

        let config = with_env(
            &[
                ("CHATCART_DATABASE_URL", "sqlite://from-env.db"),
                ("CHATCART_CONVERSATION_MAX_QUANTITY", "50"),
            ],
            || {
                AppConfig::load(LoadOptions {
                    config_path: Some(path),
                    overrides: ConfigOverrides {
                        database_url: Some("sqlite://from-override.db".to_owned()),
                        log_level: Some("debug".to_owned()),
                        ..ConfigOverrides::default()
                    },
                    ..LoadOptions::default()
                })
            },
        )
        .expect("layered load");

        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.conversation.max_quantity, 50);
        assert_eq!(config.conversation.min_address_chars, 10);
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn canonical_log_variables_win_over_short_aliases() {
        let dir = TempDir::new().expect("tempdir");

        let aliased = with_env(&[("CHATCART_LOG_LEVEL", "warn"), ("CHATCART_LOG_FORMAT", "json")], || {
            AppConfig::load(missing_file(&dir))
        })
        .expect("alias load");
        let both = with_env(
            &[("CHATCART_LOGGING_LEVEL", "error"), ("CHATCART_LOG_LEVEL", "trace")],
            || AppConfig::load(missing_file(&dir)),
        )
        .expect("canonical load");

        assert_eq!(aliased.logging.level, "warn");
        assert_eq!(aliased.logging.format, LogFormat::Json);
        assert_eq!(both.logging.level, "error");
        assert_eq!(
            env_keys_for("logging.level").collect::<Vec<_>>(),
            ["CHATCART_LOGGING_LEVEL", "CHATCART_LOG_LEVEL"]
        );
    }

    #[test]
    fn every_env_override_targets_a_settable_key() {
        let mut config = AppConfig::default();
        for (env_key, key) in ENV_OVERRIDES {
            let sample = match *key {
                "llm.provider" => "disabled",
                "logging.format" => "pretty",
                "llm.temperature" => "0.5",
                "line.api_base_url" | "llm.base_url" => "https://example.test",
                "database.url" => "sqlite::memory:",
                "line.channel_secret" | "line.access_token" | "llm.api_key" => "secret",
                "line.staff_target" | "llm.model" | "server.bind_address" | "logging.level" => "info",
                "catalog.path" => "catalog.toml",
                _ => "7",
            };
            assert!(config.set(key, sample.to_owned(), env_key).is_ok(), "{env_key} -> {key}");
        }
        assert!(Path::new(&config.catalog.path).ends_with("catalog.toml"));
    }

    #[test]
    fn malformed_env_override_names_the_variable() {
        let dir = TempDir::new().expect("tempdir");

        let error = with_env(&[("CHATCART_SERVER_PORT", "eighty")], || AppConfig::load(missing_file(&dir)))
            .expect_err("bad port");

        assert!(matches!(
            error,
            ConfigError::InvalidEnvOverride { ref key, .. } if key == "CHATCART_SERVER_PORT"
        ));
    }

    #[test]
    fn validation_messages_name_the_offending_key() {
        let dir = TempDir::new().expect("tempdir");

        let openai = with_env(&[("CHATCART_LLM_PROVIDER", "openai")], || AppConfig::load(missing_file(&dir)))
            .expect_err("openai needs a key");
        let half_line = with_env(&[("CHATCART_LINE_CHANNEL_SECRET", "only-the-secret")], || {
            AppConfig::load(missing_file(&dir))
        })
        .expect_err("secret without token");
        let offset = with_env(&[("CHATCART_CONVERSATION_UTC_OFFSET_HOURS", "15")], || {
            AppConfig::load(missing_file(&dir))
        })
        .expect_err("offset out of range");

        for (error, key) in [
            (openai, "llm.api_key"),
            (half_line, "line.access_token"),
            (offset, "conversation.utc_offset_hours"),
        ] {
            assert!(
                matches!(error, ConfigError::Validation(ref message) if message.contains(key)),
                "expected a validation error naming {key}"
            );
        }
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() {
        let dir = TempDir::new().expect("tempdir");

        let config = with_env(
            &[
                ("CHATCART_LINE_CHANNEL_SECRET", "channel-secret-value"),
                ("CHATCART_LINE_ACCESS_TOKEN", "access-token-value"),
            ],
            || AppConfig::load(missing_file(&dir)),
        )
        .expect("credentials load");
        let debug = format!("{config:?}");

        assert!(!debug.contains("channel-secret-value"));
        assert!(!debug.contains("access-token-value"));
    }
}
