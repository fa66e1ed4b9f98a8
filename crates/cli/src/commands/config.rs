use std::env;
use std::fs;
use std::path::Path;

use chatcart_core::config::{env_keys_for, find_config_file, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => render(&config),
        Err(error) => format!("config validation failed: {error}"),
    }
}

/// One line per effective setting, each tagged with the layer it came from.
pub fn render(config: &AppConfig) -> String {
    let file = find_config_file(None);
    let document = file.as_deref().and_then(read_document);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_owned()];
    lines.extend(settings(config).into_iter().map(|(key, value)| {
        let source = source_of(key, document.as_ref(), file.as_deref());
        format!("- {key} = {value} (source: {source})")
    }));
    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<(&'static str, String)> {
    let AppConfig { line, llm, catalog, database, server, conversation, logging } = config;
    let unset = || "<unset>".to_owned();
    vec![
        ("line.channel_secret", redact(&line.channel_secret)),
        ("line.access_token", redact(&line.access_token)),
        ("line.api_base_url", line.api_base_url.clone()),
        ("line.staff_target", line.staff_target.clone().unwrap_or_else(unset)),
        ("llm.provider", llm.provider.as_str().to_owned()),
        ("llm.api_key", llm.api_key.as_ref().map_or_else(unset, redact)),
        ("llm.base_url", llm.base_url.clone().unwrap_or_else(unset)),
        ("llm.model", llm.model.clone()),
        ("llm.temperature", llm.temperature.to_string()),
        ("llm.max_tokens", llm.max_tokens.to_string()),
        ("llm.timeout_secs", llm.timeout_secs.to_string()),
        ("catalog.path", catalog.path.display().to_string()),
        ("catalog.refresh_secs", catalog.refresh_secs.to_string()),
        ("database.url", database.url.clone()),
        ("database.max_connections", database.max_connections.to_string()),
        ("database.timeout_secs", database.timeout_secs.to_string()),
        ("server.bind_address", server.bind_address.clone()),
        ("server.port", server.port.to_string()),
        ("server.graceful_shutdown_secs", server.graceful_shutdown_secs.to_string()),
        ("conversation.session_idle_timeout_secs", conversation.session_idle_timeout_secs.to_string()),
        ("conversation.min_address_chars", conversation.min_address_chars.to_string()),
        ("conversation.max_disambiguation_choices", conversation.max_disambiguation_choices.to_string()),
        ("conversation.max_quantity", conversation.max_quantity.to_string()),
        ("conversation.external_call_timeout_ms", conversation.external_call_timeout_ms.to_string()),
        ("conversation.utc_offset_hours", conversation.utc_offset_hours.to_string()),
        ("logging.level", logging.level.clone()),
        ("logging.format", logging.format.as_str().to_owned()),
    ]
}

fn read_document(path: &Path) -> Option<Value> {
    fs::read_to_string(path).ok()?.parse::<Value>().ok()
}

fn source_of(key: &str, document: Option<&Value>, file: Option<&Path>) -> String {
    let from_env = env_keys_for(key)
        .find(|env_key| env::var(env_key).is_ok_and(|value| !value.trim().is_empty()));
    if let Some(env_key) = from_env {
        return format!("env ({env_key})");
    }
    match (document, file) {
        (Some(document), Some(file)) if contains_path(document, key) => {
            format!("file ({})", file.display())
        }
        _ => "default".to_owned(),
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

/// Keeps the last four characters of long secrets so operators can tell tokens apart.
fn redact(secret: &SecretString) -> String {
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() < 12 {
        return "<redacted>".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}
