use std::env;
use std::fs;
use std::path::Path;

use mailfn_core::config::{detect_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// Renders each effective value with where it came from.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let max_age = config
        .history
        .max_age_secs
        .map(|secs| secs.to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    let entries: Vec<(&str, &[&str], String)> = vec![
        ("llm.provider", &["MAILFN_LLM_PROVIDER"], config.llm.provider.as_str().to_string()),
        ("llm.model", &["MAILFN_LLM_MODEL"], config.llm.model.clone()),
        (
            "llm.base_url",
            &["MAILFN_LLM_BASE_URL"],
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("llm.api_key", &["MAILFN_LLM_API_KEY"], api_key),
        ("llm.timeout_secs", &["MAILFN_LLM_TIMEOUT_SECS"], config.llm.timeout_secs.to_string()),
        (
            "execution.timeout_secs",
            &["MAILFN_EXECUTION_TIMEOUT_SECS"],
            config.execution.timeout_secs.to_string(),
        ),
        (
            "execution.max_result_chars",
            &["MAILFN_EXECUTION_MAX_RESULT_CHARS"],
            config.execution.max_result_chars.to_string(),
        ),
        (
            "execution.max_error_chars",
            &["MAILFN_EXECUTION_MAX_ERROR_CHARS"],
            config.execution.max_error_chars.to_string(),
        ),
        (
            "execution.max_request_chars",
            &["MAILFN_EXECUTION_MAX_REQUEST_CHARS"],
            config.execution.max_request_chars.to_string(),
        ),
        (
            "registry.allowed_modules",
            &["MAILFN_REGISTRY_ALLOWED_MODULES"],
            config.registry.allowed_modules.join(","),
        ),
        (
            "registry.argument_mode",
            &["MAILFN_REGISTRY_ARGUMENT_MODE"],
            config.registry.argument_mode.as_str().to_string(),
        ),
        ("history.capacity", &["MAILFN_HISTORY_CAPACITY"], config.history.capacity.to_string()),
        ("history.max_age_secs", &["MAILFN_HISTORY_MAX_AGE_SECS"], max_age),
        ("server.bind_address", &["MAILFN_SERVER_BIND_ADDRESS"], config.server.bind_address.clone()),
        ("server.port", &["MAILFN_SERVER_PORT"], config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            &["MAILFN_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        ("logging.level", &["MAILFN_LOGGING_LEVEL", "MAILFN_LOG_LEVEL"], config.logging.level.clone()),
        (
            "logging.format",
            &["MAILFN_LOGGING_FORMAT", "MAILFN_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_keys, value) in entries {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognisable key prefix (`sk-`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
