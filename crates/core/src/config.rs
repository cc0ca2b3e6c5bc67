use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ArgumentMode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub execution: ExecutionConfig,
    pub registry: RegistryConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub max_error_chars: usize,
    /// Bound on the request text kept in each history record.
    pub max_request_chars: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    pub allowed_modules: Vec<String>,
    pub argument_mode: ArgumentMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub max_age_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub execution_timeout_secs: Option<u64>,
    pub allowed_modules: Option<Vec<String>>,
    pub argument_mode: Option<ArgumentMode>,
    pub history_capacity: Option<usize>,
    pub server_port: Option<u16>,
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

/// Upper bound for `history.max_age_secs` (one year).
pub const MAX_AGE_CEILING_SECS: u64 = 31_536_000;

pub const DEFAULT_ALLOWED_MODULES: [&str; 5] = ["sales", "users", "finance", "system", "analytics"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://127.0.0.1:11434".to_string()),
                model: "llama3.2:1b".to_string(),
                timeout_secs: 30,
            },
            execution: ExecutionConfig {
                timeout_secs: 10,
                max_result_chars: 1000,
                max_error_chars: 500,
                max_request_chars: 2000,
            },
            registry: RegistryConfig {
                allowed_modules: DEFAULT_ALLOWED_MODULES.iter().map(|m| m.to_string()).collect(),
                argument_mode: ArgumentMode::Strict,
            },
            history: HistoryConfig { capacity: 100, max_age_secs: None },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected ollama|openai)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("mailfn.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(execution) = patch.execution {
            if let Some(timeout_secs) = execution.timeout_secs {
                self.execution.timeout_secs = timeout_secs;
            }
            if let Some(max_result_chars) = execution.max_result_chars {
                self.execution.max_result_chars = max_result_chars;
            }
            if let Some(max_error_chars) = execution.max_error_chars {
                self.execution.max_error_chars = max_error_chars;
            }
            if let Some(max_request_chars) = execution.max_request_chars {
                self.execution.max_request_chars = max_request_chars;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(allowed_modules) = registry.allowed_modules {
                self.registry.allowed_modules = allowed_modules;
            }
            if let Some(argument_mode) = registry.argument_mode {
                self.registry.argument_mode = argument_mode;
            }
        }

        if let Some(history) = patch.history {
            if let Some(capacity) = history.capacity {
                self.history.capacity = capacity;
            }
            if let Some(max_age_secs) = history.max_age_secs {
                self.history.max_age_secs = Some(max_age_secs);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MAILFN_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("MAILFN_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MAILFN_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("MAILFN_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MAILFN_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MAILFN_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MAILFN_EXECUTION_TIMEOUT_SECS") {
            self.execution.timeout_secs = parse_u64("MAILFN_EXECUTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MAILFN_EXECUTION_MAX_RESULT_CHARS") {
            self.execution.max_result_chars =
                parse_usize("MAILFN_EXECUTION_MAX_RESULT_CHARS", &value)?;
        }
        if let Some(value) = read_env("MAILFN_EXECUTION_MAX_ERROR_CHARS") {
            self.execution.max_error_chars =
                parse_usize("MAILFN_EXECUTION_MAX_ERROR_CHARS", &value)?;
        }
        if let Some(value) = read_env("MAILFN_EXECUTION_MAX_REQUEST_CHARS") {
            self.execution.max_request_chars =
                parse_usize("MAILFN_EXECUTION_MAX_REQUEST_CHARS", &value)?;
        }

        if let Some(value) = read_env("MAILFN_REGISTRY_ALLOWED_MODULES") {
            self.registry.allowed_modules = split_list(&value);
        }
        if let Some(value) = read_env("MAILFN_REGISTRY_ARGUMENT_MODE") {
            self.registry.argument_mode = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "MAILFN_REGISTRY_ARGUMENT_MODE".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        if let Some(value) = read_env("MAILFN_HISTORY_CAPACITY") {
            self.history.capacity = parse_usize("MAILFN_HISTORY_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("MAILFN_HISTORY_MAX_AGE_SECS") {
            self.history.max_age_secs = Some(parse_u64("MAILFN_HISTORY_MAX_AGE_SECS", &value)?);
        }

        if let Some(value) = read_env("MAILFN_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MAILFN_SERVER_PORT") {
            self.server.port = parse_u16("MAILFN_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MAILFN_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MAILFN_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("MAILFN_LOGGING_LEVEL").or_else(|| read_env("MAILFN_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MAILFN_LOGGING_FORMAT").or_else(|| read_env("MAILFN_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_timeout_secs) = overrides.llm_timeout_secs {
            self.llm.timeout_secs = llm_timeout_secs;
        }
        if let Some(execution_timeout_secs) = overrides.execution_timeout_secs {
            self.execution.timeout_secs = execution_timeout_secs;
        }
        if let Some(allowed_modules) = overrides.allowed_modules {
            self.registry.allowed_modules = allowed_modules;
        }
        if let Some(argument_mode) = overrides.argument_mode {
            self.registry.argument_mode = argument_mode;
        }
        if let Some(history_capacity) = overrides.history_capacity {
            self.history.capacity = history_capacity;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_execution(&self.execution)?;
        validate_registry(&self.registry)?;
        validate_history(&self.history)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mailfn.toml"), PathBuf::from("config/mailfn.toml")]
        .into_iter()
        .find(|path| path.exists())
}

/// Path of the config file `load` would read, if any.
pub fn detect_config_path() -> Option<PathBuf> {
    resolve_config_path(None)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let base_url = llm.base_url.as_deref().map(str::trim).unwrap_or_default();
    if !base_url.is_empty() && !base_url.starts_with("http://") && !base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            if base_url.is_empty() {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_execution(execution: &ExecutionConfig) -> Result<(), ConfigError> {
    if execution.timeout_secs == 0 || execution.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "execution.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if execution.max_result_chars < 32 || execution.max_error_chars < 32 {
        return Err(ConfigError::Validation(
            "execution.max_result_chars and execution.max_error_chars must be at least 32"
                .to_string(),
        ));
    }

    if execution.max_request_chars < 32 || execution.max_request_chars > 100_000 {
        return Err(ConfigError::Validation(
            "execution.max_request_chars must be in range 32..=100000".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    if registry.allowed_modules.iter().all(|module| module.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "registry.allowed_modules must name at least one module".to_string(),
        ));
    }
    Ok(())
}

fn validate_history(history: &HistoryConfig) -> Result<(), ConfigError> {
    if history.capacity == 0 || history.capacity > 100_000 {
        return Err(ConfigError::Validation(
            "history.capacity must be in range 1..=100000".to_string(),
        ));
    }
    if let Some(max_age_secs) = history.max_age_secs {
        if max_age_secs == 0 || max_age_secs > MAX_AGE_CEILING_SECS {
            return Err(ConfigError::Validation(format!(
                "history.max_age_secs must be in range 1..={MAX_AGE_CEILING_SECS} when set"
            )));
        }
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    execution: Option<ExecutionPatch>,
    registry: Option<RegistryPatch>,
    history: Option<HistoryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutionPatch {
    timeout_secs: Option<u64>,
    max_result_chars: Option<usize>,
    max_error_chars: Option<usize>,
    max_request_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    allowed_modules: Option<Vec<String>>,
    argument_mode: Option<ArgumentMode>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryPatch {
    capacity: Option<usize>,
    max_age_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
    use crate::registry::ArgumentMode;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("default config should load: {err}"))?;
        ensure(config.execution.timeout_secs == 10, "default execution timeout is 10s")?;
        ensure(config.history.capacity == 100, "default history capacity is 100")?;
        ensure(
            config.registry.argument_mode == ArgumentMode::Strict,
            "arguments are strict by default",
        )?;
        ensure(config.registry.allowed_modules.len() == 5, "five builtin modules allowed")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_MAILFN_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("mailfn.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
base_url = "https://api.openai.com/v1"
api_key = "${TEST_MAILFN_API_KEY}"
model = "gpt-4o-mini"

[registry]
allowed_modules = ["sales"]
argument_mode = "lenient"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider read from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(config.registry.allowed_modules == vec!["sales"], "whitelist read from file")?;
            ensure(
                config.registry.argument_mode == ArgumentMode::Lenient,
                "argument mode read from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_MAILFN_API_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAILFN_EXECUTION_TIMEOUT_SECS", "7");
        env::set_var("MAILFN_REGISTRY_ALLOWED_MODULES", "sales, finance ,");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("mailfn.toml");
            fs::write(
                &path,
                r#"
[execution]
timeout_secs = 3
max_result_chars = 64

[history]
capacity = 20

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    history_capacity: Some(5),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.execution.timeout_secs == 7, "env timeout should win over file")?;
            ensure(config.execution.max_result_chars == 64, "file value should win over default")?;
            ensure(config.history.capacity == 5, "override capacity should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.registry.allowed_modules == vec!["sales", "finance"],
                "env module list is split and trimmed",
            )?;
            Ok(())
        })();

        clear_vars(&["MAILFN_EXECUTION_TIMEOUT_SECS", "MAILFN_REGISTRY_ALLOWED_MODULES"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAILFN_LOG_LEVEL", "warn");
        env::set_var("MAILFN_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["MAILFN_LOG_LEVEL", "MAILFN_LOG_FORMAT"]);
        result
    }

    #[test]
    fn openai_without_key_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("llm.api_key")
        );
        ensure(has_message, "validation failure should mention llm.api_key")
    }

    #[test]
    fn invalid_env_number_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAILFN_HISTORY_CAPACITY", "lots");
        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env parse failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. } if key == "MAILFN_HISTORY_CAPACITY"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["MAILFN_HISTORY_CAPACITY"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAILFN_LLM_PROVIDER", "openai");
        env::set_var("MAILFN_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["MAILFN_LLM_PROVIDER", "MAILFN_LLM_API_KEY"]);
        result
    }

    #[test]
    fn request_text_bound_is_read_from_env_and_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MAILFN_EXECUTION_MAX_REQUEST_CHARS", "500");
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.execution.max_request_chars == 500, "env bound should be applied")?;

            env::set_var("MAILFN_EXECUTION_MAX_REQUEST_CHARS", "8");
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("max_request_chars")
            );
            ensure(rejected, "a bound below 32 should fail validation")
        })();

        clear_vars(&["MAILFN_EXECUTION_MAX_REQUEST_CHARS"]);
        result
    }
}
