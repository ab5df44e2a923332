use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub nlu: NluConfig,
    pub dialogue: DialogueConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NluConfig {
    pub backend: ClassifierBackend,
    pub model_dir: PathBuf,
    pub intents_path: Option<PathBuf>,
    pub entities_path: Option<PathBuf>,
    pub lexicon_path: Option<PathBuf>,
    pub top_k: usize,
}

/// Confidence policy for the dialogue engine.
#[derive(Clone, Debug, PartialEq)]
pub struct DialogueConfig {
    /// Minimum classifier confidence for any banking intent to be accepted.
    pub unknown_threshold: f64,
    /// Confidence that admits an intent even when the text shares no lexicon term with it.
    pub lexical_override_threshold: f64,
    pub switch_threshold: f64,
    pub lock_intent_on_start: bool,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            unknown_threshold: 0.80,
            lexical_override_threshold: 0.95,
            switch_threshold: 0.80,
            lock_intent_on_start: true,
        }
    }
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
pub enum ClassifierBackend {
    /// Use the model directory when it exists, the lexical scorer otherwise.
    Auto,
    Model,
    Lexical,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub nlu_backend: Option<ClassifierBackend>,
    pub model_dir: Option<PathBuf>,
    pub lock_intent_on_start: Option<bool>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://bankbot.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            nlu: NluConfig {
                backend: ClassifierBackend::Auto,
                model_dir: PathBuf::from("models/intent_model"),
                intents_path: None,
                entities_path: None,
                lexicon_path: None,
                top_k: 3,
            },
            dialogue: DialogueConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for ClassifierBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "model" => Ok(Self::Model),
            "lexical" => Ok(Self::Lexical),
            other => Err(ConfigError::Validation(format!(
                "unsupported classifier backend `{other}` (expected auto|model|lexical)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("bankbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(nlu) = patch.nlu {
            if let Some(backend) = nlu.backend {
                self.nlu.backend = backend;
            }
            if let Some(model_dir) = nlu.model_dir {
                self.nlu.model_dir = model_dir;
            }
            if let Some(intents_path) = nlu.intents_path {
                self.nlu.intents_path = Some(intents_path);
            }
            if let Some(entities_path) = nlu.entities_path {
                self.nlu.entities_path = Some(entities_path);
            }
            if let Some(lexicon_path) = nlu.lexicon_path {
                self.nlu.lexicon_path = Some(lexicon_path);
            }
            if let Some(top_k) = nlu.top_k {
                self.nlu.top_k = top_k;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(unknown_threshold) = dialogue.unknown_threshold {
                self.dialogue.unknown_threshold = unknown_threshold;
            }
            if let Some(lexical_override_threshold) = dialogue.lexical_override_threshold {
                self.dialogue.lexical_override_threshold = lexical_override_threshold;
            }
            if let Some(switch_threshold) = dialogue.switch_threshold {
                self.dialogue.switch_threshold = switch_threshold;
            }
            if let Some(lock_intent_on_start) = dialogue.lock_intent_on_start {
                self.dialogue.lock_intent_on_start = lock_intent_on_start;
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
        if let Some(value) = read_env("BANKBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BANKBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BANKBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BANKBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BANKBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BANKBOT_NLU_BACKEND") {
            self.nlu.backend = value.parse()?;
        }
        if let Some(value) = read_env("BANKBOT_NLU_MODEL_DIR") {
            self.nlu.model_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("BANKBOT_NLU_INTENTS_PATH") {
            self.nlu.intents_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("BANKBOT_NLU_ENTITIES_PATH") {
            self.nlu.entities_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("BANKBOT_NLU_LEXICON_PATH") {
            self.nlu.lexicon_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("BANKBOT_NLU_TOP_K") {
            self.nlu.top_k = parse_usize("BANKBOT_NLU_TOP_K", &value)?;
        }

        if let Some(value) = read_env("BANKBOT_DIALOGUE_UNKNOWN_THRESHOLD") {
            self.dialogue.unknown_threshold =
                parse_f64("BANKBOT_DIALOGUE_UNKNOWN_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("BANKBOT_DIALOGUE_LEXICAL_OVERRIDE_THRESHOLD") {
            self.dialogue.lexical_override_threshold =
                parse_f64("BANKBOT_DIALOGUE_LEXICAL_OVERRIDE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("BANKBOT_DIALOGUE_SWITCH_THRESHOLD") {
            self.dialogue.switch_threshold =
                parse_f64("BANKBOT_DIALOGUE_SWITCH_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("BANKBOT_DIALOGUE_LOCK_INTENT_ON_START") {
            self.dialogue.lock_intent_on_start =
                parse_bool("BANKBOT_DIALOGUE_LOCK_INTENT_ON_START", &value)?;
        }

        if let Some(value) = read_env("BANKBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BANKBOT_SERVER_PORT") {
            self.server.port = parse_u16("BANKBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BANKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BANKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("BANKBOT_LOGGING_LEVEL").or_else(|| read_env("BANKBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BANKBOT_LOGGING_FORMAT").or_else(|| read_env("BANKBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(nlu_backend) = overrides.nlu_backend {
            self.nlu.backend = nlu_backend;
        }
        if let Some(model_dir) = overrides.model_dir {
            self.nlu.model_dir = model_dir;
        }
        if let Some(lock_intent_on_start) = overrides.lock_intent_on_start {
            self.dialogue.lock_intent_on_start = lock_intent_on_start;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_nlu(&self.nlu)?;
        validate_dialogue(&self.dialogue)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("bankbot.toml"), PathBuf::from("config/bankbot.toml")]
        .into_iter()
        .find(|path| path.exists())
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_nlu(nlu: &NluConfig) -> Result<(), ConfigError> {
    if nlu.top_k == 0 {
        return Err(ConfigError::Validation("nlu.top_k must be greater than zero".to_string()));
    }

    if nlu.backend == ClassifierBackend::Model && nlu.model_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "nlu.model_dir is required when nlu.backend is `model`".to_string(),
        ));
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    let thresholds = [
        ("dialogue.unknown_threshold", dialogue.unknown_threshold),
        ("dialogue.lexical_override_threshold", dialogue.lexical_override_threshold),
        ("dialogue.switch_threshold", dialogue.switch_threshold),
    ];
    for (name, value) in thresholds {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{name} must be in range 0.0..=1.0")));
        }
    }

    if dialogue.lexical_override_threshold < dialogue.unknown_threshold {
        return Err(ConfigError::Validation(
            "dialogue.lexical_override_threshold must not be below dialogue.unknown_threshold"
                .to_string(),
        ));
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    nlu: Option<NluPatch>,
    dialogue: Option<DialoguePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NluPatch {
    backend: Option<ClassifierBackend>,
    model_dir: Option<PathBuf>,
    intents_path: Option<PathBuf>,
    entities_path: Option<PathBuf>,
    lexicon_path: Option<PathBuf>,
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    unknown_threshold: Option<f64>,
    lexical_override_threshold: Option<f64>,
    switch_threshold: Option<f64>,
    lock_intent_on_start: Option<bool>,
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
