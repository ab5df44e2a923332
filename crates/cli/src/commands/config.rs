use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bankbot_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Renders every effective setting with the layer it came from. Configuration
/// errors are reported as plain text.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let optional_path = |path: &Option<PathBuf>| {
        path.as_ref().map_or_else(|| "<builtin>".to_string(), |path| path.display().to_string())
    };

    let fields: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "BANKBOT_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "BANKBOT_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "BANKBOT_DATABASE_TIMEOUT_SECS",
        ),
        ("nlu.backend", format!("{:?}", config.nlu.backend), "BANKBOT_NLU_BACKEND"),
        ("nlu.model_dir", config.nlu.model_dir.display().to_string(), "BANKBOT_NLU_MODEL_DIR"),
        ("nlu.intents_path", optional_path(&config.nlu.intents_path), "BANKBOT_NLU_INTENTS_PATH"),
        (
            "nlu.entities_path",
            optional_path(&config.nlu.entities_path),
            "BANKBOT_NLU_ENTITIES_PATH",
        ),
        ("nlu.lexicon_path", optional_path(&config.nlu.lexicon_path), "BANKBOT_NLU_LEXICON_PATH"),
        ("nlu.top_k", config.nlu.top_k.to_string(), "BANKBOT_NLU_TOP_K"),
        (
            "dialogue.unknown_threshold",
            format!("{:.2}", config.dialogue.unknown_threshold),
            "BANKBOT_DIALOGUE_UNKNOWN_THRESHOLD",
        ),
        (
            "dialogue.lexical_override_threshold",
            format!("{:.2}", config.dialogue.lexical_override_threshold),
            "BANKBOT_DIALOGUE_LEXICAL_OVERRIDE_THRESHOLD",
        ),
        (
            "dialogue.switch_threshold",
            format!("{:.2}", config.dialogue.switch_threshold),
            "BANKBOT_DIALOGUE_SWITCH_THRESHOLD",
        ),
        (
            "dialogue.lock_intent_on_start",
            config.dialogue.lock_intent_on_start.to_string(),
            "BANKBOT_DIALOGUE_LOCK_INTENT_ON_START",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "BANKBOT_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "BANKBOT_SERVER_PORT"),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "BANKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        ("logging.level", config.logging.level.clone(), "BANKBOT_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "BANKBOT_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &redact_url(key, &value), source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("bankbot.toml"), PathBuf::from("config/bankbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
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

/// Hides URL query parameters, which may carry credentials.
fn redact_url(key: &str, value: &str) -> String {
    if key != "database.url" {
        return value.to_string();
    }
    match value.split_once('?') {
        Some((base, query)) if query.contains("password") || query.contains("key") => {
            format!("{base}?<redacted>")
        }
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_url, render_line};

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value = "[dialogue]\nswitch_threshold = 0.9\n".parse().expect("toml");

        assert!(contains_path(&doc, "dialogue.switch_threshold"));
        assert!(!contains_path(&doc, "dialogue.unknown_threshold"));
        assert!(!contains_path(&doc, "nlu.backend"));
    }

    #[test]
    fn database_url_query_secrets_are_hidden() {
        assert_eq!(
            redact_url("database.url", "sqlite://bank.db?key=hunter2"),
            "sqlite://bank.db?<redacted>"
        );
        assert_eq!(redact_url("database.url", "sqlite://bank.db?mode=rwc"), "sqlite://bank.db?mode=rwc");
        assert_eq!(redact_url("nlu.model_dir", "models?key"), "models?key");
    }

    #[test]
    fn lines_name_their_source() {
        assert_eq!(
            render_line("server.port", "8080", "default".to_string()),
            "- server.port = 8080 (source: default)"
        );
    }
}
