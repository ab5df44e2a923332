use bankbot_core::NluPipeline;
use serde_json::json;

use crate::commands::{load_config, CommandResult};

/// Ranks intents for `text` with the configured classifier backend.
pub fn run(text: &str, top_k: Option<usize>) -> CommandResult {
    let config = match load_config("classify") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let pipeline = match NluPipeline::from_config(&config.nlu) {
        Ok(pipeline) => pipeline,
        Err(error) => return CommandResult::failure("classify", "nlu_load", error.to_string(), 7),
    };

    let predictions = pipeline.classify(text, top_k.unwrap_or(config.nlu.top_k));
    let message = match predictions.first() {
        Some(top) => format!("top intent: {} ({:.4})", top.intent, top.confidence),
        None => "no intent predicted".to_string(),
    };
    let data = json!({
        "backend": pipeline.backend_name(),
        "text": text,
        "predictions": predictions,
    });
    CommandResult::success_with_data("classify", message, Some(data))
}
