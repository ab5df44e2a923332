use bankbot_core::NluPipeline;
use serde_json::json;

use crate::commands::{load_config, CommandResult};

pub fn run(text: &str) -> CommandResult {
    let config = match load_config("extract") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let pipeline = match NluPipeline::from_config(&config.nlu) {
        Ok(pipeline) => pipeline,
        Err(error) => return CommandResult::failure("extract", "nlu_load", error.to_string(), 7),
    };

    let entities = pipeline.extract(text);
    let message = if entities.is_empty() {
        "no entities found".to_string()
    } else {
        entities
            .iter()
            .map(|entity| format!("{}: {}", entity.label, entity.value))
            .collect::<Vec<_>>()
            .join(", ")
    };
    CommandResult::success_with_data(
        "extract",
        message,
        Some(json!({ "text": text, "entities": entities })),
    )
}
