pub mod classifier;
pub mod corpus;
pub mod entities;
pub mod model;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ClassifierBackend, NluConfig};

pub use classifier::{IntentClassifier, IntentPrediction, LexicalClassifier};
pub use corpus::{EntityCorpus, IntentCorpus};
pub use entities::{Entity, EntityExtractor, AMOUNT_LABEL};
pub use model::{LinearTextModel, LogitModel, ModelClassifier};

#[derive(Debug, Error)]
pub enum NluError {
    #[error("could not read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse {origin}: {source}")]
    ParseJson { origin: String, source: serde_json::Error },
    #[error("invalid corpus: {0}")]
    InvalidCorpus(String),
    #[error("entity pattern `{label}` does not compile: {source}")]
    InvalidPattern { label: String, source: regex::Error },
    #[error("entity pattern `{label}` uses unsupported flag `{flag}` (expected i|m|s|x)")]
    UnsupportedFlag { label: String, flag: char },
    #[error("model directory `{0}` does not exist")]
    MissingModelDir(PathBuf),
    #[error(
        "no label map found in `{0}` (expected id2label.json, label2id.json, labels.json or config.json)"
    )]
    MissingLabelMap(PathBuf),
    #[error("model weights are missing from `{0}`")]
    MissingWeights(PathBuf),
    #[error("malformed model: {0}")]
    MalformedModel(String),
}

/// Classifier and extractor output for one piece of free text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NluSignal {
    pub intent: Option<String>,
    pub confidence: f64,
    pub entities: Vec<Entity>,
}

/// Intent classification and entity extraction, loaded once and shared read-only.
pub struct NluPipeline {
    classifier: Box<dyn IntentClassifier>,
    extractor: EntityExtractor,
}

impl NluPipeline {
    pub fn new(classifier: Box<dyn IntentClassifier>, extractor: EntityExtractor) -> Self {
        Self { classifier, extractor }
    }

    pub fn from_config(config: &NluConfig) -> Result<Self, NluError> {
        let intents = match &config.intents_path {
            Some(path) => IntentCorpus::load(path)?,
            None => IntentCorpus::builtin()?,
        };
        let entities = match &config.entities_path {
            Some(path) => EntityCorpus::load(path)?,
            None => EntityCorpus::builtin()?,
        };

        let classifier = build_classifier(config, &intents)?;
        let extractor = EntityExtractor::from_corpus(&entities)?;

        tracing::info!(
            event_name = "nlu.pipeline.loaded",
            backend = classifier.backend_name(),
            intents = intents.intents.len(),
            regex_patterns = entities.regex_patterns.len(),
            keyword_patterns = entities.patterns.len(),
            "language understanding pipeline ready"
        );

        Ok(Self::new(classifier, extractor))
    }

    /// Built-in corpora with the lexical classifier.
    pub fn builtin_lexical() -> Result<Self, NluError> {
        let intents = IntentCorpus::builtin()?;
        let extractor = EntityExtractor::from_corpus(&EntityCorpus::builtin()?)?;
        Ok(Self::new(Box::new(LexicalClassifier::from_corpus(&intents)), extractor))
    }

    pub fn backend_name(&self) -> &'static str {
        self.classifier.backend_name()
    }

    pub fn classify(&self, text: &str, top_k: usize) -> Vec<IntentPrediction> {
        self.classifier.predict(text, top_k)
    }

    pub fn extract(&self, text: &str) -> Vec<Entity> {
        self.extractor.extract(text)
    }

    /// Top-1 intent plus entities for `text`.
    pub fn process(&self, text: &str) -> NluSignal {
        let top = self.classifier.predict(text, 1).into_iter().next();
        let entities = self.extractor.extract(text);
        match top {
            Some(prediction) => NluSignal {
                intent: Some(prediction.intent),
                confidence: prediction.confidence,
                entities,
            },
            None => NluSignal { intent: None, confidence: 0.0, entities },
        }
    }
}

pub fn build_classifier(
    config: &NluConfig,
    intents: &IntentCorpus,
) -> Result<Box<dyn IntentClassifier>, NluError> {
    match config.backend {
        ClassifierBackend::Lexical => Ok(Box::new(LexicalClassifier::from_corpus(intents))),
        ClassifierBackend::Model => Ok(Box::new(ModelClassifier::load(&config.model_dir)?)),
        ClassifierBackend::Auto if config.model_dir.is_dir() => {
            Ok(Box::new(ModelClassifier::load(&config.model_dir)?))
        }
        ClassifierBackend::Auto => {
            tracing::warn!(
                event_name = "nlu.classifier.fallback",
                model_dir = %config.model_dir.display(),
                "model directory not found, using lexical classifier"
            );
            Ok(Box::new(LexicalClassifier::from_corpus(intents)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{NluError, NluPipeline};
    use crate::config::{ClassifierBackend, NluConfig};

    fn config(backend: ClassifierBackend, model_dir: PathBuf) -> NluConfig {
        NluConfig {
            backend,
            model_dir,
            intents_path: None,
            entities_path: None,
            lexicon_path: None,
            top_k: 3,
        }
    }

    #[test]
    fn auto_backend_falls_back_to_lexical_without_model_dir() {
        let dir = TempDir::new().expect("tempdir");
        let pipeline =
            NluPipeline::from_config(&config(ClassifierBackend::Auto, dir.path().join("absent")))
                .expect("pipeline");

        assert_eq!(pipeline.backend_name(), "lexical");
        let signal = pipeline.process("Transfer 5k from my savings");
        assert_eq!(signal.intent.as_deref(), Some("transfer_money"));
        assert!((signal.confidence - 1.0).abs() < f64::EPSILON);
        assert!(signal.entities.iter().any(|entity| entity.value == "5000"));
    }

    #[test]
    fn explicit_model_backend_fails_fast_on_empty_directory() {
        let dir = TempDir::new().expect("tempdir");
        let result = NluPipeline::from_config(&config(ClassifierBackend::Model, dir.path().into()));

        assert!(matches!(result, Err(NluError::MissingLabelMap(_))));
    }

    #[test]
    fn auto_backend_uses_model_directory_when_present() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("labels.json"), r#"["check_balance", "find_atm"]"#)
            .expect("labels");
        fs::write(
            dir.path().join("weights.json"),
            r#"{"vocabulary": ["atm"], "weights": [[0.0], [3.0]], "bias": [0.0, 0.0]}"#,
        )
        .expect("weights");

        let pipeline =
            NluPipeline::from_config(&config(ClassifierBackend::Auto, dir.path().into()))
                .expect("pipeline");

        assert_eq!(pipeline.backend_name(), "model");
        assert_eq!(pipeline.process("atm").intent.as_deref(), Some("find_atm"));
    }

    #[test]
    fn configured_corpus_paths_override_builtins() {
        let dir = TempDir::new().expect("tempdir");
        let entities = dir.path().join("entities.json");
        fs::write(
            &entities,
            r#"{"regex_patterns": [{"label": "BROKEN", "pattern": "[", "flags": ""}]}"#,
        )
        .expect("entities");

        let mut nlu = config(ClassifierBackend::Lexical, dir.path().join("absent"));
        nlu.entities_path = Some(entities);

        assert!(matches!(
            NluPipeline::from_config(&nlu),
            Err(NluError::InvalidPattern { .. })
        ));
    }
}
