//! Trained-model intent classification.
//!
//! A model directory holds a label map plus the exported weights. The label map
//! is looked up in this order: `id2label.json`, `label2id.json`, `labels.json`,
//! then the `id2label` table inside `config.json`. Anything missing is a load
//! error; the classifier never degrades silently.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::nlu::classifier::{rank, tokenize, IntentClassifier, IntentPrediction};
use crate::nlu::NluError;

pub const WEIGHTS_FILE: &str = "weights.json";

/// Produces one raw score per label index.
pub trait LogitModel: Send + Sync {
    fn num_labels(&self) -> usize;

    fn logits(&self, text: &str) -> Vec<f64>;
}

/// Bag-of-words linear model: `logits = weights · counts + bias`.
#[derive(Clone, Debug)]
pub struct LinearTextModel {
    vocabulary: HashMap<String, usize>,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct WeightsFile {
    vocabulary: Vec<String>,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LinearTextModel {
    pub fn load(model_dir: &Path) -> Result<Self, NluError> {
        let path = model_dir.join(WEIGHTS_FILE);
        if !path.is_file() {
            return Err(NluError::MissingWeights(model_dir.to_path_buf()));
        }
        let file: WeightsFile = read_json(&path)?;
        Self::new(file.vocabulary, file.weights, file.bias)
    }

    pub fn new(
        vocabulary: Vec<String>,
        weights: Vec<Vec<f64>>,
        bias: Vec<f64>,
    ) -> Result<Self, NluError> {
        if weights.is_empty() {
            return Err(NluError::MalformedModel("weight matrix has no rows".to_owned()));
        }
        if weights.len() != bias.len() {
            return Err(NluError::MalformedModel(format!(
                "{} weight rows but {} bias terms",
                weights.len(),
                bias.len()
            )));
        }
        if let Some(row) = weights.iter().position(|row| row.len() != vocabulary.len()) {
            return Err(NluError::MalformedModel(format!(
                "weight row {row} does not match vocabulary size {}",
                vocabulary.len()
            )));
        }
        let all_finite = weights.iter().flatten().chain(bias.iter()).all(|value| value.is_finite());
        if !all_finite {
            return Err(NluError::MalformedModel("model contains non-finite values".to_owned()));
        }

        let vocabulary = vocabulary
            .into_iter()
            .enumerate()
            .map(|(index, token)| (token.to_lowercase(), index))
            .collect();
        Ok(Self { vocabulary, weights, bias })
    }
}

impl LogitModel for LinearTextModel {
    fn num_labels(&self) -> usize {
        self.bias.len()
    }

    fn logits(&self, text: &str) -> Vec<f64> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&index) = self.vocabulary.get(&token) {
                *counts.entry(index).or_default() += 1.0;
            }
        }

        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| {
                counts.iter().map(|(&index, count)| row[index] * count).sum::<f64>() + bias
            })
            .collect()
    }
}

pub struct ModelClassifier<M = LinearTextModel> {
    model: M,
    labels: HashMap<usize, String>,
}

impl ModelClassifier<LinearTextModel> {
    pub fn load(model_dir: &Path) -> Result<Self, NluError> {
        if !model_dir.is_dir() {
            return Err(NluError::MissingModelDir(model_dir.to_path_buf()));
        }
        let labels = load_label_map(model_dir)?;
        let model = LinearTextModel::load(model_dir)?;
        Ok(Self::new(model, labels))
    }
}

impl<M: LogitModel> ModelClassifier<M> {
    pub fn new(model: M, labels: HashMap<usize, String>) -> Self {
        Self { model, labels }
    }

    fn label_for(&self, index: usize) -> String {
        self.labels.get(&index).cloned().unwrap_or_else(|| index.to_string())
    }
}

impl<M: LogitModel> IntentClassifier for ModelClassifier<M> {
    fn backend_name(&self) -> &'static str {
        "model"
    }

    fn predict(&self, text: &str, top_k: usize) -> Vec<IntentPrediction> {
        let probabilities = softmax(&self.model.logits(text));
        let scored = probabilities
            .into_iter()
            .enumerate()
            .map(|(index, confidence)| IntentPrediction { intent: self.label_for(index), confidence })
            .collect();
        rank(scored, top_k)
    }
}

pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let Some(max) = logits.iter().copied().reduce(f64::max) else {
        return Vec::new();
    };
    let exponents: Vec<f64> = logits.iter().map(|logit| (logit - max).exp()).collect();
    let total: f64 = exponents.iter().sum();
    exponents.into_iter().map(|value| value / total).collect()
}

pub fn load_label_map(model_dir: &Path) -> Result<HashMap<usize, String>, NluError> {
    let id2label = model_dir.join("id2label.json");
    if id2label.is_file() {
        return index_keyed(&id2label, read_json(&id2label)?);
    }

    let label2id = model_dir.join("label2id.json");
    if label2id.is_file() {
        let raw: HashMap<String, usize> = read_json(&label2id)?;
        return Ok(raw.into_iter().map(|(label, index)| (index, label)).collect());
    }

    let labels = model_dir.join("labels.json");
    if labels.is_file() {
        return match read_json::<Value>(&labels)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::String(label) => Ok((index, label)),
                    other => Err(NluError::MalformedModel(format!(
                        "labels.json entry {index} is not a string: {other}"
                    ))),
                })
                .collect(),
            Value::Object(map) => {
                let raw = map
                    .into_iter()
                    .map(|(key, value)| match value {
                        Value::String(label) => Ok((key, label)),
                        other => Err(NluError::MalformedModel(format!(
                            "labels.json value for `{key}` is not a string: {other}"
                        ))),
                    })
                    .collect::<Result<HashMap<_, _>, _>>()?;
                index_keyed(&labels, raw)
            }
            _ => Err(NluError::MalformedModel(
                "labels.json must be an array or an object".to_owned(),
            )),
        };
    }

    let config = model_dir.join("config.json");
    if config.is_file() {
        #[derive(Deserialize)]
        struct ModelConfig {
            id2label: Option<HashMap<String, String>>,
        }
        let parsed: ModelConfig = read_json(&config)?;
        if let Some(raw) = parsed.id2label {
            return index_keyed(&config, raw);
        }
    }

    Err(NluError::MissingLabelMap(model_dir.to_path_buf()))
}

fn index_keyed(
    origin: &Path,
    raw: HashMap<String, String>,
) -> Result<HashMap<usize, String>, NluError> {
    raw.into_iter()
        .map(|(key, label)| {
            key.trim().parse::<usize>().map(|index| (index, label)).map_err(|_| {
                NluError::MalformedModel(format!(
                    "`{}` has non-numeric label index `{key}`",
                    origin.display()
                ))
            })
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, NluError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| NluError::ReadFile { path: PathBuf::from(path), source })?;
    serde_json::from_str(&raw)
        .map_err(|source| NluError::ParseJson { origin: path.display().to_string(), source })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::{load_label_map, softmax, LinearTextModel, LogitModel, ModelClassifier};
    use crate::nlu::classifier::IntentClassifier;
    use crate::nlu::NluError;

    const WEIGHTS: &str = r#"{
        "vocabulary": ["balance", "transfer", "atm"],
        "weights": [[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]],
        "bias": [0.0, 0.0, 0.0]
    }"#;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write model file");
    }

    #[test]
    fn softmax_is_a_distribution() {
        let probabilities = softmax(&[1.0, 2.0, 3.0]);
        let total: f64 = probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probabilities[2] > probabilities[1] && probabilities[1] > probabilities[0]);
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn loads_directory_and_ranks_labels() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "weights.json", WEIGHTS);
        write(
            dir.path(),
            "id2label.json",
            r#"{"0": "check_balance", "1": "transfer_money", "2": "find_atm"}"#,
        );

        let classifier = ModelClassifier::load(dir.path()).expect("load model");
        let predictions = classifier.predict("Check my balance balance", 2);

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].intent, "check_balance");
        assert!(predictions[0].confidence > 0.99);
        assert!(predictions[0].confidence >= predictions[1].confidence);
        assert!(predictions.iter().all(|p| (0.0..=1.0).contains(&p.confidence)));
    }

    #[test]
    fn label_map_sources_follow_lookup_order() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "config.json", r#"{"id2label": {"0": "from_config"}}"#);
        assert_eq!(load_label_map(dir.path()).expect("config map")[&0], "from_config");

        write(dir.path(), "labels.json", r#"["from_labels"]"#);
        assert_eq!(load_label_map(dir.path()).expect("labels map")[&0], "from_labels");

        write(dir.path(), "label2id.json", r#"{"from_label2id": 0}"#);
        assert_eq!(load_label_map(dir.path()).expect("label2id map")[&0], "from_label2id");

        write(dir.path(), "id2label.json", r#"{"0": "from_id2label"}"#);
        assert_eq!(load_label_map(dir.path()).expect("id2label map")[&0], "from_id2label");
    }

    #[test]
    fn missing_label_map_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "weights.json", WEIGHTS);
        write(dir.path(), "config.json", r#"{"model_type": "linear"}"#);

        assert!(matches!(ModelClassifier::load(dir.path()), Err(NluError::MissingLabelMap(_))));
    }

    #[test]
    fn missing_or_malformed_weights_are_fatal() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "labels.json", r#"["a", "b"]"#);
        assert!(matches!(ModelClassifier::load(dir.path()), Err(NluError::MissingWeights(_))));

        write(dir.path(), "weights.json", r#"{"vocabulary": ["a"], "weights": [[1.0, 2.0]], "bias": [0.0]}"#);
        assert!(matches!(ModelClassifier::load(dir.path()), Err(NluError::MalformedModel(_))));

        let missing = dir.path().join("nope");
        assert!(matches!(ModelClassifier::load(&missing), Err(NluError::MissingModelDir(_))));
    }

    #[test]
    fn unmapped_indices_fall_back_to_their_number() {
        let model = LinearTextModel::new(
            vec!["atm".to_owned()],
            vec![vec![0.0], vec![5.0]],
            vec![0.0, 0.0],
        )
        .expect("model");
        assert_eq!(model.num_labels(), 2);

        let classifier = ModelClassifier::new(model, HashMap::from([(0, "known".to_owned())]));
        let predictions = classifier.predict("atm", 2);

        assert_eq!(predictions[0].intent, "1");
        assert_eq!(predictions[1].intent, "known");
    }
}
