use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::nlu::corpus::IntentCorpus;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentPrediction {
    pub intent: String,
    pub confidence: f64,
}

/// Ranks intents for a piece of text.
///
/// Implementations return at most `top_k` predictions with confidences in
/// `[0, 1]`, ordered from most to least confident. Equal confidences keep the
/// implementation's own label order. Unknown intents are omitted, never an error.
pub trait IntentClassifier: Send + Sync {
    fn backend_name(&self) -> &'static str;

    fn predict(&self, text: &str, top_k: usize) -> Vec<IntentPrediction>;
}

/// Lowercased alphanumeric words.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Stable descending sort, then truncation to `top_k`.
pub(crate) fn rank(mut scored: Vec<IntentPrediction>, top_k: usize) -> Vec<IntentPrediction> {
    scored.sort_by(|left, right| right.confidence.total_cmp(&left.confidence));
    scored.truncate(top_k);
    scored
}

/// Token-overlap scorer used when no trained model is available.
#[derive(Clone, Debug)]
pub struct LexicalClassifier {
    vocabularies: Vec<(String, HashSet<String>)>,
}

impl LexicalClassifier {
    pub fn from_corpus(corpus: &IntentCorpus) -> Self {
        let vocabularies = corpus
            .intents
            .iter()
            .map(|intent| {
                let vocabulary = intent
                    .examples
                    .iter()
                    .flat_map(|example| tokenize(example.text()).collect::<Vec<_>>())
                    .collect::<HashSet<_>>();
                (intent.name.clone(), vocabulary)
            })
            .collect();
        Self { vocabularies }
    }
}

impl IntentClassifier for LexicalClassifier {
    fn backend_name(&self) -> &'static str {
        "lexical"
    }

    fn predict(&self, text: &str, top_k: usize) -> Vec<IntentPrediction> {
        let query: HashSet<String> = tokenize(text).collect();

        let raw: Vec<IntentPrediction> = self
            .vocabularies
            .iter()
            .map(|(intent, vocabulary)| {
                let confidence = if vocabulary.is_empty() {
                    0.0
                } else {
                    let overlap = vocabulary.intersection(&query).count();
                    overlap as f64 / (vocabulary.len() + 1) as f64
                };
                IntentPrediction { intent: intent.clone(), confidence }
            })
            .collect();

        let mut ranked = rank(raw, usize::MAX);
        let top = ranked.first().map_or(0.0, |best| best.confidence);
        for prediction in &mut ranked {
            prediction.confidence = if top > 0.0 { prediction.confidence / top } else { 0.0 };
        }
        ranked.truncate(top_k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::{tokenize, IntentClassifier, LexicalClassifier};
    use crate::nlu::corpus::{IntentCorpus, IntentDefinition, IntentExample};

    fn corpus(definitions: &[(&str, &[&str])]) -> IntentCorpus {
        IntentCorpus {
            intents: definitions
                .iter()
                .map(|(name, examples)| IntentDefinition {
                    name: (*name).to_owned(),
                    examples: examples
                        .iter()
                        .map(|text| IntentExample::Text((*text).to_owned()))
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn tokens_split_on_every_non_alphanumeric_character() {
        let tokens: Vec<String> = tokenize("Check_Balance, send-money  ₹500!").collect();
        assert_eq!(tokens, ["check", "balance", "send", "money", "500"]);
    }

    #[test]
    fn best_match_is_rescaled_to_one() {
        let classifier = LexicalClassifier::from_corpus(&corpus(&[
            ("check_balance", &["check balance", "view my balance"]),
            ("transfer_money", &["transfer money", "send money to my friend"]),
        ]));

        let predictions = classifier.predict("Check my balance", 2);

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].intent, "check_balance");
        assert!((predictions[0].confidence - 1.0).abs() < f64::EPSILON);
        // raw scores: check_balance 3/(4+1), transfer_money 1/(6+1)
        let expected = (1.0 / 7.0) / (3.0 / 5.0);
        assert!((predictions[1].confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn no_overlap_yields_all_zero_confidences() {
        let classifier = LexicalClassifier::from_corpus(&corpus(&[
            ("check_balance", &["check balance"]),
            ("find_atm", &["nearest atm"]),
        ]));

        let predictions = classifier.predict("Priya", 3);

        assert_eq!(predictions.len(), 2);
        assert!(predictions.iter().all(|prediction| prediction.confidence == 0.0));
        assert_eq!(predictions[0].intent, "check_balance", "ties keep corpus order");
    }

    #[test]
    fn confidences_are_bounded_and_non_increasing() {
        let classifier =
            LexicalClassifier::from_corpus(&IntentCorpus::builtin().expect("builtin corpus"));

        for text in ["send money to priya", "nearest atm please", "hello", "", "block my card"] {
            let predictions = classifier.predict(text, 5);
            assert!(predictions.len() <= 5);
            for prediction in &predictions {
                assert!((0.0..=1.0).contains(&prediction.confidence), "{text}: {prediction:?}");
            }
            for pair in predictions.windows(2) {
                assert!(pair[0].confidence >= pair[1].confidence, "{text}: {predictions:?}");
            }
        }
    }

    #[test]
    fn empty_vocabulary_scores_zero_and_top_k_truncates() {
        let classifier = LexicalClassifier::from_corpus(&corpus(&[
            ("empty", &[]),
            ("find_atm", &["nearest atm"]),
        ]));

        let predictions = classifier.predict("nearest atm", 1);

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].intent, "find_atm");
        assert!(classifier.predict("nearest atm", 0).is_empty());
    }

    #[test]
    fn builtin_corpus_routes_common_requests() {
        let classifier =
            LexicalClassifier::from_corpus(&IntentCorpus::builtin().expect("builtin corpus"));

        let top = |text: &str| classifier.predict(text, 1).remove(0).intent;
        assert_eq!(top("transfer money"), "transfer_money");
        assert_eq!(top("check my balance"), "check_balance");
        assert_eq!(top("block my card"), "card_block");
        assert_eq!(top("where is the nearest atm"), "find_atm");
        assert_eq!(top("hello"), "greet");
    }
}
